pub mod record;
pub use record::MeasurementRecord;

pub mod store;
pub use store::FileStore;
pub use store::MemoryStore;
pub use store::Provisioned;
pub use store::Store;
pub use store::StoreError;
