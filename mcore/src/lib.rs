pub mod config;
pub mod measure;
pub mod server;
pub mod storage;
