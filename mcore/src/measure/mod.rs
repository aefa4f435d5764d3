pub mod decoder;
pub use decoder::DecodeError;
pub use decoder::DecodeState;
pub use decoder::Decoder;
pub use decoder::Measure;
pub use decoder::Round;
pub use decoder::Transition;
pub use decoder::decode;
pub use symbol::Symbol;
pub use validator::is_valid_sequence;

mod symbol;

mod validator;

mod output;
pub use output::result_to_string;
