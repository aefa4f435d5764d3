pub mod http;
pub use http::HttpError;
pub use http::Method;
pub use http::Request;
pub use http::Response;
pub use http::StatusCode;

mod form;

mod routes;
pub use routes::CONVERT_PATH;
pub use routes::MEASUREMENT_FIELD;
pub use routes::RECORD_ID_HEADER;
pub use routes::RECORDS_PREFIX;

pub mod service;
pub use service::Server;
pub use service::ServerError;
