//! Request Pipeline Core
//!
//! Transport values, the retriable request wrapper, and the three pipeline
//! stages (prepare, send, respond).

pub mod preparer;
pub mod responder;
pub mod retriable;
pub mod sender;
pub mod transport;

pub use preparer::*;
pub use responder::*;
pub use retriable::*;
pub use sender::*;
pub use transport::*;

pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_AUXILIARY_AUTHORIZATION: &str = "x-ms-authorization-auxiliary";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_USER_AGENT: &str = "user-agent";
pub const HEADER_RETRY_AFTER: &str = "retry-after";
pub const HEADER_LOCATION: &str = "location";
pub const HEADER_ASYNC_OPERATION: &str = "azure-asyncoperation";
pub const HEADER_METADATA: &str = "metadata";
pub const HEADER_WWW_AUTHENTICATE: &str = "www-authenticate";
pub const HEADER_REQUEST_ID: &str = "x-ms-request-id";
pub const HEADER_CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
pub const HEADER_RETURN_CLIENT_REQUEST_ID: &str = "x-ms-return-client-request-id";

pub const MIME_JSON: &str = "application/json; charset=utf-8";
pub const MIME_FORM: &str = "application/x-www-form-urlencoded";
