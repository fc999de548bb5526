//! Backend REST API access

pub mod endpoints;
pub mod transport;

pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
