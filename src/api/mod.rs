//! Transport client for the HMIS REST API.

mod client;
pub mod error;
mod params;
pub mod transport;

pub use client::{parse_api_error, ApiClient, TENANT_HEADER};
pub use error::{ApiError, ClientError, NetworkError, ValidationErrors};
pub use params::QueryParams;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
