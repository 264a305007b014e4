//! HTTP surface: admission middleware and server.

mod middleware;
mod rejection;
mod server;

pub use middleware::{admit, Admission, DEFAULT_IDENTITY_HEADER};
pub use rejection::AdmissionRejection;
pub use server::{build_router, HttpServer};
