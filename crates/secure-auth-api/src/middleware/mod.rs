//! HTTP middleware applied to every route
//!
//! Author: hephaex@gmail.com

pub mod security_headers;
pub mod timeout;

pub use security_headers::security_headers_middleware;
pub use timeout::request_timeout_middleware;
