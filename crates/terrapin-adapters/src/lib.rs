//! # terrapin-adapters
//!
//! Backend adapters for the Terrapin client.
//!
//! [`HttpBackend`] implements [`terrapin_proto::Backend`] over the backend's
//! JSON HTTP API. Job log subscriptions are read as newline-delimited JSON
//! from a long-lived response body.

mod http;
mod ndjson;

pub use http::{HttpBackend, HttpBackendError};
pub use ndjson::LineDecoder;
