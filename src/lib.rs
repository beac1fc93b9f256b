//! Resilient client layer for a fleet of self-describing HTTP APIs.
//!
//! [`managers::connections::setup`] bootstraps every configured upstream,
//! while [`services::executor::RequestExecutor`] carries the per-call retry
//! and cache behaviour.

pub mod constants;
pub mod errors;
pub mod managers;
pub mod services;
pub mod stores;
pub mod utils;

pub use errors::{ClientError, ClientErrorKind, TransportError};
pub use managers::api_handle::ApiHandle;
pub use managers::connections::{setup, Connections, SetupOptions};
pub use services::config::{ApiKeys, ApisConfig, CacheConfig, EndpointConfig};
pub use services::executor::{ExecutionOutcome, RequestExecutor};
pub use services::request::{RequestDescriptor, ResponseEnvelope};
