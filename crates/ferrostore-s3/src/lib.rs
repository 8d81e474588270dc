//! ferrostore S3 API - S3-compatible HTTP API
//!
//! This crate implements the S3 REST API surface for ferrostore: request
//! routing (§4.7), handlers (§4.6/§4.9), XML wire types, and Prometheus
//! metrics (§4.9).

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routing;
pub mod state;
pub mod xml;

// Re-exports
pub use auth::RequestAuthenticator;
pub use error::{ApiError, ApiResult};
pub use metrics::{OperationTimer, S3Metrics, S3Operation, s3_metrics};
pub use routing::build_router;
pub use state::S3State;
