//! Shared types, errors, configuration and path safety for ferrostore.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod path;
pub mod types;

pub use concurrency::KeyedMutexRegistry;
pub use config::Config;
pub use error::{Error, Result};
pub use path::PathSandbox;
pub use types::*;
