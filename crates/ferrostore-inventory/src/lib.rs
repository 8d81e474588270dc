//! Inventory Worker (§4.9): scheduled generation of per-bucket object
//! listings into a destination bucket, tracked through `inventory_configs`
//! and `inventory_reports` (`ferrostore_meta::models`).

pub mod error;
pub mod render;
pub mod schedule;
pub mod worker;

pub use error::{InventoryError, InventoryResult};
pub use worker::InventoryWorker;
