//! Schema migrator and sqlx-backed metadata/audit stores for ferrostore.
//!
//! Two independent SQLite databases share this crate's migration machinery:
//! `metadata.db` (control-plane entities, [`store::MetaStore`]) and
//! `audit.db` (append-only event log, [`audit::AuditStore`]).

pub mod audit;
pub mod error;
pub mod migrator;
pub mod models;
pub mod schema;
pub mod store;

pub use audit::{AuditFilter, AuditStore};
pub use error::{MetaError, MetaResult};
pub use migrator::{AppliedMigration, Migration, Migrator};
pub use store::MetaStore;
