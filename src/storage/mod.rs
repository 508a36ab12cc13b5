//! Storage backends for metric records
//!
//! This module provides a trait-based abstraction over where the current
//! value of every metric lives.
//!
//! ## Design
//!
//! - **Trait-based**: `MetricStorage` lets the server pick a backend at startup
//! - **Async**: All operations are async so handlers and the flusher can share them
//! - **Current value only**: no history is kept, a record is one number
//!
//! ## Backends
//!
//! - **Memory** (default): `HashMap`s behind one lock, made durable by the
//!   snapshot flusher
//! - **Database**: PostgreSQL (or SQLite) through sqlx, durable on every write
//!
//! ## Usage
//!
//! ```no_run
//! use alertics::storage::{MemoryStorage, MetricStorage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = MemoryStorage::new();
//!     storage.add_counter("PollCount", 1).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod snapshot;

#[cfg(feature = "storage-sql")]
pub mod database;
#[cfg(feature = "storage-sql")]
pub mod schema;

pub use backend::{MetricStorage, RetryPolicy};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use snapshot::{Snapshot, read_snapshot, write_snapshot};

#[cfg(feature = "storage-sql")]
pub use database::{ConnectOutcome, DatabaseStorage};
