//! Actor-based background tasks
//!
//! Long-running work lives in actors that own their state and are driven
//! through a command channel. Each actor comes with a cloneable handle.
//!
//! ## Actors
//!
//! - **FlushActor**: writes store snapshots on a timer, on request and at shutdown

pub mod flusher;
pub mod messages;

pub use flusher::{FlushActor, FlushHandle};
pub use messages::{FlushCommand, FlushStats, Lifecycle};
