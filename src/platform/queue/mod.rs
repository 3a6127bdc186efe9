//! Durable message queue with receive/acknowledge semantics.
//!
//! Messages are received with a visibility timeout: a received message is
//! hidden from other consumers until it is deleted with its receipt handle
//! (the acknowledgement) or the timeout elapses and it becomes visible again.
//! Receives long-poll for up to the configured wait time.
//!
//! Two backends implement [`QueueBackend`]:
//!
//! - [`MemoryQueue`] - in-process, for single-process deployments and tests
//! - [`SqliteQueue`] - a table in the shared SQLite file, safe across the
//!   API server and the SIMS worker processes
//!
//! # Example
//!
//! ```ignore
//! use tapglue::platform::queue::{QueueConfig, QueueService};
//!
//! let queue = QueueService::memory(QueueConfig::default());
//! queue.send("connection-state-change", "{}", Default::default()).await?;
//!
//! if let Some(msg) = queue.receive("connection-state-change").await? {
//!     queue.delete("connection-state-change", &msg.receipt_handle).await?;
//! }
//! ```

mod backend;
mod memory;
mod service;
mod sqlite;
mod types;

#[cfg(test)]
mod tests;

pub use backend::QueueBackend;
pub use memory::MemoryQueue;
pub use service::QueueService;
pub use sqlite::SqliteQueue;
pub use types::{Attributes, QueueConfig, QueueMessage};
