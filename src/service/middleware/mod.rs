//! Decorators layered over every storage service.
//!
//! Each decorator implements [`Store`](super::Store) over an inner store with
//! the same entity and query types, so they compose in any order:
//!
//! ```ignore
//! let users = Logging::new(Instrumented::new(Cached::new(SqlUserStore::new(sql), cache), "sqlite"));
//! ```

mod cache;
mod instrument;
mod logging;
mod sourcing;

pub use cache::Cached;
pub use instrument::Instrumented;
pub use logging::Logging;
pub use sourcing::Sourced;
