//! Infrastructure shared by every layer: SQL access, the change queue, id
//! generation, caches, the rate limiter and retries.

pub mod cache;
pub mod flake;
pub mod limiter;
pub mod queue;
pub mod retry;
pub mod sql;
