//! tapglue - multi-tenant social graph backend.
//!
//! Every tenant (an application) owns a namespace of users, a follow/friend
//! connection graph, posts, comments, likes and a feed of events. The crate is
//! organised in layers:
//!
//! - [`platform`] - SQL access, the durable change queue, id generation,
//!   caches, the rate limiter and retry helpers
//! - [`service`] - namespaced storage services with their middleware stack
//! - [`controller`] - business rules over the storage services
//! - [`sims`] - the change-propagation worker producing notifications
//! - [`http`] - the JSON API served by `tapglue api`
//! - [`commands`] - the `tapglue` subcommands wiring it all together

pub mod commands;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod http;
pub mod platform;
pub mod service;
pub mod sims;
pub mod telemetry;

pub use error::{Error, Result};
