//! Shared constants.

/// API version segment of every versioned route.
pub const API_VERSION: &str = "0.4";

/// Default listen address of the API server.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8083";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tapglue.toml";

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV_VAR: &str = "TAPGLUE_CONFIG";

/// Maximum accepted request body for POST/PUT (bytes).
pub const MAX_CONTENT_LENGTH: u64 = 32_768;

/// Maximum items per page and the default page size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Hard cap of items returned by a feed.
pub const FEED_LIMIT: usize = 200;

/// Most recent events scanned for active users of a recommendation.
pub const ACTIVE_EVENT_SCAN: usize = 1_000;

/// Rate limit window.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Requests per window for apps in production.
pub const RATE_LIMIT_PRODUCTION: i64 = 20_000;

/// Requests per window for apps in staging.
pub const RATE_LIMIT_STAGING: i64 = 100;

/// Time-to-live of cached counts.
pub const COUNT_CACHE_TTL_SECS: u64 = 300;

/// Long-poll bound of a queue receive.
pub const QUEUE_WAIT_SECS: u64 = 10;

/// Time a received message stays invisible before re-delivery.
pub const QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 60;

/// Length of an application-scoped token.
pub const APP_TOKEN_LEN: usize = 32;

/// Length of a backend-scoped token.
pub const BACKEND_TOKEN_LEN: usize = 44;

/// Namespace holding tenant-independent tables (apps).
pub const GLOBAL_NAMESPACE: &str = "tg";
