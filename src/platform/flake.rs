//! Time-ordered 64-bit id generation.
//!
//! An id is the number of milliseconds since 2015-01-01 shifted left by 16
//! bits, combined with a per-millisecond sequence. Every `(namespace, entity)`
//! pair owns its own generator, so ids of different tenants never contend.

use dashmap::DashMap;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2015-01-01T00:00:00Z in Unix milliseconds.
const EPOCH_MS: u64 = 1_420_070_400_000;

const SEQUENCE_BITS: u32 = 16;

static GENERATORS: LazyLock<DashMap<String, u64>> = LazyLock::new(DashMap::new);

fn now_ms() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MS);
    since_unix.saturating_sub(EPOCH_MS)
}

/// Next id for `entity` within `namespace`.
///
/// Ids are strictly increasing per pair, even when the clock goes backwards
/// or more than 65 536 ids are requested within one millisecond.
pub fn next_id(namespace: &str, entity: &str) -> u64 {
    let candidate = now_ms() << SEQUENCE_BITS;
    let mut last = GENERATORS.entry(format!("{namespace}:{entity}")).or_insert(0);
    let id = candidate.max(*last + 1);
    *last = id;
    id
}
