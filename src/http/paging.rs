//! Cursor pagination.
//!
//! A cursor is the `created_at` of the first or last item of a page,
//! rendered as RFC 3339 with nanoseconds and encoded as unpadded base64url.

use axum::http::Uri;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult, codes};
use crate::constants::MAX_PAGE_LIMIT;
use crate::controller::Page;

pub fn encode_cursor(at: DateTime<Utc>) -> String {
    URL_SAFE_NO_PAD.encode(at.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

pub fn decode_cursor(raw: &str) -> Option<DateTime<Utc>> {
    let bytes = URL_SAFE_NO_PAD.decode(raw.trim_end_matches('=')).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    DateTime::parse_from_rfc3339(&text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// `limit`, `before` and `after` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl PageParams {
    /// # Errors
    ///
    /// Rejects cursors that do not decode to a timestamp.
    pub fn page(&self) -> ApiResult<Page> {
        let cursor = |raw: &Option<String>| -> ApiResult<Option<DateTime<Utc>>> {
            match raw.as_deref().filter(|r| !r.is_empty()) {
                None => Ok(None),
                Some(r) => decode_cursor(r)
                    .map(Some)
                    .ok_or_else(|| ApiError::bad_request(codes::GENERIC, format!("malformed cursor '{r}'"))),
            }
        };
        Ok(Page {
            before: cursor(&self.before)?,
            after: cursor(&self.after)?,
            limit: self.limit.unwrap_or(MAX_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cursors {
    pub after: String,
    pub before: String,
}

/// Paging block embedded in list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Paging {
    pub cursors: Cursors,
    pub next: String,
    pub previous: String,
}

impl Paging {
    /// Paging of a page whose items were created at `times`, newest first.
    pub fn new(uri: &Uri, page: &Page, times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        let times: Vec<DateTime<Utc>> = times.into_iter().collect();
        let (Some(first), Some(last)) = (times.first(), times.last()) else {
            return Self::default();
        };
        let after = encode_cursor(*first);
        let before = encode_cursor(*last);
        let path = uri.path();

        Self {
            next: format!("{path}?limit={}&before={before}", page.limit),
            previous: format!("{path}?limit={}&after={after}", page.limit),
            cursors: Cursors { after, before },
        }
    }
}
