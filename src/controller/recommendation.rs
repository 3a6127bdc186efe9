//! Recommendations of users to connect with.

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::{Origin, query_relations, users_by_ids};
use crate::constants;
use crate::error::{Error, Result};
use crate::service::{EventQuery, Services, User};

/// Activity window of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn duration(self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
            Self::Week => Duration::weeks(1),
            Self::Month => Duration::days(30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(Error::invalid(format!("unsupported period '{other}'"))),
        }
    }
}

/// Recommendation operations.
#[derive(Clone)]
pub struct RecommendationController {
    services: Services,
    event_scan: usize,
}

impl RecommendationController {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            event_scan: constants::ACTIVE_EVENT_SCAN,
        }
    }

    /// Bounds the events scanned per recommendation.
    #[must_use]
    pub fn with_event_scan(mut self, limit: usize) -> Self {
        self.event_scan = limit.max(1);
        self
    }

    /// Authors of the most recent events inside `period` the origin is not
    /// connected to, in random order.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn users_active(&self, ns: &str, origin: &Origin, period: Period) -> Result<Vec<User>> {
        let events = self
            .services
            .events
            .query(
                ns,
                &EventQuery {
                    limit: Some(self.event_scan),
                    updated_after: Some(Utc::now() - period.duration()),
                    ..Default::default()
                },
            )
            .await?;

        let ids: HashSet<u64> = events
            .iter()
            .map(|e| e.user_id)
            .filter(|id| *id != origin.user_id)
            .collect();
        let ids: Vec<u64> = ids.into_iter().collect();

        let relations = query_relations(&self.services, ns, origin.user_id, &ids).await?;
        let mut users: Vec<User> = users_by_ids(&self.services, ns, ids)
            .await?
            .into_values()
            .filter(|u| relations.get(&u.id).is_none_or(|r| !r.is_connected()))
            .collect();

        for user in &mut users {
            relations.get(&user.id).copied().unwrap_or_default().apply(user);
        }
        users.shuffle(&mut rand::thread_rng());
        Ok(users)
    }
}
