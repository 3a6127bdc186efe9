//! Business rules over the storage services.
//!
//! Controllers receive the namespace of the calling app and the [`Origin`]
//! of the request, enforce ownership and visibility, and compose storage
//! calls. They never talk to the queue directly: change propagation happens
//! inside the sourced services.

pub mod comment;
pub mod connection;
pub mod device;
pub mod event;
pub mod feed;
pub mod like;
pub mod post;
pub mod recommendation;
pub mod user;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::constants;
use crate::error::Result;
use crate::service::{Connection, ConnectionQuery, ConnectionState, ConnectionType, Services, User, UserQuery};

pub use comment::CommentController;
pub use connection::ConnectionController;
pub use device::DeviceController;
pub use event::EventController;
pub use feed::{Feed, FeedController, FeedItem};
pub use like::LikeController;
pub use post::{Post, PostController, PostCounts};
pub use recommendation::{Period, RecommendationController};
pub use user::{Credentials, UserController};

/// Name of the single text attachment of a comment.
pub const ATTACHMENT_CONTENT: &str = "content";

/// Users keyed by id, returned next to lists referencing them.
pub type UserMap = HashMap<u64, User>;

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Integration {
    /// Client token with a user session.
    #[default]
    Application,
    /// Backend token acting on behalf of a user.
    Backend,
}

/// Caller of a controller operation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub integration: Integration,
    pub user_id: u64,
    /// Session presented by the caller, if any.
    pub session: Option<String>,
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Origin")
            .field("integration", &self.integration)
            .field("user_id", &self.user_id)
            .field("session", &self.session.as_deref().map(crate::service::codec::Redacted))
            .finish()
    }
}

impl Origin {
    pub fn application(user_id: u64) -> Self {
        Self {
            integration: Integration::Application,
            user_id,
            session: None,
        }
    }

    pub fn backend(user_id: u64) -> Self {
        Self {
            integration: Integration::Backend,
            user_id,
            session: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn is_backend(&self) -> bool {
        self.integration == Integration::Backend
    }
}

/// Window of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Only items created strictly before.
    pub before: Option<DateTime<Utc>>,
    /// Only items created strictly after.
    pub after: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            before: None,
            after: None,
            limit: constants::MAX_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// A page of at most `limit` items, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, constants::MAX_PAGE_LIMIT),
            ..Self::default()
        }
    }

    /// Cuts a merged, newest-first list down to the page: the newest items,
    /// or with an `after` cursor the ones closest to it.
    pub(crate) fn truncate<T>(&self, items: &mut Vec<T>) {
        if self.after.is_some() {
            let excess = items.len().saturating_sub(self.limit);
            items.drain(..excess);
        } else {
            items.truncate(self.limit);
        }
    }
}

/// A page of items plus the users they reference.
#[derive(Debug, Clone, Default)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub users: UserMap,
}

/// Derived relation between a viewer and another user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relation {
    pub is_friend: bool,
    pub is_follower: bool,
    pub is_following: bool,
}

impl Relation {
    /// Folds the confirmed connections between `viewer` and `other`.
    pub fn derive(viewer: u64, other: u64, connections: &[Connection]) -> Self {
        let mut relation = Self::default();
        for con in connections {
            let between = (con.from_id == viewer && con.to_id == other) || (con.from_id == other && con.to_id == viewer);
            if !between || con.state != ConnectionState::Confirmed || !con.enabled {
                continue;
            }
            match con.kind {
                ConnectionType::Friend => relation.is_friend = true,
                ConnectionType::Follow if con.from_id == viewer => relation.is_following = true,
                ConnectionType::Follow => relation.is_follower = true,
            }
        }
        relation
    }

    /// Whether connection-visible content of the other user is readable.
    pub fn is_connected(&self) -> bool {
        self.is_friend || self.is_following
    }

    pub fn apply(&self, user: &mut User) {
        user.is_friend = Some(self.is_friend);
        user.is_follower = Some(self.is_follower);
        user.is_following = Some(self.is_following);
    }
}

/// Relation of `viewer` to `other`; the empty relation for oneself.
pub(crate) async fn query_relation(services: &Services, ns: &str, viewer: u64, other: u64) -> Result<Relation> {
    if viewer == other {
        return Ok(Relation::default());
    }
    let connections = services
        .connections
        .query(
            ns,
            &ConnectionQuery {
                enabled: Some(true),
                from_ids: vec![viewer, other],
                states: vec![ConnectionState::Confirmed],
                to_ids: vec![viewer, other],
                ..Default::default()
            },
        )
        .await?;
    Ok(Relation::derive(viewer, other, &connections))
}

/// Relations of `viewer` to each of `others`, from two batched queries.
pub(crate) async fn query_relations(
    services: &Services,
    ns: &str,
    viewer: u64,
    others: &[u64],
) -> Result<HashMap<u64, Relation>> {
    let others: Vec<u64> = others.iter().copied().filter(|id| *id != viewer).collect();
    if others.is_empty() {
        return Ok(HashMap::new());
    }

    let confirmed = |from_ids: Vec<u64>, to_ids: Vec<u64>| ConnectionQuery {
        enabled: Some(true),
        from_ids,
        states: vec![ConnectionState::Confirmed],
        to_ids,
        ..Default::default()
    };
    let mut connections = services
        .connections
        .query(ns, &confirmed(vec![viewer], others.clone()))
        .await?;
    connections.extend(
        services
            .connections
            .query(ns, &confirmed(others.clone(), vec![viewer]))
            .await?,
    );

    Ok(others
        .into_iter()
        .map(|other| (other, Relation::derive(viewer, other, &connections)))
        .collect())
}

/// Sets the relation flags of every user relative to `viewer`.
pub(crate) async fn enrich_relations(services: &Services, ns: &str, viewer: u64, users: &mut [User]) -> Result<()> {
    let ids: Vec<u64> = users.iter().map(|u| u.id).collect();
    let relations = query_relations(services, ns, viewer, &ids).await?;
    for user in users.iter_mut() {
        relations.get(&user.id).copied().unwrap_or_default().apply(user);
    }
    Ok(())
}

/// Enabled users for `ids`, keyed by id. Passwords are blanked.
pub(crate) async fn users_by_ids(services: &Services, ns: &str, ids: impl IntoIterator<Item = u64>) -> Result<UserMap> {
    let ids: Vec<u64> = ids.into_iter().collect::<HashSet<_>>().into_iter().collect();
    if ids.is_empty() {
        return Ok(UserMap::new());
    }
    let users = services
        .users
        .query(
            ns,
            &UserQuery {
                enabled: Some(true),
                ids,
                ..Default::default()
            },
        )
        .await?;
    Ok(users
        .into_iter()
        .map(|mut user| {
            user.password.clear();
            (user.id, user)
        })
        .collect())
}

async fn confirmed_connections(
    services: &Services,
    ns: &str,
    kind: ConnectionType,
    from_ids: Vec<u64>,
    to_ids: Vec<u64>,
) -> Result<Vec<Connection>> {
    services
        .connections
        .query(
            ns,
            &ConnectionQuery {
                enabled: Some(true),
                from_ids,
                states: vec![ConnectionState::Confirmed],
                to_ids,
                types: vec![kind],
                ..Default::default()
            },
        )
        .await
}

/// Users following `user_id`.
pub async fn follower_ids(services: &Services, ns: &str, user_id: u64) -> Result<Vec<u64>> {
    let cons = confirmed_connections(services, ns, ConnectionType::Follow, vec![], vec![user_id]).await?;
    Ok(cons.into_iter().map(|c| c.from_id).collect())
}

/// Users `user_id` follows.
pub async fn following_ids(services: &Services, ns: &str, user_id: u64) -> Result<Vec<u64>> {
    let cons = confirmed_connections(services, ns, ConnectionType::Follow, vec![user_id], vec![]).await?;
    Ok(cons.into_iter().map(|c| c.to_id).collect())
}

/// Friends of `user_id`, whichever side initiated.
pub async fn friend_ids(services: &Services, ns: &str, user_id: u64) -> Result<Vec<u64>> {
    let mut cons = confirmed_connections(services, ns, ConnectionType::Friend, vec![user_id], vec![]).await?;
    cons.extend(confirmed_connections(services, ns, ConnectionType::Friend, vec![], vec![user_id]).await?);
    Ok(cons.into_iter().map(|c| c.counterparty(user_id)).collect())
}

/// Followings and friends of `user_id`, deduplicated.
pub(crate) async fn graph_ids(services: &Services, ns: &str, user_id: u64) -> Result<Vec<u64>> {
    let mut seen = HashSet::new();
    let mut ids = following_ids(services, ns, user_id).await?;
    ids.extend(friend_ids(services, ns, user_id).await?);
    ids.retain(|id| seen.insert(*id));
    Ok(ids)
}

/// Every controller of a deployment over one set of services.
#[derive(Clone)]
pub struct Controllers {
    pub comments: CommentController,
    pub connections: ConnectionController,
    pub devices: DeviceController,
    pub events: EventController,
    pub feed: FeedController,
    pub likes: LikeController,
    pub posts: PostController,
    pub recommendations: RecommendationController,
    pub users: UserController,
}

impl Controllers {
    pub fn new(services: &Services) -> Self {
        Self {
            comments: CommentController::new(services.clone()),
            connections: ConnectionController::new(services.clone()),
            devices: DeviceController::new(services.clone()),
            events: EventController::new(services.clone()),
            feed: FeedController::new(services.clone()),
            likes: LikeController::new(services.clone()),
            posts: PostController::new(services.clone()),
            recommendations: RecommendationController::new(services.clone()),
            users: UserController::new(services.clone()),
        }
    }
}
