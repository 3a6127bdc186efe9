//! Newsfeeds composed from the viewer's graph.
//!
//! Every feed gathers several sources, merges them with [`merge`] (distinct
//! by id, newest first, capped at [`constants::FEED_LIMIT`]) and returns the
//! users and posts the items reference.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::post::{self, Post};
use super::{Origin, UserMap, graph_ids, users_by_ids};
use crate::constants;
use crate::error::{Error, Result};
use crate::service::connection::ConnectionType;
use crate::service::event::{TYPE_COMMENT, TYPE_FOLLOW, TYPE_FRIEND, TYPE_LIKE};
use crate::service::object::TYPE_POST;
use crate::service::user::TARGET_TYPE;
use crate::service::{
    Connection, ConnectionQuery, ConnectionState, Event, EventQuery, Object, ObjectQuery, Services, Target, User,
    UserQuery, Visibility,
};

/// Item of a feed.
pub trait FeedItem {
    fn item_id(&self) -> u64;
    fn created_at(&self) -> DateTime<Utc>;
}

impl FeedItem for Event {
    fn item_id(&self) -> u64 {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl FeedItem for Post {
    fn item_id(&self) -> u64 {
        self.object.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.object.created_at
    }
}

/// Merges feed sources: first occurrence of each id wins, newest first,
/// ties broken by id, at most [`constants::FEED_LIMIT`] items.
pub fn merge<T: FeedItem>(sources: impl IntoIterator<Item = Vec<T>>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut items: Vec<T> = sources
        .into_iter()
        .flatten()
        .filter(|item| seen.insert(item.item_id()))
        .collect();
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.item_id().cmp(&a.item_id()))
    });
    items.truncate(constants::FEED_LIMIT);
    items
}

/// Items created after `last_read`; everything when never read.
pub fn unread<T: FeedItem>(items: &[T], last_read: Option<DateTime<Utc>>) -> usize {
    match last_read {
        Some(at) => items.iter().filter(|item| item.created_at() > at).count(),
        None => items.len(),
    }
}

/// A composed feed.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub events: Vec<Event>,
    pub posts: Vec<Post>,
    /// Posts referenced by `events`, keyed by id.
    pub post_map: HashMap<u64, Post>,
    pub users: UserMap,
    pub unread_events: usize,
    pub unread_posts: usize,
}

/// Event standing in for a connection in the notifications of its target.
fn connection_event(con: &Connection) -> Event {
    let kind = match con.kind {
        ConnectionType::Follow => TYPE_FOLLOW,
        ConnectionType::Friend => TYPE_FRIEND,
    };
    let digest = blake3::hash(format!("{}:{}:{}", con.from_id, con.to_id, con.kind).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);

    Event {
        id: u64::from_be_bytes(head) >> 1,
        user_id: con.from_id,
        kind: kind.to_string(),
        owned: true,
        target: Some(Target {
            id: con.to_id.to_string(),
            kind: TARGET_TYPE.to_string(),
            ..Default::default()
        }),
        visibility: Visibility::Private,
        enabled: true,
        created_at: con.updated_at,
        updated_at: con.updated_at,
        ..Default::default()
    }
}

fn comment_event(comment: &Object) -> Event {
    Event {
        id: comment.id,
        user_id: comment.owner_id,
        kind: TYPE_COMMENT.to_string(),
        owned: true,
        object_id: comment.object_id,
        visibility: comment.visibility,
        enabled: true,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        ..Default::default()
    }
}

/// Feed operations.
#[derive(Clone)]
pub struct FeedController {
    services: Services,
}

impl FeedController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn viewer(&self, ns: &str, id: u64) -> Result<User> {
        self.services
            .users
            .query(
                ns,
                &UserQuery {
                    enabled: Some(true),
                    ids: vec![id],
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("user {id}")))
    }

    async fn events_query(&self, ns: &str, query: EventQuery) -> Result<Vec<Event>> {
        let query = EventQuery {
            enabled: Some(true),
            limit: Some(constants::FEED_LIMIT),
            ..query
        };
        self.services.events.query(ns, &query).await
    }

    async fn target_events(&self, ns: &str, viewer: u64) -> Result<Vec<Event>> {
        self.events_query(
            ns,
            EventQuery {
                target_ids: vec![viewer.to_string()],
                target_types: vec![TARGET_TYPE.to_string()],
                ..Default::default()
            },
        )
        .await
    }

    /// Connection, global and targeted events, merged.
    async fn merged_events(&self, ns: &str, viewer: u64, graph: &[u64]) -> Result<Vec<Event>> {
        let mut sources = Vec::with_capacity(3);
        if !graph.is_empty() {
            sources.push(
                self.events_query(
                    ns,
                    EventQuery {
                        user_ids: graph.to_vec(),
                        visibilities: vec![Visibility::Connection, Visibility::Public],
                        ..Default::default()
                    },
                )
                .await?,
            );
        }
        sources.push(
            self.events_query(
                ns,
                EventQuery {
                    visibilities: vec![Visibility::Global],
                    ..Default::default()
                },
            )
            .await?,
        );
        sources.push(self.target_events(ns, viewer).await?);
        Ok(merge(sources))
    }

    async fn posts_query(&self, ns: &str, query: ObjectQuery) -> Result<Vec<Post>> {
        let query = ObjectQuery {
            limit: Some(constants::FEED_LIMIT),
            owned: Some(true),
            types: vec![TYPE_POST.to_string()],
            ..query
        };
        let objects = self.services.objects.query(ns, &query).await?;
        Ok(objects.into_iter().map(Post::from).collect())
    }

    /// Connection and global posts with counts, merged.
    async fn merged_posts(&self, ns: &str, viewer: u64, graph: &[u64]) -> Result<Vec<Post>> {
        let mut sources = Vec::with_capacity(2);
        if !graph.is_empty() {
            sources.push(
                self.posts_query(
                    ns,
                    ObjectQuery {
                        owner_ids: graph.to_vec(),
                        visibilities: vec![Visibility::Connection, Visibility::Public],
                        ..Default::default()
                    },
                )
                .await?,
            );
        }
        sources.push(
            self.posts_query(
                ns,
                ObjectQuery {
                    visibilities: vec![Visibility::Global],
                    ..Default::default()
                },
            )
            .await?,
        );

        let mut posts = merge(sources);
        post::enrich_counts(&self.services, ns, &mut posts).await?;
        post::enrich_is_liked(&self.services, ns, viewer, &mut posts).await?;
        Ok(posts)
    }

    /// Loads the posts `events` refer to and drops events whose post is gone.
    async fn attach_posts(&self, ns: &str, viewer: u64, events: &mut Vec<Event>) -> Result<HashMap<u64, Post>> {
        let ids: Vec<u64> = events
            .iter()
            .map(|e| e.object_id)
            .filter(|id| *id != 0)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut posts = self
            .posts_query(
                ns,
                ObjectQuery {
                    ids,
                    ..Default::default()
                },
            )
            .await?;
        post::enrich_counts(&self.services, ns, &mut posts).await?;
        post::enrich_is_liked(&self.services, ns, viewer, &mut posts).await?;

        let post_map: HashMap<u64, Post> = posts.into_iter().map(|p| (p.object.id, p)).collect();
        events.retain(|e| e.object_id == 0 || post_map.contains_key(&e.object_id));
        Ok(post_map)
    }

    async fn users_of(&self, ns: &str, events: &[Event], posts: &[Post], post_map: &HashMap<u64, Post>) -> Result<UserMap> {
        let ids = events
            .iter()
            .map(|e| e.user_id)
            .chain(posts.iter().map(|p| p.object.owner_id))
            .chain(post_map.values().map(|p| p.object.owner_id));
        users_by_ids(&self.services, ns, ids).await
    }

    /// Events of the viewer's connections, global events and events
    /// targeting the viewer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown viewer and storage errors.
    pub async fn events(&self, ns: &str, origin: &Origin) -> Result<Feed> {
        let viewer = self.viewer(ns, origin.user_id).await?;
        let graph = graph_ids(&self.services, ns, viewer.id).await?;

        let mut events = self.merged_events(ns, viewer.id, &graph).await?;
        let post_map = self.attach_posts(ns, viewer.id, &mut events).await?;
        let users = self.users_of(ns, &events, &[], &post_map).await?;

        Ok(Feed {
            unread_events: unread(&events, viewer.last_read),
            events,
            post_map,
            users,
            ..Default::default()
        })
    }

    /// Posts of the viewer's connections and global posts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown viewer and storage errors.
    pub async fn posts(&self, ns: &str, origin: &Origin) -> Result<Feed> {
        let viewer = self.viewer(ns, origin.user_id).await?;
        let graph = graph_ids(&self.services, ns, viewer.id).await?;

        let posts = self.merged_posts(ns, viewer.id, &graph).await?;
        let users = self.users_of(ns, &[], &posts, &HashMap::new()).await?;

        Ok(Feed {
            unread_posts: unread(&posts, viewer.last_read),
            posts,
            users,
            ..Default::default()
        })
    }

    /// Events and posts with unread counts. Marks the feed read; failing
    /// to do so is logged and does not fail the feed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown viewer and storage errors.
    pub async fn news(&self, ns: &str, origin: &Origin) -> Result<Feed> {
        let viewer = self.viewer(ns, origin.user_id).await?;
        let graph = graph_ids(&self.services, ns, viewer.id).await?;

        let mut events = self.merged_events(ns, viewer.id, &graph).await?;
        let post_map = self.attach_posts(ns, viewer.id, &mut events).await?;
        let posts = self.merged_posts(ns, viewer.id, &graph).await?;
        let users = self.users_of(ns, &events, &posts, &post_map).await?;

        let feed = Feed {
            unread_events: unread(&events, viewer.last_read),
            unread_posts: unread(&posts, viewer.last_read),
            events,
            posts,
            post_map,
            users,
        };

        let user_id = viewer.id;
        let read = User {
            last_read: Some(Utc::now()),
            ..viewer
        };
        if let Err(err) = self.services.users.put(ns, read).await {
            warn!(target: "controller", namespace = ns, user_id, error = %err, "failed to advance last read");
        }
        Ok(feed)
    }

    /// Activity around the viewer: comments and likes on their posts,
    /// follows and friendships targeting them and events targeting them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown viewer and storage errors.
    pub async fn notifications_self(&self, ns: &str, origin: &Origin) -> Result<Feed> {
        let viewer = self.viewer(ns, origin.user_id).await?;

        let own_posts: Vec<u64> = self
            .services
            .objects
            .query(
                ns,
                &ObjectQuery {
                    owned: Some(true),
                    owner_ids: vec![viewer.id],
                    types: vec![TYPE_POST.to_string()],
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut sources = Vec::with_capacity(4);
        if !own_posts.is_empty() {
            let comments = self
                .services
                .objects
                .query(
                    ns,
                    &ObjectQuery {
                        limit: Some(constants::FEED_LIMIT),
                        object_ids: own_posts.clone(),
                        owned: Some(true),
                        types: vec![TYPE_COMMENT.to_string()],
                        ..Default::default()
                    },
                )
                .await?;
            sources.push(
                comments
                    .iter()
                    .filter(|c| c.owner_id != viewer.id)
                    .map(comment_event)
                    .collect(),
            );

            let mut likes = self
                .events_query(
                    ns,
                    EventQuery {
                        object_ids: own_posts,
                        owned: Some(true),
                        types: vec![TYPE_LIKE.to_string()],
                        ..Default::default()
                    },
                )
                .await?;
            likes.retain(|like| like.user_id != viewer.id);
            sources.push(likes);
        }

        let connections = self
            .services
            .connections
            .query(
                ns,
                &ConnectionQuery {
                    enabled: Some(true),
                    limit: Some(constants::FEED_LIMIT),
                    states: vec![ConnectionState::Confirmed],
                    to_ids: vec![viewer.id],
                    ..Default::default()
                },
            )
            .await?;
        sources.push(connections.iter().map(connection_event).collect());
        sources.push(self.target_events(ns, viewer.id).await?);

        let mut events = merge(sources);
        let post_map = self.attach_posts(ns, viewer.id, &mut events).await?;
        let users = self.users_of(ns, &events, &[], &post_map).await?;

        Ok(Feed {
            unread_events: unread(&events, viewer.last_read),
            events,
            post_map,
            users,
            ..Default::default()
        })
    }
}
