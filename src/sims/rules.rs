//! Notification rules per change source.
//!
//! A rule inspects one state change and yields the messages it implies. The
//! data a rule needs beyond the change (names, posts, followers) comes from
//! a [`Lookup`].

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::Message;
use crate::controller;
use crate::error::{Error, Result};
use crate::service::event::TYPE_LIKE;
use crate::service::object::{TYPE_COMMENT, TYPE_POST};
use crate::service::{
    Connection, ConnectionState, ConnectionType, Event, Object, ObjectQuery, Services, StateChange, User, UserQuery,
};

/// Reads needed by the rules.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn user(&self, ns: &str, id: u64) -> Result<User>;
    async fn object(&self, ns: &str, id: u64) -> Result<Object>;
    async fn follower_ids(&self, ns: &str, id: u64) -> Result<Vec<u64>>;
    async fn friend_ids(&self, ns: &str, id: u64) -> Result<Vec<u64>>;
}

#[async_trait]
impl Lookup for Services {
    async fn user(&self, ns: &str, id: u64) -> Result<User> {
        self.users
            .query(
                ns,
                &UserQuery {
                    ids: vec![id],
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("user {id}")))
    }

    async fn object(&self, ns: &str, id: u64) -> Result<Object> {
        self.objects
            .query(
                ns,
                &ObjectQuery {
                    id: Some(id),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("object {id}")))
    }

    async fn follower_ids(&self, ns: &str, id: u64) -> Result<Vec<u64>> {
        controller::follower_ids(self, ns, id).await
    }

    async fn friend_ids(&self, ns: &str, id: u64) -> Result<Vec<u64>> {
        controller::friend_ids(self, ns, id).await
    }
}

/// Entities whose changes are turned into notifications.
#[async_trait]
pub trait Rules: Sized + Send + Sync + 'static {
    /// Messages of every rule of the source firing on `change`.
    async fn evaluate(lookup: &dyn Lookup, change: &StateChange<Self>) -> Result<Vec<Message>>;
}

/// `Sam Lee (sam)`.
fn display_name(user: &User) -> String {
    format!("{} {} ({})", user.first_name, user.last_name, user.username)
}

fn user_urn(id: u64) -> String {
    format!("tapglue/users/{id}")
}

fn post_urn(id: u64) -> String {
    format!("tapglue/posts/{id}")
}

fn comment_urn(post_id: u64, comment_id: u64) -> String {
    format!("tapglue/posts/{post_id}/comments/{comment_id}")
}

/// Followers and friends of `origin`, plus `owner` when given.
async fn audience(lookup: &dyn Lookup, ns: &str, origin: u64, owner: Option<u64>) -> Result<BTreeSet<u64>> {
    let mut recipients: BTreeSet<u64> = lookup.follower_ids(ns, origin).await?.into_iter().collect();
    recipients.extend(lookup.friend_ids(ns, origin).await?);
    recipients.extend(owner);
    Ok(recipients)
}

/// A new confirmed follow notifies the followed user.
pub async fn follower(lookup: &dyn Lookup, change: &StateChange<Connection>) -> Result<Vec<Message>> {
    let new = &change.new;
    if change.old.is_some() || new.kind != ConnectionType::Follow || new.state != ConnectionState::Confirmed {
        return Ok(Vec::new());
    }
    let origin = lookup.user(&change.namespace, new.from_id).await?;
    Ok(vec![Message {
        recipient: new.to_id,
        message: format!("{} started following you", display_name(&origin)),
        urn: user_urn(new.from_id),
    }])
}

/// A new pending friend request notifies its receiver.
pub async fn friend_request(lookup: &dyn Lookup, change: &StateChange<Connection>) -> Result<Vec<Message>> {
    let new = &change.new;
    if change.old.is_some() || new.kind != ConnectionType::Friend || new.state != ConnectionState::Pending {
        return Ok(Vec::new());
    }
    let origin = lookup.user(&change.namespace, new.from_id).await?;
    Ok(vec![Message {
        recipient: new.to_id,
        message: format!("{} sent you a friend request.", display_name(&origin)),
        urn: user_urn(new.from_id),
    }])
}

/// A confirmed friend request notifies the requester.
pub async fn friend_confirmed(lookup: &dyn Lookup, change: &StateChange<Connection>) -> Result<Vec<Message>> {
    let new = &change.new;
    let Some(old) = &change.old else {
        return Ok(Vec::new());
    };
    if old.kind != ConnectionType::Friend
        || old.state != ConnectionState::Pending
        || new.state != ConnectionState::Confirmed
    {
        return Ok(Vec::new());
    }
    let accepter = lookup.user(&change.namespace, new.to_id).await?;
    Ok(vec![Message {
        recipient: new.from_id,
        message: format!("{} accepted your friend request.", display_name(&accepter)),
        urn: user_urn(new.from_id),
    }])
}

/// A new like notifies the post owner and the audience of the liker. Only
/// owned events are likes; app events reusing the type are ignored.
pub async fn like_created(lookup: &dyn Lookup, change: &StateChange<Event>) -> Result<Vec<Message>> {
    let new = &change.new;
    if change.old.is_some() || !new.enabled || !new.owned || new.kind != TYPE_LIKE {
        return Ok(Vec::new());
    }
    let ns = &change.namespace;
    let post = lookup.object(ns, new.object_id).await?;
    let origin = lookup.user(ns, new.user_id).await?;
    let name = display_name(&origin);

    let recipients = audience(lookup, ns, origin.id, Some(post.owner_id)).await?;
    Ok(recipients
        .into_iter()
        .map(|recipient| Message {
            recipient,
            message: if recipient == post.owner_id {
                format!("{name} liked your Post.")
            } else {
                format!("{name} liked a Post.")
            },
            urn: post_urn(post.id),
        })
        .collect())
}

/// A new comment notifies the post owner and the audience of the author.
pub async fn comment_created(lookup: &dyn Lookup, change: &StateChange<Object>) -> Result<Vec<Message>> {
    let new = &change.new;
    if change.old.is_some() || new.deleted || new.kind != TYPE_COMMENT {
        return Ok(Vec::new());
    }
    let ns = &change.namespace;
    let post = lookup.object(ns, new.object_id).await?;
    let origin = lookup.user(ns, new.owner_id).await?;
    let name = display_name(&origin);

    let recipients = audience(lookup, ns, origin.id, Some(post.owner_id)).await?;
    Ok(recipients
        .into_iter()
        .map(|recipient| Message {
            recipient,
            message: if recipient == post.owner_id {
                format!("{name} commented on your Post.")
            } else {
                format!("{name} commented on a Post.")
            },
            urn: comment_urn(post.id, new.id),
        })
        .collect())
}

/// A new post notifies the audience of its owner.
pub async fn post_created(lookup: &dyn Lookup, change: &StateChange<Object>) -> Result<Vec<Message>> {
    let new = &change.new;
    if change.old.is_some() || new.deleted || new.kind != TYPE_POST {
        return Ok(Vec::new());
    }
    let ns = &change.namespace;
    let origin = lookup.user(ns, new.owner_id).await?;
    let message = format!("{} created a new Post.", display_name(&origin));

    let recipients = audience(lookup, ns, origin.id, None).await?;
    Ok(recipients
        .into_iter()
        .map(|recipient| Message {
            recipient,
            message: message.clone(),
            urn: post_urn(new.id),
        })
        .collect())
}

#[async_trait]
impl Rules for Connection {
    async fn evaluate(lookup: &dyn Lookup, change: &StateChange<Self>) -> Result<Vec<Message>> {
        let mut messages = follower(lookup, change).await?;
        messages.extend(friend_request(lookup, change).await?);
        messages.extend(friend_confirmed(lookup, change).await?);
        Ok(messages)
    }
}

#[async_trait]
impl Rules for Event {
    async fn evaluate(lookup: &dyn Lookup, change: &StateChange<Self>) -> Result<Vec<Message>> {
        like_created(lookup, change).await
    }
}

#[async_trait]
impl Rules for Object {
    async fn evaluate(lookup: &dyn Lookup, change: &StateChange<Self>) -> Result<Vec<Message>> {
        let mut messages = comment_created(lookup, change).await?;
        messages.extend(post_created(lookup, change).await?);
        Ok(messages)
    }
}
