//! Likes: owned `tg_like` events pointing at a post.

use super::post::visible_post;
use super::{Listing, Origin, Page, users_by_ids};
use crate::error::{Error, Result};
use crate::platform::sql::is_unique_violation;
use crate::service::event::TYPE_LIKE;
use crate::service::{Event, EventQuery, Services};

/// Like operations.
#[derive(Clone)]
pub struct LikeController {
    services: Services,
}

impl LikeController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn find(&self, ns: &str, user_id: u64, post_id: u64) -> Result<Option<Event>> {
        let likes = self
            .services
            .events
            .query(
                ns,
                &EventQuery {
                    object_ids: vec![post_id],
                    owned: Some(true),
                    types: vec![TYPE_LIKE.to_string()],
                    user_ids: vec![user_id],
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        Ok(likes.into_iter().next())
    }

    /// Likes a post. Liking twice returns the existing like; a like removed
    /// earlier is enabled again. A unique index keeps one like row per user
    /// and post under concurrent calls.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when the post is absent or hidden.
    pub async fn create(&self, ns: &str, origin: &Origin, post_id: u64) -> Result<Event> {
        let post = visible_post(&self.services, ns, origin.user_id, post_id).await?;

        match self.find(ns, origin.user_id, post.id).await? {
            Some(like) if like.enabled => Ok(like),
            Some(mut like) => {
                like.enabled = true;
                self.services.events.put(ns, like).await
            },
            None => {
                let like = Event {
                    enabled: true,
                    kind: TYPE_LIKE.to_string(),
                    object_id: post.id,
                    owned: true,
                    user_id: origin.user_id,
                    visibility: post.visibility,
                    ..Default::default()
                };
                match self.services.events.put(ns, like).await {
                    // A concurrent like of the same post won the insert.
                    Err(Error::Storage(err)) if is_unique_violation(&err) => self
                        .find(ns, origin.user_id, post.id)
                        .await?
                        .ok_or_else(|| Error::not_found(format!("like of post {}", post.id))),
                    result => result,
                }
            },
        }
    }

    /// Removes the like of the origin. Removing an absent like succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when the post is absent or hidden.
    pub async fn delete(&self, ns: &str, origin: &Origin, post_id: u64) -> Result<()> {
        let post = visible_post(&self.services, ns, origin.user_id, post_id).await?;

        if let Some(mut like) = self.find(ns, origin.user_id, post.id).await?
            && like.enabled
        {
            like.enabled = false;
            self.services.events.put(ns, like).await?;
        }
        Ok(())
    }

    /// Enabled likes of a visible post.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when the post is absent or hidden.
    pub async fn list(&self, ns: &str, origin: &Origin, post_id: u64, page: Page) -> Result<Listing<Event>> {
        visible_post(&self.services, ns, origin.user_id, post_id).await?;

        let items = self
            .services
            .events
            .query(
                ns,
                &EventQuery {
                    after: page.after,
                    before: page.before,
                    enabled: Some(true),
                    limit: Some(page.limit),
                    object_ids: vec![post_id],
                    owned: Some(true),
                    types: vec![TYPE_LIKE.to_string()],
                    ..Default::default()
                },
            )
            .await?;

        let users = users_by_ids(&self.services, ns, items.iter().map(|e| e.user_id)).await?;
        Ok(Listing { items, users })
    }
}
