//! Comments: owned objects of type `tg_comment` pointing at a post.

use super::post::visible_post;
use super::{ATTACHMENT_CONTENT, Listing, Origin, Page, users_by_ids};
use crate::error::{Error, Result};
use crate::service::object::TYPE_COMMENT;
use crate::service::{Attachment, Object, ObjectQuery, Services};

/// The single text attachment holding the comment, taken from the contents
/// of the first attachment sent.
fn content(input: &Object) -> Result<Attachment> {
    let contents = input
        .attachments
        .first()
        .map(|a| a.contents.clone())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::invalid("comment: missing content"))?;
    Ok(Attachment::text(ATTACHMENT_CONTENT, contents))
}

/// Comment operations.
#[derive(Clone)]
pub struct CommentController {
    services: Services,
}

impl CommentController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn find(&self, ns: &str, post_id: u64, id: u64, owner_id: Option<u64>) -> Result<Option<Object>> {
        let comments = self
            .services
            .objects
            .query(
                ns,
                &ObjectQuery {
                    id: Some(id),
                    object_ids: vec![post_id],
                    owned: Some(true),
                    owner_ids: owner_id.into_iter().collect(),
                    types: vec![TYPE_COMMENT.to_string()],
                    ..Default::default()
                },
            )
            .await?;
        Ok(comments.into_iter().next())
    }

    /// Comments on a post visible to the origin. The comment inherits the
    /// visibility of the post.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the post is absent or hidden
    /// - [`Error::InvalidEntity`] when no content is given
    pub async fn create(&self, ns: &str, origin: &Origin, post_id: u64, input: Object) -> Result<Object> {
        let post = visible_post(&self.services, ns, origin.user_id, post_id).await?;

        let comment = Object {
            attachments: vec![content(&input)?],
            object_id: post.id,
            owner_id: origin.user_id,
            owned: true,
            kind: TYPE_COMMENT.to_string(),
            visibility: post.visibility,
            ..Default::default()
        };
        self.services
            .objects
            .put(ns, comment)
            .await
            .map_err(|e| e.context("comment create"))
    }

    /// Marks an owned comment deleted. Deleting an absent comment succeeds.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn delete(&self, ns: &str, origin: &Origin, post_id: u64, id: u64) -> Result<()> {
        let Some(mut comment) = self.find(ns, post_id, id, Some(origin.user_id)).await? else {
            return Ok(());
        };
        comment.deleted = true;
        self.services.objects.put(ns, comment).await?;
        Ok(())
    }

    /// Comments on a visible post, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the post is absent or hidden.
    pub async fn list(&self, ns: &str, origin: &Origin, post_id: u64, page: Page) -> Result<Listing<Object>> {
        visible_post(&self.services, ns, origin.user_id, post_id).await?;

        let items = self
            .services
            .objects
            .query(
                ns,
                &ObjectQuery {
                    after: page.after,
                    before: page.before,
                    limit: Some(page.limit),
                    object_ids: vec![post_id],
                    owned: Some(true),
                    types: vec![TYPE_COMMENT.to_string()],
                    ..Default::default()
                },
            )
            .await?;

        let users = users_by_ids(&self.services, ns, items.iter().map(|c| c.owner_id)).await?;
        Ok(Listing { items, users })
    }

    /// A comment of the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when absent.
    pub async fn retrieve(&self, ns: &str, origin: &Origin, post_id: u64, id: u64) -> Result<Object> {
        self.find(ns, post_id, id, Some(origin.user_id))
            .await?
            .ok_or_else(|| Error::not_found(format!("comment {id}")))
    }

    /// Replaces the content of a comment.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when absent
    /// - [`Error::Unauthorized`] when the origin does not own it
    pub async fn update(&self, ns: &str, origin: &Origin, post_id: u64, id: u64, input: Object) -> Result<Object> {
        let mut comment = self
            .find(ns, post_id, id, None)
            .await?
            .ok_or_else(|| Error::not_found(format!("comment {id}")))?;
        if comment.owner_id != origin.user_id {
            return Err(Error::unauthorized(format!("comment {id} is not owned by the user")));
        }
        comment.attachments = vec![content(&input)?];
        self.services.objects.put(ns, comment).await
    }
}
