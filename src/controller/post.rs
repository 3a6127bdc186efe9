//! Posts: owned objects of type `tg_post`.

use serde::{Deserialize, Serialize};

use super::{Listing, Origin, Page, query_relation, users_by_ids};
use crate::error::{Error, Result};
use crate::service::event::TYPE_LIKE;
use crate::service::object::{TYPE_COMMENT, TYPE_POST};
use crate::service::{EventQuery, Object, ObjectQuery, Services, Visibility};

/// Engagement counts of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCounts {
    pub comments: u64,
    pub likes: u64,
}

/// A post as seen by a viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(flatten)]
    pub object: Object,
    #[serde(default)]
    pub counts: PostCounts,
    #[serde(default)]
    pub is_liked: bool,
}

impl From<Object> for Post {
    fn from(object: Object) -> Self {
        Self {
            object,
            ..Default::default()
        }
    }
}

/// Whether `viewer` may see `post` given their relation to its owner.
pub(crate) async fn is_visible(services: &Services, ns: &str, viewer: u64, post: &Object) -> Result<bool> {
    if post.owner_id == viewer {
        return Ok(true);
    }
    Ok(match post.visibility {
        Visibility::Global | Visibility::Public => true,
        Visibility::Connection => query_relation(services, ns, viewer, post.owner_id)
            .await?
            .is_connected(),
        Visibility::Private => false,
    })
}

/// Live post by id, `None` when absent or deleted.
pub(crate) async fn find_post(services: &Services, ns: &str, id: u64) -> Result<Option<Object>> {
    let posts = services
        .objects
        .query(
            ns,
            &ObjectQuery {
                id: Some(id),
                owned: Some(true),
                types: vec![TYPE_POST.to_string()],
                ..Default::default()
            },
        )
        .await?;
    Ok(posts.into_iter().next())
}

/// Live post visible to `viewer`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the post is absent or hidden.
pub(crate) async fn visible_post(services: &Services, ns: &str, viewer: u64, id: u64) -> Result<Object> {
    match find_post(services, ns, id).await? {
        Some(post) if is_visible(services, ns, viewer, &post).await? => Ok(post),
        _ => Err(Error::not_found(format!("post {id}"))),
    }
}

/// Sets comment and like counts of every post.
pub(crate) async fn enrich_counts(services: &Services, ns: &str, posts: &mut [Post]) -> Result<()> {
    for post in posts.iter_mut() {
        let id = post.object.id;
        post.counts.comments = services
            .objects
            .count(
                ns,
                &ObjectQuery {
                    object_ids: vec![id],
                    owned: Some(true),
                    types: vec![TYPE_COMMENT.to_string()],
                    ..Default::default()
                },
            )
            .await?;
        post.counts.likes = services
            .events
            .count(
                ns,
                &EventQuery {
                    enabled: Some(true),
                    object_ids: vec![id],
                    owned: Some(true),
                    types: vec![TYPE_LIKE.to_string()],
                    ..Default::default()
                },
            )
            .await?;
    }
    Ok(())
}

/// Sets `is_liked` from the viewer's enabled likes.
pub(crate) async fn enrich_is_liked(services: &Services, ns: &str, viewer: u64, posts: &mut [Post]) -> Result<()> {
    if posts.is_empty() {
        return Ok(());
    }
    let likes = services
        .events
        .query(
            ns,
            &EventQuery {
                enabled: Some(true),
                object_ids: posts.iter().map(|p| p.object.id).collect(),
                owned: Some(true),
                types: vec![TYPE_LIKE.to_string()],
                user_ids: vec![viewer],
                ..Default::default()
            },
        )
        .await?;
    for post in posts.iter_mut() {
        post.is_liked = likes.iter().any(|like| like.is_like_of(post.object.id));
    }
    Ok(())
}

/// Counts, `is_liked` and the owners of `posts`.
pub(crate) async fn enrich(services: &Services, ns: &str, viewer: u64, mut posts: Vec<Post>) -> Result<Listing<Post>> {
    enrich_counts(services, ns, &mut posts).await?;
    enrich_is_liked(services, ns, viewer, &mut posts).await?;
    let users = users_by_ids(services, ns, posts.iter().map(|p| p.object.owner_id)).await?;
    Ok(Listing { items: posts, users })
}

fn check_visibility(origin: &Origin, visibility: Visibility) -> Result<()> {
    if visibility == Visibility::Global && !origin.is_backend() {
        return Err(Error::unauthorized("global visibility requires a backend token"));
    }
    Ok(())
}

/// Post operations.
#[derive(Clone)]
pub struct PostController {
    services: Services,
}

impl PostController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Stores a new post owned by the origin.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] for global posts without a backend token
    /// - validation errors of the object
    pub async fn create(&self, ns: &str, origin: &Origin, mut post: Object) -> Result<Post> {
        check_visibility(origin, post.visibility)?;
        post.id = 0;
        post.owner_id = origin.user_id;
        post.object_id = 0;
        post.owned = true;
        post.deleted = false;
        post.kind = TYPE_POST.to_string();
        post.validate()?;

        let created = self.services.objects.put(ns, post).await?;
        Ok(created.into())
    }

    /// Marks the post deleted. Deleting an absent post succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] when the origin does not own the post.
    pub async fn delete(&self, ns: &str, origin: &Origin, id: u64) -> Result<()> {
        let Some(mut post) = find_post(&self.services, ns, id).await? else {
            return Ok(());
        };
        if post.owner_id != origin.user_id {
            return Err(Error::unauthorized(format!("post {id} is not owned by the user")));
        }
        post.deleted = true;
        self.services.objects.put(ns, post).await?;
        Ok(())
    }

    async fn list(&self, ns: &str, origin: &Origin, mut query: ObjectQuery, page: Page) -> Result<Listing<Post>> {
        query.after = page.after;
        query.before = page.before;
        query.limit = Some(page.limit);
        query.owned = Some(true);
        query.types = vec![TYPE_POST.to_string()];

        let objects = self.services.objects.query(ns, &query).await?;
        enrich(
            &self.services,
            ns,
            origin.user_id,
            objects.into_iter().map(Post::from).collect(),
        )
        .await
    }

    /// Public and global posts of every user.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_all(&self, ns: &str, origin: &Origin, page: Page) -> Result<Listing<Post>> {
        let query = ObjectQuery {
            visibilities: vec![Visibility::Public, Visibility::Global],
            ..Default::default()
        };
        self.list(ns, origin, query, page).await
    }

    /// Posts of `user_id` the origin may see.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_user(&self, ns: &str, origin: &Origin, user_id: u64, page: Page) -> Result<Listing<Post>> {
        let mut visibilities = vec![Visibility::Public, Visibility::Global];
        if origin.user_id == user_id {
            visibilities.extend([Visibility::Private, Visibility::Connection]);
        } else if query_relation(&self.services, ns, origin.user_id, user_id)
            .await?
            .is_connected()
        {
            visibilities.push(Visibility::Connection);
        }

        let query = ObjectQuery {
            owner_ids: vec![user_id],
            visibilities,
            ..Default::default()
        };
        self.list(ns, origin, query, page).await
    }

    /// A single post with its counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the post is absent or not visible to
    /// the origin.
    pub async fn retrieve(&self, ns: &str, origin: &Origin, id: u64) -> Result<Listing<Post>> {
        let post = visible_post(&self.services, ns, origin.user_id, id).await?;
        enrich(&self.services, ns, origin.user_id, vec![post.into()]).await
    }

    /// Replaces attachments, tags and visibility of an owned post.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the post is absent
    /// - [`Error::Unauthorized`] when the origin does not own it or asks for
    ///   global visibility without a backend token
    pub async fn update(&self, ns: &str, origin: &Origin, id: u64, new: Object) -> Result<Post> {
        let mut post = find_post(&self.services, ns, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("post {id}")))?;
        if post.owner_id != origin.user_id {
            return Err(Error::unauthorized(format!("post {id} is not owned by the user")));
        }
        check_visibility(origin, new.visibility)?;

        post.attachments = new.attachments;
        post.tags = new.tags;
        post.visibility = new.visibility;
        post.validate()?;

        let updated = self.services.objects.put(ns, post).await?;
        let mut posts = vec![Post::from(updated)];
        enrich_counts(&self.services, ns, &mut posts).await?;
        enrich_is_liked(&self.services, ns, origin.user_id, &mut posts).await?;
        Ok(posts.remove(0))
    }
}
