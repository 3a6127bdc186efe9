//! User-declared events.

use super::{Listing, Origin, Page, query_relation, users_by_ids};
use crate::error::{Error, Result};
use crate::service::{Event, EventQuery, Services, Visibility};

/// Prefix of the event types issued by the platform itself.
const RESERVED_PREFIX: &str = "tg_";

fn check(origin: &Origin, event: &Event) -> Result<()> {
    if event.kind.starts_with(RESERVED_PREFIX) {
        return Err(Error::invalid(format!("event: type '{}' is reserved", event.kind)));
    }
    if event.visibility == Visibility::Global && !origin.is_backend() {
        return Err(Error::unauthorized("global visibility requires a backend token"));
    }
    Ok(())
}

/// Event operations.
#[derive(Clone)]
pub struct EventController {
    services: Services,
}

impl EventController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn owned(&self, ns: &str, origin: &Origin, id: u64) -> Result<Event> {
        self.services
            .events
            .query(
                ns,
                &EventQuery {
                    enabled: Some(true),
                    ids: vec![id],
                    owned: Some(false),
                    user_ids: vec![origin.user_id],
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("event {id}")))
    }

    /// Stores an event of the origin.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEntity`] for reserved types and invalid events
    /// - [`Error::Unauthorized`] for global events without a backend token
    pub async fn create(&self, ns: &str, origin: &Origin, mut event: Event) -> Result<Event> {
        check(origin, &event)?;
        event.id = 0;
        event.enabled = true;
        event.owned = false;
        event.user_id = origin.user_id;
        self.services.events.put(ns, event).await
    }

    /// Disables an event of the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the origin has no such event.
    pub async fn delete(&self, ns: &str, origin: &Origin, id: u64) -> Result<()> {
        let mut event = self.owned(ns, origin, id).await?;
        event.enabled = false;
        self.services.events.put(ns, event).await?;
        Ok(())
    }

    /// Events of the origin, whatever their visibility.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_me(&self, ns: &str, origin: &Origin, page: Page) -> Result<Listing<Event>> {
        self.list_user(ns, origin, origin.user_id, page).await
    }

    /// Events of `user_id` visible to the origin.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_user(&self, ns: &str, origin: &Origin, user_id: u64, page: Page) -> Result<Listing<Event>> {
        let mut visibilities = vec![Visibility::Public, Visibility::Global];
        if origin.user_id == user_id {
            visibilities.extend([Visibility::Private, Visibility::Connection]);
        } else if query_relation(&self.services, ns, origin.user_id, user_id)
            .await?
            .is_connected()
        {
            visibilities.push(Visibility::Connection);
        }

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
                    user_ids: vec![user_id],
                    visibilities,
                    ..Default::default()
                },
            )
            .await?;

        let users = users_by_ids(&self.services, ns, items.iter().map(|e| e.user_id)).await?;
        Ok(Listing { items, users })
    }

    /// Replaces the declared fields of an event of the origin.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the origin has no such event
    /// - the errors of [`EventController::create`]
    pub async fn update(&self, ns: &str, origin: &Origin, id: u64, new: Event) -> Result<Event> {
        check(origin, &new)?;
        let mut event = self.owned(ns, origin, id).await?;

        event.kind = new.kind;
        event.language = new.language;
        event.object = new.object;
        event.target = new.target;
        event.visibility = new.visibility;
        event.location = new.location;
        event.latitude = new.latitude;
        event.longitude = new.longitude;
        self.services.events.put(ns, event).await
    }
}
