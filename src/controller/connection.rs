//! Follow and friend state machine.

use std::collections::BTreeMap;
use tracing::debug;

use super::{Listing, Origin, Page, enrich_relations, query_relations, users_by_ids};
use crate::error::{Error, Result};
use crate::service::{Connection, ConnectionQuery, ConnectionState, ConnectionType, Services, User, UserQuery};

/// Checks a state change of a connection.
///
/// Accepted: `∅ → pending`, `pending → confirmed`, `pending → rejected`,
/// `confirmed → rejected` and any same-state change.
///
/// # Errors
///
/// Returns [`Error::InvalidEntity`] for every other pair.
pub fn validate_transition(old: Option<ConnectionState>, new: ConnectionState) -> Result<()> {
    use ConnectionState::{Confirmed, Pending, Rejected};

    let allowed = match (old, new) {
        (None, Pending) => true,
        (Some(old), new) if old == new => true,
        (Some(Pending), Confirmed | Rejected) => true,
        (Some(Confirmed), Rejected) => true,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        let from = old.map_or("none", ConnectionState::as_str);
        Err(Error::invalid(format!("connection: invalid transition {from} -> {new}")))
    }
}

/// Connection operations of the current user.
#[derive(Clone)]
pub struct ConnectionController {
    services: Services,
}

impl ConnectionController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Enabled connections of `kind` between the two users in either
    /// direction.
    async fn between(&self, ns: &str, a: u64, b: u64, kind: ConnectionType) -> Result<Vec<Connection>> {
        self.services
            .connections
            .query(
                ns,
                &ConnectionQuery {
                    enabled: Some(true),
                    from_ids: vec![a, b],
                    to_ids: vec![a, b],
                    types: vec![kind],
                    ..Default::default()
                },
            )
            .await
    }

    async fn ensure_user(&self, ns: &str, id: u64) -> Result<()> {
        let found = self
            .services
            .users
            .query(
                ns,
                &UserQuery {
                    enabled: Some(true),
                    ids: vec![id],
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        if found.is_empty() {
            return Err(Error::not_found(format!("user {id}")));
        }
        Ok(())
    }

    /// Creates or transitions the connection from the origin to `new.to_id`.
    ///
    /// A friend request is matched in either direction, so the receiving
    /// side confirms with the requester as `to_id`. A pending follow request
    /// is matched the same way when the receiver answers it. A follow may be
    /// created confirmed right away.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the target user is unknown
    /// - [`Error::InvalidConnection`] for self-connections
    /// - [`Error::InvalidEntity`] for disallowed transitions or a transition
    ///   issued by the wrong side
    pub async fn update(&self, ns: &str, origin: &Origin, mut new: Connection) -> Result<Connection> {
        new.from_id = origin.user_id;
        new.validate()?;
        self.ensure_user(ns, new.to_id).await?;

        let existing = self.between(ns, new.from_id, new.to_id, new.kind).await?;
        let exact = existing
            .iter()
            .find(|c| c.from_id == new.from_id && c.to_id == new.to_id);
        let reversed = existing
            .iter()
            .find(|c| c.from_id == new.to_id && c.to_id == new.from_id);
        let old = match new.kind {
            ConnectionType::Friend => exact.or(reversed),
            ConnectionType::Follow => {
                exact.or(reversed.filter(|c| c.state == ConnectionState::Pending && new.state != ConnectionState::Pending))
            },
        };

        let Some(old) = old.cloned() else {
            if !(new.kind == ConnectionType::Follow && new.state == ConnectionState::Confirmed) {
                validate_transition(None, new.state)?;
            }
            new.enabled = true;
            return self.services.connections.put(ns, new).await;
        };

        if old.state == new.state {
            debug!(target: "controller", from = old.from_id, to = old.to_id, state = %old.state, "connection unchanged");
            return Ok(old);
        }

        validate_transition(Some(old.state), new.state)?;
        if origin.user_id != old.to_id {
            return Err(Error::invalid(format!(
                "connection: {} can only be set by user {}",
                new.state, old.to_id
            )));
        }

        let next = Connection {
            state: new.state,
            enabled: true,
            ..old
        };
        self.services.connections.put(ns, next).await
    }

    /// Disables the connection of `kind` from the origin to `to_id`; friend
    /// connections are disabled in both directions. Deleting an absent
    /// connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn delete(&self, ns: &str, origin: &Origin, kind: ConnectionType, to_id: u64) -> Result<()> {
        let disabled: Vec<Connection> = self
            .between(ns, origin.user_id, to_id, kind)
            .await?
            .into_iter()
            .filter(|con| kind == ConnectionType::Friend || con.from_id == origin.user_id)
            .map(|con| Connection { enabled: false, ..con })
            .collect();
        if disabled.is_empty() {
            return Ok(());
        }
        // Both directions of a friendship go down in one write.
        self.services.connections.put_all(ns, disabled).await?;
        Ok(())
    }

    /// Connects the origin to every user registered with one of `ids` on
    /// `platform`, returning those users with their relation.
    ///
    /// # Errors
    ///
    /// Propagates the first failing [`ConnectionController::update`].
    pub async fn create_social(
        &self,
        ns: &str,
        origin: &Origin,
        platform: &str,
        ids: Vec<String>,
        kind: ConnectionType,
        state: ConnectionState,
    ) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut users = self
            .services
            .users
            .query(
                ns,
                &UserQuery {
                    enabled: Some(true),
                    social_ids: BTreeMap::from([(platform.to_string(), ids)]),
                    ..Default::default()
                },
            )
            .await?;
        users.retain(|u| u.id != origin.user_id);

        for user in &users {
            let con = Connection {
                to_id: user.id,
                kind,
                state,
                ..Default::default()
            };
            self.update(ns, origin, con)
                .await
                .map_err(|e| e.context(format!("social connection to {}", user.id)))?;
        }

        for user in &mut users {
            user.password.clear();
        }
        enrich_relations(&self.services, ns, origin.user_id, &mut users).await?;
        Ok(users)
    }

    /// Incoming and outgoing connections of the origin at `state`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn by_state(&self, ns: &str, origin: &Origin, state: ConnectionState) -> Result<Listing<Connection>> {
        let query = |from_ids: Vec<u64>, to_ids: Vec<u64>| ConnectionQuery {
            enabled: Some(true),
            from_ids,
            states: vec![state],
            to_ids,
            ..Default::default()
        };
        let mut items = self
            .services
            .connections
            .query(ns, &query(vec![], vec![origin.user_id]))
            .await?;
        items.extend(
            self.services
                .connections
                .query(ns, &query(vec![origin.user_id], vec![]))
                .await?,
        );
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let counterparties = items.iter().map(|c| c.counterparty(origin.user_id));
        let users = users_by_ids(&self.services, ns, counterparties).await?;
        Ok(Listing { items, users })
    }

    async fn list(
        &self,
        ns: &str,
        origin: &Origin,
        user_id: u64,
        kinds: &[(ConnectionType, bool)],
        page: Page,
    ) -> Result<Vec<User>> {
        let mut cons = Vec::new();
        for (kind, outgoing) in kinds {
            let (from_ids, to_ids) = if *outgoing {
                (vec![user_id], vec![])
            } else {
                (vec![], vec![user_id])
            };
            cons.extend(
                self.services
                    .connections
                    .query(
                        ns,
                        &ConnectionQuery {
                            after: page.after,
                            before: page.before,
                            enabled: Some(true),
                            from_ids,
                            limit: Some(page.limit),
                            states: vec![ConnectionState::Confirmed],
                            to_ids,
                            types: vec![*kind],
                        },
                    )
                    .await?,
            );
        }
        cons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(&mut cons);

        let ids: Vec<u64> = cons.iter().map(|c| c.counterparty(user_id)).collect();
        let mut map = users_by_ids(&self.services, ns, ids.iter().copied()).await?;
        let mut users: Vec<User> = ids.iter().filter_map(|id| map.remove(id)).collect();

        let relations = query_relations(&self.services, ns, origin.user_id, &ids).await?;
        for user in &mut users {
            relations.get(&user.id).copied().unwrap_or_default().apply(user);
        }
        Ok(users)
    }

    /// Users following `user_id`, with their relation to the origin.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn followers(&self, ns: &str, origin: &Origin, user_id: u64, page: Page) -> Result<Vec<User>> {
        self.list(ns, origin, user_id, &[(ConnectionType::Follow, false)], page)
            .await
    }

    /// Users `user_id` follows.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn followings(&self, ns: &str, origin: &Origin, user_id: u64, page: Page) -> Result<Vec<User>> {
        self.list(ns, origin, user_id, &[(ConnectionType::Follow, true)], page)
            .await
    }

    /// Friends of `user_id` regardless of who sent the request.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn friends(&self, ns: &str, origin: &Origin, user_id: u64, page: Page) -> Result<Vec<User>> {
        self.list(
            ns,
            origin,
            user_id,
            &[(ConnectionType::Friend, true), (ConnectionType::Friend, false)],
            page,
        )
        .await
    }
}
