//! Users, credentials and sessions.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::Deserialize;
use std::fmt;

use super::{Origin, Page, enrich_relations, follower_ids, following_ids, friend_ids, query_relation};
use crate::error::{Error, Result};
use crate::service::codec::Redacted;
use crate::service::{Services, Session, SessionQuery, User, UserQuery};

const SESSION_LEN: usize = 32;
const SEARCH_MIN: usize = 3;

/// Argon2id verifier of `password` in PHC string format.
///
/// # Errors
///
/// Returns [`Error::Storage`] when hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Storage(anyhow::anyhow!("hash password: {e}")))
}

/// Checks `password` against a PHC verifier. Malformed verifiers never match.
pub fn verify_password(verifier: &str, password: &str) -> bool {
    PasswordHash::new(verifier)
        .is_ok_and(|hash| Argon2::default().verify_password(password.as_bytes(), &hash).is_ok())
}

// Argon2 is CPU and memory heavy; keep it off the async workers.
async fn hash_off_thread(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)?
}

async fn verify_off_thread(verifier: String, password: String) -> Result<bool> {
    let matched = tokio::task::spawn_blocking(move || verify_password(&verifier, &password))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(matched)
}

fn session_token() -> String {
    let mut raw = [0u8; SESSION_LEN];
    rand::thread_rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

/// Login form: email or username plus password.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "user_name")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &Redacted(&self.password))
            .finish()
    }
}

impl Credentials {
    fn from_user(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            username: user.username.clone(),
            password: user.password.clone(),
        }
    }
}

/// User operations.
#[derive(Clone)]
pub struct UserController {
    services: Services,
}

impl UserController {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn find(&self, ns: &str, query: UserQuery) -> Result<Option<User>> {
        let query = UserQuery {
            enabled: Some(true),
            limit: Some(1),
            ..query
        };
        Ok(self.services.users.query(ns, &query).await?.into_iter().next())
    }

    async fn enabled(&self, ns: &str, id: u64) -> Result<User> {
        self.find(
            ns,
            UserQuery {
                ids: vec![id],
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("user {id}")))
    }

    /// Enabled user registered with `email` or `username`.
    async fn by_login(&self, ns: &str, email: &str, username: &str) -> Result<Option<User>> {
        if !email.is_empty()
            && let Some(user) = self
                .find(
                    ns,
                    UserQuery {
                        emails: vec![email.to_string()],
                        ..Default::default()
                    },
                )
                .await?
        {
            return Ok(Some(user));
        }
        if !username.is_empty() {
            return self
                .find(
                    ns,
                    UserQuery {
                        usernames: vec![username.to_string()],
                        ..Default::default()
                    },
                )
                .await;
        }
        Ok(None)
    }

    async fn issue_session(&self, ns: &str, mut user: User) -> Result<User> {
        let session = self
            .services
            .sessions
            .put(
                ns,
                Session {
                    id: session_token(),
                    user_id: user.id,
                    enabled: true,
                    ..Default::default()
                },
            )
            .await?;
        user.password.clear();
        user.session_token = Some(session.id);
        Ok(user)
    }

    /// Registers a user and opens a session. Signing up again with the
    /// credentials of an existing user logs in instead.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUser`] for invalid fields
    /// - [`Error::Unauthorized`] when the login or email is taken and the
    ///   password does not match
    pub async fn create(&self, ns: &str, mut user: User) -> Result<User> {
        if self.by_login(ns, &user.email, &user.username).await?.is_some() {
            return self.login(ns, Credentials::from_user(&user)).await;
        }

        user.validate()?;
        user.id = 0;
        user.password = hash_off_thread(std::mem::take(&mut user.password)).await?;
        user.enabled = true;
        user.deleted = false;
        user.last_read = None;
        user.clear_derived();

        let created = self.services.users.put(ns, user).await?;
        self.issue_session(ns, created).await
    }

    /// Opens a session for matching credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown login and
    /// [`Error::Unauthorized`] for a wrong password.
    pub async fn login(&self, ns: &str, credentials: Credentials) -> Result<User> {
        if credentials.email.is_empty() && credentials.username.is_empty() {
            return Err(Error::InvalidUser("email or username must be set".into()));
        }
        let user = self
            .by_login(ns, &credentials.email, &credentials.username)
            .await?
            .ok_or_else(|| Error::not_found("user"))?;
        if !verify_off_thread(user.password.clone(), credentials.password).await? {
            return Err(Error::unauthorized("password mismatch"));
        }
        self.issue_session(ns, user).await
    }

    /// Closes the session of the origin. Closing a closed session succeeds.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn logout(&self, ns: &str, origin: &Origin, token: &str) -> Result<()> {
        let sessions = self
            .services
            .sessions
            .query(
                ns,
                &SessionQuery {
                    enabled: Some(true),
                    ids: vec![token.to_string()],
                    user_ids: vec![origin.user_id],
                    ..Default::default()
                },
            )
            .await?;
        for mut session in sessions {
            session.enabled = false;
            self.services.sessions.put(ns, session).await?;
        }
        Ok(())
    }

    /// Enabled user owning an enabled session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for unknown or closed sessions and
    /// storage errors as they are.
    pub async fn by_session(&self, ns: &str, token: &str) -> Result<User> {
        let session = self
            .services
            .sessions
            .query(
                ns,
                &SessionQuery {
                    enabled: Some(true),
                    ids: vec![token.to_string()],
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::unauthorized("session not found"))?;
        self.enabled(ns, session.user_id).await.map_err(|e| {
            if e.is_not_found() {
                Error::unauthorized("session user not found")
            } else {
                e
            }
        })
    }

    /// Enabled user by id, for callers authenticated with a backend token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for unknown users and storage errors
    /// as they are.
    pub async fn by_id(&self, ns: &str, id: u64) -> Result<User> {
        self.enabled(ns, id).await.map_err(|e| {
            if e.is_not_found() {
                Error::unauthorized(format!("user {id} not found"))
            } else {
                e
            }
        })
    }

    async fn count_enabled(&self, ns: &str, ids: Vec<u64>) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.services
            .users
            .count(
                ns,
                &UserQuery {
                    enabled: Some(true),
                    ids,
                    ..Default::default()
                },
            )
            .await
    }

    /// A user with connection counts and their relation to the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown or disabled users.
    pub async fn retrieve(&self, ns: &str, origin: &Origin, id: u64) -> Result<User> {
        let mut user = self.enabled(ns, id).await?;
        user.password.clear();

        if origin.user_id == id {
            user.session_token = origin.session.clone();
        } else {
            query_relation(&self.services, ns, origin.user_id, id)
                .await?
                .apply(&mut user);
        }

        user.follower_count = Some(self.count_enabled(ns, follower_ids(&self.services, ns, id).await?).await?);
        user.followed_count = Some(self.count_enabled(ns, following_ids(&self.services, ns, id).await?).await?);
        user.friend_count = Some(self.count_enabled(ns, friend_ids(&self.services, ns, id).await?).await?);
        Ok(user)
    }

    async fn ensure_unique(&self, ns: &str, query: UserQuery, id: u64, field: &str) -> Result<()> {
        if let Some(other) = self.find(ns, query).await?
            && other.id != id
        {
            return Err(Error::InvalidUser(format!("{field} already in use")));
        }
        Ok(())
    }

    /// Replaces the profile of the origin. The password is kept unless a
    /// new one is sent.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when the origin is gone
    /// - [`Error::InvalidUser`] for invalid fields or a taken email/username
    pub async fn update(&self, ns: &str, origin: &Origin, mut new: User) -> Result<User> {
        let old = self.enabled(ns, origin.user_id).await?;

        if !new.email.is_empty() && new.email != old.email {
            let query = UserQuery {
                emails: vec![new.email.clone()],
                ..Default::default()
            };
            self.ensure_unique(ns, query, old.id, "email").await?;
        }
        if !new.username.is_empty() && new.username != old.username {
            let query = UserQuery {
                usernames: vec![new.username.clone()],
                ..Default::default()
            };
            self.ensure_unique(ns, query, old.id, "username").await?;
        }

        let password = if new.password.is_empty() {
            old.password.clone()
        } else {
            new.validate()?;
            hash_off_thread(new.password.clone()).await?
        };
        new.id = old.id;
        new.password = password;
        new.enabled = true;
        new.deleted = false;
        new.last_read = old.last_read;
        new.clear_derived();
        new.validate()?;

        self.services.users.put(ns, new).await?;
        self.retrieve(ns, origin, origin.user_id).await
    }

    /// Disables and marks the origin deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the origin is gone.
    pub async fn delete(&self, ns: &str, origin: &Origin) -> Result<()> {
        let mut user = self.enabled(ns, origin.user_id).await?;
        user.enabled = false;
        user.deleted = true;
        self.services.users.put(ns, user).await?;
        Ok(())
    }

    async fn list(&self, ns: &str, origin: &Origin, query: UserQuery) -> Result<Vec<User>> {
        let query = UserQuery {
            enabled: Some(true),
            ..query
        };
        let mut users = self.services.users.query(ns, &query).await?;
        users.retain(|u| u.id != origin.user_id);
        for user in &mut users {
            user.password.clear();
        }
        enrich_relations(&self.services, ns, origin.user_id, &mut users).await?;
        Ok(users)
    }

    /// Users registered with any of `emails`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_by_emails(&self, ns: &str, origin: &Origin, emails: Vec<String>) -> Result<Vec<User>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let query = UserQuery {
            emails,
            ..Default::default()
        };
        self.list(ns, origin, query).await
    }

    /// Users registered with any of `ids` on `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUser`] for an unsupported platform name.
    pub async fn list_by_platform_ids(
        &self,
        ns: &str,
        origin: &Origin,
        platform: &str,
        ids: Vec<String>,
    ) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = UserQuery {
            social_ids: [(platform.to_string(), ids)].into(),
            ..Default::default()
        };
        self.list(ns, origin, query).await
    }

    /// Prefix search over username, email, first and last name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntity`] for terms shorter than three
    /// characters.
    pub async fn search(&self, ns: &str, origin: &Origin, term: &str, page: Page) -> Result<Vec<User>> {
        if term.chars().count() < SEARCH_MIN {
            return Err(Error::invalid(format!("search: query must be at least {SEARCH_MIN} characters")));
        }
        let query = UserQuery {
            after: page.after,
            before: page.before,
            limit: Some(page.limit),
            search: Some(term.to_string()),
            ..Default::default()
        };
        self.list(ns, origin, query).await
    }
}
