//! Namespaced storage services.
//!
//! Every entity is served by an implementation of [`Store`]: `put` inserts
//! (id 0) or updates by id, `query`/`count` filter by an options struct whose
//! empty fields mean "no constraint", and `setup`/`teardown` manage the
//! namespace tables. A statement hitting a table that does not exist yet
//! creates the namespace and is retried, so tenants come into existence on
//! their first write.
//!
//! Services are composed with the decorators of [`middleware`] at
//! construction time (see [`Services::new`]).

pub mod app;
pub mod codec;
pub mod connection;
pub mod device;
pub mod document;
pub mod event;
pub mod middleware;
pub mod object;
pub mod schema;
pub mod session;
pub mod source;
pub mod user;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::platform::cache::CountCache;
use crate::platform::queue::QueueService;
use crate::platform::sql::SqlService;

pub use app::{App, AppQuery};
pub use connection::{Connection, ConnectionQuery, ConnectionState, ConnectionType};
pub use device::{Device, DeviceQuery, Platform};
pub use event::{Event, EventQuery, ExternalObject, Target};
pub use object::{Attachment, AttachmentType, Object, ObjectQuery};
pub use session::{Session, SessionQuery};
pub use source::{Consumed, QueueSource, Source, StateChange};
pub use user::{User, UserQuery};

/// Daily count of created entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    /// Day in `YYYY-MM-DD` form.
    pub bucket: String,
    pub count: u64,
}

/// Uniform contract of a namespaced storage service.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Entity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;
    type Query: Clone + Debug + Default + Send + Sync + 'static;

    /// Service name used in logs and metrics, e.g. `users`.
    fn name(&self) -> &'static str;

    /// Inserts the entity when it has no id, otherwise updates it by id.
    async fn put(&self, ns: &str, entity: Self::Entity) -> Result<Self::Entity>;

    /// Stores every entity in one write. Stores without transactions fall
    /// back to one `put` per entity.
    async fn put_all(&self, ns: &str, entities: Vec<Self::Entity>) -> Result<Vec<Self::Entity>> {
        let mut stored = Vec::with_capacity(entities.len());
        for entity in entities {
            stored.push(self.put(ns, entity).await?);
        }
        Ok(stored)
    }

    /// Entities matching `opts`, newest first.
    async fn query(&self, ns: &str, opts: &Self::Query) -> Result<Vec<Self::Entity>>;

    /// Number of entities matching `opts`.
    async fn count(&self, ns: &str, opts: &Self::Query) -> Result<u64>;

    /// Entities created per day within `[start, end]`.
    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>>;

    /// Creates the namespace tables. Idempotent.
    async fn setup(&self, ns: &str) -> Result<()>;

    /// Drops the tables of this service in the namespace.
    async fn teardown(&self, ns: &str) -> Result<()>;
}

/// Query locating the stored version of an entity, used to load the old
/// state before a change is propagated.
pub trait Identity {
    type Query;

    /// `None` when the entity is new.
    fn identity(&self) -> Option<Self::Query>;
}

pub type AppService = Arc<dyn Store<Entity = App, Query = AppQuery>>;
pub type ConnectionService = Arc<dyn Store<Entity = Connection, Query = ConnectionQuery>>;
pub type DeviceService = Arc<dyn Store<Entity = Device, Query = DeviceQuery>>;
pub type EventService = Arc<dyn Store<Entity = Event, Query = EventQuery>>;
pub type ObjectService = Arc<dyn Store<Entity = Object, Query = ObjectQuery>>;
pub type SessionService = Arc<dyn Store<Entity = Session, Query = SessionQuery>>;
pub type UserService = Arc<dyn Store<Entity = User, Query = UserQuery>>;

/// Queue names of the change sources.
pub mod queues {
    pub const CONNECTION: &str = "connection-state-change";
    pub const EVENT: &str = "event-state-change";
    pub const OBJECT: &str = "object-state-change";
    pub const ENDPOINT: &str = "endpoint-state-change";
}

/// Who may observe a post or event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Visibility {
    #[default]
    Private = 10,
    Connection = 20,
    Public = 30,
    Global = 40,
}

impl TryFrom<u8> for Visibility {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            10 => Ok(Self::Private),
            20 => Ok(Self::Connection),
            30 => Ok(Self::Public),
            40 => Ok(Self::Global),
            other => Err(Error::invalid(format!("unsupported visibility {other}"))),
        }
    }
}

impl From<Visibility> for u8 {
    fn from(v: Visibility) -> Self {
        v as u8
    }
}

/// Fully decorated services of one deployment.
#[derive(Clone)]
pub struct Services {
    pub apps: AppService,
    pub connections: ConnectionService,
    pub devices: DeviceService,
    pub events: EventService,
    pub objects: ObjectService,
    pub sessions: SessionService,
    pub users: UserService,
    sql: SqlService,
}

impl Services {
    /// Builds every service over `sql`, wrapped innermost first in sourcing
    /// (connections, events, objects), count caching, instrumentation and
    /// logging.
    pub fn new(sql: SqlService, queue: QueueService, cache: CountCache) -> Self {
        use middleware::{Cached, Instrumented, Logging, Sourced};

        fn decorate<S: Store>(inner: S, cache: &CountCache) -> Arc<dyn Store<Entity = S::Entity, Query = S::Query>> {
            Arc::new(Logging::new(Instrumented::new(Cached::new(inner, cache.clone()), "sqlite")))
        }

        let connection_source = Arc::new(QueueSource::<Connection>::new(queue.clone(), queues::CONNECTION));
        let event_source = Arc::new(QueueSource::<Event>::new(queue.clone(), queues::EVENT));
        let object_source = Arc::new(QueueSource::<Object>::new(queue, queues::OBJECT));

        Self {
            apps: decorate(app::SqlAppStore::new(sql.clone()), &cache),
            connections: decorate(
                Sourced::new(connection::SqlConnectionStore::new(sql.clone()), connection_source),
                &cache,
            ),
            devices: decorate(device::SqlDeviceStore::new(sql.clone()), &cache),
            events: decorate(Sourced::new(event::SqlEventStore::new(sql.clone()), event_source), &cache),
            objects: decorate(Sourced::new(object::SqlObjectStore::new(sql.clone()), object_source), &cache),
            sessions: decorate(session::SqlSessionStore::new(sql.clone()), &cache),
            users: decorate(user::SqlUserStore::new(sql.clone()), &cache),
            sql,
        }
    }

    /// Checks that the store answers.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the health query.
    pub async fn ping(&self) -> Result<()> {
        self.sql.query("SELECT 1", &[]).await?;
        Ok(())
    }
}
