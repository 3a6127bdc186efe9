//! Push devices of users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{self, Documents};
use super::schema;
use super::{DayCount, Identity, Store, codec};
use crate::error::{Error, Result};
use crate::platform::flake;
use crate::platform::sql::{Clauses, Row, SqlService, Value, qualify};

/// Push platform of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Platform {
    IosSandbox = 1,
    #[default]
    Ios = 2,
    Android = 3,
}

impl TryFrom<u8> for Platform {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::IosSandbox),
            2 => Ok(Self::Ios),
            3 => Ok(Self::Android),
            other => Err(Error::InvalidDevice(format!("unsupported platform {other}"))),
        }
    }
}

impl From<Platform> for u8 {
    fn from(p: Platform) -> Self {
        p as u8
    }
}

/// Device registered for push delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, with = "codec::id")]
    pub id: u64,
    pub device_id: String,
    /// Opaque handle into the push provider.
    #[serde(default)]
    pub endpoint_arn: String,
    pub platform: Platform,
    pub token: String,
    #[serde(with = "codec::id")]
    pub user_id: u64,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, with = "codec::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "codec::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// # Errors
    ///
    /// Returns [`Error::InvalidDevice`] when an identifying field is missing.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(Error::InvalidDevice("missing device id".into()));
        }
        if self.token.is_empty() {
            return Err(Error::InvalidDevice("missing token".into()));
        }
        if self.user_id == 0 {
            return Err(Error::InvalidDevice("missing user id".into()));
        }
        Ok(())
    }
}

impl Identity for Device {
    type Query = DeviceQuery;

    fn identity(&self) -> Option<DeviceQuery> {
        (self.id != 0).then(|| DeviceQuery {
            ids: vec![self.id],
            ..Default::default()
        })
    }
}

/// Filters of a device query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    pub deleted: Option<bool>,
    pub device_ids: Vec<String>,
    pub disabled: Option<bool>,
    pub endpoint_arns: Vec<String>,
    pub ids: Vec<u64>,
    pub platforms: Vec<Platform>,
    pub user_ids: Vec<u64>,
}

fn clauses(opts: &DeviceQuery) -> Result<Clauses> {
    let mut c = Clauses::default();
    c.eq_opt("deleted", opts.deleted);
    c.any_of("device_id", opts.device_ids.iter());
    c.eq_opt("disabled", opts.disabled);
    c.any_of("endpoint_arn", opts.endpoint_arns.iter());
    document::ids(&mut c, "id", &opts.ids)?;
    c.any_of("platform", opts.platforms.iter().map(|p| u8::from(*p)));
    document::ids(&mut c, "user_id", &opts.user_ids)?;
    Ok(c)
}

const COLUMNS: &str =
    "id, device_id, endpoint_arn, platform, token, user_id, language, deleted, disabled, created_at, updated_at";

fn from_row(row: &Row) -> Result<Device> {
    let platform = u8::try_from(row.integer("platform")?).unwrap_or(0);
    let timestamp = |col: &str| -> Result<DateTime<Utc>> {
        Ok(codec::parse_timestamp(row.text(col)?).map_err(anyhow::Error::from)?)
    };
    Ok(Device {
        id: u64::try_from(row.integer("id")?).unwrap_or(0),
        device_id: row.text("device_id")?.to_string(),
        endpoint_arn: row.text("endpoint_arn")?.to_string(),
        platform: Platform::try_from(platform)?,
        token: row.text("token")?.to_string(),
        user_id: u64::try_from(row.integer("user_id")?).unwrap_or(0),
        language: row.text("language")?.to_string(),
        deleted: row.integer("deleted")? != 0,
        disabled: row.integer("disabled")? != 0,
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

/// Device storage on a plain SQLite table.
pub struct SqlDeviceStore {
    docs: Documents,
}

impl SqlDeviceStore {
    pub fn new(sql: SqlService) -> Self {
        Self {
            docs: Documents::new(sql, schema::DEVICES, schema::tenant),
        }
    }

    fn sql(&self) -> &SqlService {
        self.docs.sql()
    }
}

#[async_trait]
impl Store for SqlDeviceStore {
    type Entity = Device;
    type Query = DeviceQuery;

    fn name(&self) -> &'static str {
        "devices"
    }

    async fn put(&self, ns: &str, mut device: Device) -> Result<Device> {
        device.validate()?;
        self.docs.ensure_user(ns, device.user_id).await?;

        let table = qualify(ns, schema::DEVICES)?;
        let setup = schema::tenant(ns)?;
        let now = Utc::now();
        device.updated_at = now;

        if device.id == 0 {
            device.id = flake::next_id(ns, schema::DEVICES);
            device.created_at = now;
            self.sql()
                .execute_or_setup(
                    &setup,
                    &format!("INSERT INTO {table} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                    &[
                        Value::try_from(device.id)?,
                        Value::from(&device.device_id),
                        Value::from(&device.endpoint_arn),
                        Value::from(u8::from(device.platform)),
                        Value::from(&device.token),
                        Value::try_from(device.user_id)?,
                        Value::from(&device.language),
                        Value::from(device.deleted),
                        Value::from(device.disabled),
                        Value::Text(codec::format_timestamp(&device.created_at)),
                        Value::Text(codec::format_timestamp(&device.updated_at)),
                    ],
                )
                .await?;
            return Ok(device);
        }

        let existing = self
            .query(
                ns,
                &DeviceQuery {
                    ids: vec![device.id],
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("device {}", device.id)))?;
        device.created_at = existing.created_at;

        self.sql()
            .execute_or_setup(
                &setup,
                &format!(
                    "UPDATE {table} SET device_id = ?, endpoint_arn = ?, platform = ?, token = ?, user_id = ?,
                     language = ?, deleted = ?, disabled = ?, updated_at = ? WHERE id = ?"
                ),
                &[
                    Value::from(&device.device_id),
                    Value::from(&device.endpoint_arn),
                    Value::from(u8::from(device.platform)),
                    Value::from(&device.token),
                    Value::try_from(device.user_id)?,
                    Value::from(&device.language),
                    Value::from(device.deleted),
                    Value::from(device.disabled),
                    Value::Text(codec::format_timestamp(&device.updated_at)),
                    Value::try_from(device.id)?,
                ],
            )
            .await?;
        Ok(device)
    }

    async fn query(&self, ns: &str, opts: &DeviceQuery) -> Result<Vec<Device>> {
        let table = qualify(ns, schema::DEVICES)?;
        let c = clauses(opts)?;
        let rows = self
            .sql()
            .query_or_setup(
                &schema::tenant(ns)?,
                &format!("SELECT {COLUMNS} FROM {table}{} ORDER BY created_at DESC", c.render()),
                c.params(),
            )
            .await?;
        rows.iter().map(from_row).collect()
    }

    async fn count(&self, ns: &str, opts: &DeviceQuery) -> Result<u64> {
        self.docs.count(ns, &clauses(opts)?).await
    }

    async fn created_by_day(&self, ns: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DayCount>> {
        self.docs.created_by_day_on(ns, "created_at", start, end).await
    }

    async fn setup(&self, ns: &str) -> Result<()> {
        self.docs.setup(ns).await
    }

    async fn teardown(&self, ns: &str) -> Result<()> {
        self.docs.teardown(ns).await
    }
}
