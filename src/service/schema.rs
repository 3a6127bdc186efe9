//! Table layout of a tenant namespace.
//!
//! Users, connections, events and objects are JSON documents indexed by
//! expressions over the document. Sessions and devices use plain columns.
//! Setup creates every table of the namespace at once, so a service can
//! always resolve references into the tables of its siblings.

use crate::error::Result;
use crate::platform::sql::qualify;

pub const USERS: &str = "users";
pub const CONNECTIONS: &str = "connections";
pub const EVENTS: &str = "events";
pub const OBJECTS: &str = "objects";
pub const SESSIONS: &str = "sessions";
pub const DEVICES: &str = "devices";
pub const APPS: &str = "apps";

/// Expressions shared by queries and indexes; both must match verbatim for
/// SQLite to use an index.
pub mod expr {
    pub const ID: &str = "CAST(json_extract(json_data, '$.id') AS INTEGER)";
    pub const USER_ID: &str = "CAST(json_extract(json_data, '$.user_id') AS INTEGER)";
    pub const OWNER_ID: &str = "CAST(json_extract(json_data, '$.owner_id') AS INTEGER)";
    pub const OBJECT_ID: &str = "CAST(json_extract(json_data, '$.object_id') AS INTEGER)";
    pub const FROM_ID: &str = "CAST(json_extract(json_data, '$.user_from_id') AS INTEGER)";
    pub const TO_ID: &str = "CAST(json_extract(json_data, '$.user_to_id') AS INTEGER)";
    pub const TYPE: &str = "json_extract(json_data, '$.type')";
    pub const VISIBILITY: &str = "json_extract(json_data, '$.visibility')";
    pub const ENABLED: &str = "json_extract(json_data, '$.enabled')";
    pub const DELETED: &str = "json_extract(json_data, '$.deleted')";
    pub const OWNED: &str = "json_extract(json_data, '$.owned')";
    pub const CREATED_AT: &str = "json_extract(json_data, '$.created_at')";
    pub const UPDATED_AT: &str = "json_extract(json_data, '$.updated_at')";
}

fn document_table(ns: &str, table: &str, indexes: &[(&str, &str)]) -> Result<String> {
    let name = qualify(ns, table)?;
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {name} (row_id INTEGER PRIMARY KEY AUTOINCREMENT, json_data TEXT NOT NULL);\n"
    );
    for (suffix, expression) in indexes {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {name}_{suffix} ON {name} ({expression});\n"
        ));
    }
    Ok(sql)
}

/// DDL creating every table of tenant namespace `ns`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidNamespace`] for an unsafe namespace.
pub fn tenant(ns: &str) -> Result<String> {
    use expr::*;

    let mut sql = String::new();
    sql.push_str(&document_table(ns, USERS, &[("id", ID), ("created_at", CREATED_AT)])?);
    sql.push_str(&document_table(
        ns,
        CONNECTIONS,
        &[("from_id", FROM_ID), ("to_id", TO_ID), ("created_at", CREATED_AT)],
    )?);
    sql.push_str(&document_table(
        ns,
        EVENTS,
        &[
            ("id", ID),
            ("user_id", USER_ID),
            ("object_id", OBJECT_ID),
            ("type", TYPE),
            ("visibility", VISIBILITY),
            ("created_at", CREATED_AT),
        ],
    )?);
    // At most one like row per user and post, enabled or not.
    let events = qualify(ns, EVENTS)?;
    sql.push_str(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {events}_like ON {events} ({USER_ID}, {OBJECT_ID})
         WHERE {TYPE} = '{}' AND {OWNED} = 1;\n",
        super::event::TYPE_LIKE
    ));
    sql.push_str(&document_table(
        ns,
        OBJECTS,
        &[
            ("id", ID),
            ("owner_id", OWNER_ID),
            ("object_id", OBJECT_ID),
            ("type", TYPE),
            ("visibility", VISIBILITY),
            ("created_at", CREATED_AT),
        ],
    )?);

    let sessions = qualify(ns, SESSIONS)?;
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {sessions} (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            enabled INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {sessions}_user_id ON {sessions} (user_id);\n"
    ));

    let devices = qualify(ns, DEVICES)?;
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {devices} (
            id INTEGER PRIMARY KEY,
            device_id TEXT NOT NULL,
            endpoint_arn TEXT NOT NULL DEFAULT '',
            platform INTEGER NOT NULL,
            token TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            language TEXT NOT NULL DEFAULT '',
            deleted INTEGER NOT NULL DEFAULT 0,
            disabled INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {devices}_user_id ON {devices} (user_id);
        CREATE INDEX IF NOT EXISTS {devices}_endpoint_arn ON {devices} (endpoint_arn);\n"
    ));

    Ok(sql)
}

/// DDL of the tenant-independent namespace holding the apps.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidNamespace`] for an unsafe namespace.
pub fn global(ns: &str) -> Result<String> {
    use expr::*;

    document_table(
        ns,
        APPS,
        &[
            ("id", ID),
            ("token", "json_extract(json_data, '$.token')"),
            ("backend_token", "json_extract(json_data, '$.backend_token')"),
        ],
    )
}
