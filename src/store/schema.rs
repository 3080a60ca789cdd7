//! Database schema for the notification store.

use crate::config::DEFAULT_TTL_SECS;
use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};

pub const NOTIFICATION_TABLE_NAME: &str = "notification";

// =============================================================================
// Version 1
// =============================================================================

const NOTIFICATION_TABLE_V_1: Table = Table {
    name: NOTIFICATION_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("notification_id", &SqlType::Text),
        sqlite_column!("android_notification_id", &SqlType::Integer, non_null = true),
        sqlite_column!("group_id", &SqlType::Text),
        sqlite_column!("collapse_id", &SqlType::Text),
        sqlite_column!(
            "is_summary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "opened",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "dismissed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("message", &SqlType::Text),
        sqlite_column!("full_data", &SqlType::Text, non_null = true),
        sqlite_column!("created_time", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_notification_android_id", "android_notification_id"),
        ("idx_notification_group_id", "group_id"),
        ("idx_notification_collapse_id", "collapse_id"),
        ("idx_notification_created_time", "created_time"),
    ],
    unique_constraints: &[&["notification_id"]],
};

// =============================================================================
// Version 2 - adds expire_time
// =============================================================================

const NOTIFICATION_TABLE_V_2: Table = Table {
    name: NOTIFICATION_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("notification_id", &SqlType::Text),
        sqlite_column!("android_notification_id", &SqlType::Integer, non_null = true),
        sqlite_column!("group_id", &SqlType::Text),
        sqlite_column!("collapse_id", &SqlType::Text),
        sqlite_column!(
            "is_summary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "opened",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "dismissed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("message", &SqlType::Text),
        sqlite_column!("full_data", &SqlType::Text, non_null = true),
        sqlite_column!("created_time", &SqlType::Integer, non_null = true),
        sqlite_column!("expire_time", &SqlType::Integer),
    ],
    indices: &[
        ("idx_notification_android_id", "android_notification_id"),
        ("idx_notification_group_id", "group_id"),
        ("idx_notification_collapse_id", "collapse_id"),
        ("idx_notification_created_time", "created_time"),
        ("idx_notification_expire_time", "expire_time"),
    ],
    unique_constraints: &[&["notification_id"]],
};

/// Rows written before expiry tracking get the default TTL from their
/// creation time.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "ALTER TABLE {} ADD COLUMN expire_time INTEGER",
            NOTIFICATION_TABLE_NAME
        ),
        [],
    )
    .context("Failed to add expire_time column")?;
    conn.execute(
        &format!(
            "UPDATE {} SET expire_time = created_time + ?1",
            NOTIFICATION_TABLE_NAME
        ),
        params![DEFAULT_TTL_SECS],
    )?;
    NOTIFICATION_TABLE_V_2.create_index(conn, "idx_notification_expire_time", "expire_time")?;
    Ok(())
}

pub const NOTIFICATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[NOTIFICATION_TABLE_V_1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[NOTIFICATION_TABLE_V_2],
        migration: Some(migrate_v1_to_v2),
    },
];
