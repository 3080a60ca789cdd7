//! SQLite-backed notification store.

use super::models::{random_android_id, JobWrite, NotificationRecord, SummaryWrite, NO_ANDROID_ID};
use super::schema::{NOTIFICATION_TABLE_NAME as TABLE, NOTIFICATION_VERSIONED_SCHEMAS};
use super::{NotificationStore, RecordFilter};
use crate::config::DEFAULT_TTL_SECS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const RECORD_COLUMNS: &str = "id, notification_id, android_notification_id, group_id, \
     collapse_id, title, message, full_data, created_time, expire_time, opened, dismissed, is_summary";

/// Live individual rows, displayed or not.
const LIVE_INDIVIDUAL: &str = "dismissed = 0 AND opened = 0 AND is_summary = 0";

/// Live, displayed, individual rows.
const LIVE_DISPLAYED: &str = "dismissed = 0 AND opened = 0 AND is_summary = 0 \
     AND android_notification_id != -1";

const LIVE_SUMMARY_OF_GROUP: &str =
    "group_id = ?1 AND is_summary = 1 AND dismissed = 0 AND opened = 0 ORDER BY id DESC";

/// Notification store shared by every entry point of the process.
///
/// The connection sits behind a mutex, so receiver, worker and restore
/// threads serialize on it; multi-statement writes run in one transaction.
#[derive(Clone)]
pub struct SqliteNotificationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNotificationStore {
    /// Open the store at `db_path`, creating the latest schema for a new file
    /// or validating and migrating an existing one.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open notification database")?;

        let latest = NOTIFICATION_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?;

        if is_new_db {
            info!("Creating new notification database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn
                .query_row("PRAGMA user_version;", [], |row| row.get(0))
                .context("Failed to read database version")?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            if db_version < 1 {
                bail!(
                    "Notification database version {} is invalid (expected >= 1)",
                    db_version
                );
            }
            let db_version = db_version as usize;

            let schema = NOTIFICATION_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version)
                .with_context(|| format!("Unknown notification database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Notification database schema validation failed for version {}",
                    db_version
                )
            })?;

            if db_version < latest.version {
                info!(
                    "Migrating notification database from version {} to {}",
                    db_version, latest.version
                );
                Self::migrate_if_needed(&mut conn, db_version)?;
                latest.validate(&conn)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        NOTIFICATION_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut current = from_version;
        for schema in NOTIFICATION_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            info!(
                "Running notification database migration from version {} to {}",
                current, schema.version
            );
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            current = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Notification database lock poisoned"))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
        let created_at: i64 = row.get("created_time")?;
        Ok(NotificationRecord {
            id: row.get("id")?,
            notification_id: row.get("notification_id")?,
            android_id: row.get("android_notification_id")?,
            group_id: row.get("group_id")?,
            collapse_id: row.get("collapse_id")?,
            title: row.get("title")?,
            body: row.get("message")?,
            full_payload: row.get("full_data")?,
            created_at,
            expire_at: row
                .get::<_, Option<i64>>("expire_time")?
                .unwrap_or(created_at + DEFAULT_TTL_SECS),
            opened: row.get("opened")?,
            dismissed: row.get("dismissed")?,
            is_summary: row.get("is_summary")?,
        })
    }

    fn query_records<P: rusqlite::Params>(
        conn: &Connection,
        where_and_order: &str,
        params: P,
    ) -> Result<Vec<NotificationRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {}",
            RECORD_COLUMNS, TABLE, where_and_order
        ))?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn query_record<P: rusqlite::Params>(
        conn: &Connection,
        where_and_order: &str,
        params: P,
    ) -> Result<Option<NotificationRecord>> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} LIMIT 1",
                    RECORD_COLUMNS, TABLE, where_and_order
                ),
                params,
                Self::row_to_record,
            )
            .optional()?)
    }

    fn count_badge(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", TABLE, LIVE_DISPLAYED),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn android_id_in_use(conn: &Connection, android_id: i32) -> Result<bool> {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE android_notification_id = ?1 AND dismissed = 0 AND opened = 0",
                TABLE
            ),
            params![android_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn write_summary(conn: &Connection, summary: &SummaryWrite) -> Result<()> {
        let existing = Self::query_record(conn, LIVE_SUMMARY_OF_GROUP, params![summary.group_id])?;
        match (existing, &summary.text) {
            (Some(existing), Some(text)) => {
                conn.execute(
                    &format!("UPDATE {} SET message = ?1 WHERE id = ?2", TABLE),
                    params![text, existing.id],
                )
                .with_context(|| format!("Failed to update summary of group {}", summary.group_id))?;
            }
            (Some(_), None) => {}
            (None, text) => {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (notification_id, android_notification_id, group_id, \
                         is_summary, message, full_data, created_time, expire_time) \
                         VALUES (NULL, ?1, ?2, 1, ?3, '{{}}', ?4, ?5)",
                        TABLE
                    ),
                    params![
                        summary.android_id,
                        summary.group_id,
                        text,
                        summary.created_at,
                        summary.expire_at,
                    ],
                )
                .with_context(|| format!("Failed to create summary for group {}", summary.group_id))?;
                debug!(
                    "Created summary row for group {} with android id {}",
                    summary.group_id, summary.android_id
                );
            }
        }
        Ok(())
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn get_by_notification_id(&self, notification_id: &str) -> Result<Option<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_record(&conn, "notification_id = ?1", params![notification_id])
    }

    fn notification_exists(&self, notification_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE notification_id = ?1", TABLE),
            params![notification_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_live_by_android_id(&self, android_id: i32) -> Result<Option<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_record(
            &conn,
            "android_notification_id = ?1 AND dismissed = 0 AND opened = 0 ORDER BY id DESC",
            params![android_id],
        )
    }

    fn find_live_by_collapse_id(&self, collapse_id: &str) -> Result<Option<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_record(
            &conn,
            &format!(
                "collapse_id = ?1 AND {} ORDER BY created_time DESC, id DESC",
                LIVE_DISPLAYED
            ),
            params![collapse_id],
        )
    }

    fn live_group_children(
        &self,
        group_id: &str,
        exclude_android_id: Option<i32>,
    ) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "group_id = ?1 AND {} AND android_notification_id != ?2 \
                 ORDER BY created_time DESC, id DESC",
                LIVE_DISPLAYED
            ),
            params![group_id, exclude_android_id.unwrap_or(NO_ANDROID_ID)],
        )
    }

    fn get_live_summary(&self, group_id: &str) -> Result<Option<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_record(&conn, LIVE_SUMMARY_OF_GROUP, params![group_id])
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            "(?1 IS NULL OR group_id = ?1) AND (?2 = 1 OR (dismissed = 0 AND opened = 0)) \
             ORDER BY created_time DESC, id DESC",
            params![filter.group_id, filter.include_inactive],
        )
    }

    fn persist_job(&self, write: &JobWrite) -> Result<usize> {
        let record = &write.record;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to begin notification transaction")?;

        if let Some(android_id) = write.supersede_android_id {
            let superseded = tx
                .execute(
                    &format!(
                        "UPDATE {} SET dismissed = 1 WHERE android_notification_id = ?1 \
                         AND dismissed = 0 AND opened = 0 AND is_summary = 0 \
                         AND (notification_id IS NULL OR notification_id != ?2)",
                        TABLE
                    ),
                    params![android_id, record.notification_id],
                )
                .context("Failed to dismiss superseded notification")?;
            debug!(
                "Collapse on android id {} superseded {} row(s)",
                android_id, superseded
            );
        }

        tx.execute(
            &format!(
                "INSERT INTO {} (notification_id, android_notification_id, group_id, collapse_id, \
                 title, message, full_data, created_time, expire_time, dismissed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(notification_id) DO UPDATE SET \
                 android_notification_id = excluded.android_notification_id, \
                 group_id = excluded.group_id, \
                 collapse_id = excluded.collapse_id, \
                 title = excluded.title, \
                 message = excluded.message, \
                 full_data = excluded.full_data, \
                 expire_time = excluded.expire_time, \
                 dismissed = excluded.dismissed",
                TABLE
            ),
            params![
                record.notification_id,
                record.android_id,
                record.group_id,
                record.collapse_id,
                record.title,
                record.body,
                record.full_payload,
                record.created_at,
                record.expire_at,
                record.dismissed,
            ],
        )
        .with_context(|| format!("Failed to save notification {}", record.notification_id))?;

        if let Some(summary) = &write.summary {
            Self::write_summary(&tx, summary)?;
        }

        let badge_count = Self::count_badge(&tx)?;
        tx.commit()
            .context("Failed to commit notification transaction")?;
        Ok(badge_count)
    }

    fn allocate_android_id(&self) -> Result<i32> {
        let conn = self.lock()?;
        let mut android_id = random_android_id();
        while Self::android_id_in_use(&conn, android_id)? {
            android_id = random_android_id();
        }
        Ok(android_id)
    }

    fn update_summary_text(&self, android_id: i32, text: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "UPDATE {} SET message = ?1 WHERE android_notification_id = ?2 AND is_summary = 1",
                TABLE
            ),
            params![text, android_id],
        )?;
        Ok(())
    }

    fn mark_dismissed(&self, android_ids: &[i32]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        for android_id in android_ids {
            changed += tx.execute(
                &format!(
                    "UPDATE {} SET dismissed = 1 WHERE android_notification_id = ?1 \
                     AND dismissed = 0 AND opened = 0",
                    TABLE
                ),
                params![android_id],
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    fn mark_opened(&self, android_ids: &[i32]) -> Result<Vec<NotificationRecord>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut opened = Vec::new();
        for android_id in android_ids {
            let rows = Self::query_records(
                &tx,
                "android_notification_id = ?1 AND dismissed = 0 AND opened = 0",
                params![android_id],
            )?;
            tx.execute(
                &format!(
                    "UPDATE {} SET opened = 1 WHERE android_notification_id = ?1 \
                     AND dismissed = 0 AND opened = 0",
                    TABLE
                ),
                params![android_id],
            )?;
            opened.extend(rows.into_iter().map(|mut r| {
                r.opened = true;
                r
            }));
        }
        tx.commit()?;
        Ok(opened)
    }

    fn open_group(&self, group_id: &str) -> Result<Vec<NotificationRecord>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = Self::query_records(
            &tx,
            "group_id = ?1 AND dismissed = 0 AND opened = 0 ORDER BY created_time DESC, id DESC",
            params![group_id],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET opened = 1 WHERE group_id = ?1 AND dismissed = 0 AND opened = 0",
                TABLE
            ),
            params![group_id],
        )?;
        tx.commit()?;
        Ok(rows
            .into_iter()
            .map(|mut r| {
                r.opened = true;
                r
            })
            .collect())
    }

    fn dismiss_group(&self, group_id: &str) -> Result<Vec<i32>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let visible: Vec<i32> = Self::query_records(
            &tx,
            "group_id = ?1 AND dismissed = 0 AND opened = 0 AND android_notification_id != -1",
            params![group_id],
        )?
        .into_iter()
        .map(|r| r.android_id)
        .collect();
        tx.execute(
            &format!(
                "UPDATE {} SET dismissed = 1 WHERE group_id = ?1 AND dismissed = 0 AND opened = 0",
                TABLE
            ),
            params![group_id],
        )?;
        tx.commit()?;
        Ok(visible)
    }

    fn dismiss_all(&self) -> Result<Vec<i32>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let visible: Vec<i32> = Self::query_records(
            &tx,
            "dismissed = 0 AND opened = 0 AND android_notification_id != -1",
            [],
        )?
        .into_iter()
        .map(|r| r.android_id)
        .collect();
        tx.execute(
            &format!(
                "UPDATE {} SET dismissed = 1 WHERE dismissed = 0 AND opened = 0",
                TABLE
            ),
            [],
        )?;
        tx.commit()?;
        Ok(visible)
    }

    fn delete_expired(&self, now: i64) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                &format!(
                    "DELETE FROM {} WHERE expire_time IS NOT NULL AND expire_time < ?1",
                    TABLE
                ),
                params![now],
            )
            .context("Failed to delete expired notifications")?;
        Ok(deleted)
    }

    fn delete_created_before(&self, cutoff: i64) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                &format!("DELETE FROM {} WHERE created_time < ?1", TABLE),
                params![cutoff],
            )
            .context("Failed to delete stale notifications")?;
        Ok(deleted)
    }

    fn restore_candidates(&self, created_after: i64) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!(
                "created_time > ?1 AND {} ORDER BY created_time ASC, id ASC",
                LIVE_INDIVIDUAL
            ),
            params![created_after],
        )
    }

    fn live_displayed(&self) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            &format!("{} ORDER BY created_time ASC, id ASC", LIVE_DISPLAYED),
            [],
        )
    }

    fn badge_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        Self::count_badge(&conn)
    }
}
