//! Local notification storage: the single source of truth for dedup,
//! grouping, restore and badge counting.

mod models;
mod schema;
mod sqlite_store;

pub use models::{
    random_android_id, JobWrite, NewNotification, NotificationRecord, SummaryWrite,
    NO_ANDROID_ID,
};
pub(crate) use models::preview_line;
pub use schema::{NOTIFICATION_TABLE_NAME, NOTIFICATION_VERSIONED_SCHEMAS};
pub use sqlite_store::SqliteNotificationStore;

use anyhow::Result;

/// Filter for listing rows.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub group_id: Option<String>,
    /// Also return opened and dismissed rows.
    pub include_inactive: bool,
}

/// Storage operations needed by the pipeline.
///
/// "Live" means not dismissed and not opened. "Displayed" means the row has a
/// real android id (not [`NO_ANDROID_ID`]).
pub trait NotificationStore: Send + Sync {
    // === Lookups ===

    /// Get the row carrying a backend notification id.
    fn get_by_notification_id(&self, notification_id: &str) -> Result<Option<NotificationRecord>>;

    /// Whether any row, in any state, carries this backend notification id.
    fn notification_exists(&self, notification_id: &str) -> Result<bool>;

    /// Get the live row currently shown under an android id, summary rows included.
    fn get_live_by_android_id(&self, android_id: i32) -> Result<Option<NotificationRecord>>;

    /// Most recent live displayed row sharing a collapse key.
    fn find_live_by_collapse_id(&self, collapse_id: &str) -> Result<Option<NotificationRecord>>;

    /// Live displayed non-summary rows of a group, newest first.
    /// `exclude_android_id` drops a row being superseded by collapse.
    fn live_group_children(
        &self,
        group_id: &str,
        exclude_android_id: Option<i32>,
    ) -> Result<Vec<NotificationRecord>>;

    /// The live summary row of a group, if one exists.
    fn get_live_summary(&self, group_id: &str) -> Result<Option<NotificationRecord>>;

    /// List rows, newest first.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<NotificationRecord>>;

    // === Writes (each one transaction) ===

    /// Apply a generation job: dismiss superseded rows, upsert the row keyed
    /// by notification id, then create or update the group summary row.
    /// Returns the badge count after the write.
    fn persist_job(&self, write: &JobWrite) -> Result<usize>;

    /// A random android id not shown by any live row.
    fn allocate_android_id(&self) -> Result<i32>;

    /// Store the rendered summary text on a summary row.
    fn update_summary_text(&self, android_id: i32, text: &str) -> Result<()>;

    /// Mark live rows with these android ids dismissed. Returns rows changed.
    fn mark_dismissed(&self, android_ids: &[i32]) -> Result<usize>;

    /// Mark live rows with these android ids opened. Returns the opened rows.
    fn mark_opened(&self, android_ids: &[i32]) -> Result<Vec<NotificationRecord>>;

    /// Mark every live row of a group (summary included) opened.
    fn open_group(&self, group_id: &str) -> Result<Vec<NotificationRecord>>;

    /// Dismiss every live row of a group (summary included).
    /// Returns the android ids that were visible.
    fn dismiss_group(&self, group_id: &str) -> Result<Vec<i32>>;

    /// Dismiss every live row. Returns the android ids that were visible.
    fn dismiss_all(&self) -> Result<Vec<i32>>;

    // === Maintenance ===

    /// Hard delete rows whose expire time is before `now`.
    fn delete_expired(&self, now: i64) -> Result<usize>;

    /// Hard delete rows created before `cutoff`, whatever their state.
    fn delete_created_before(&self, cutoff: i64) -> Result<usize>;

    /// Live non-summary rows created after `created_after`, oldest first.
    /// Rows that were never displayed are included.
    fn restore_candidates(&self, created_after: i64) -> Result<Vec<NotificationRecord>>;

    /// Every live displayed non-summary row, oldest first.
    fn live_displayed(&self) -> Result<Vec<NotificationRecord>>;

    /// Number of live displayed non-summary rows.
    fn badge_count(&self) -> Result<usize>;
}
