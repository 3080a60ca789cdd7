//! Notification store data models

use rand::Rng;
use serde::Serialize;

/// Sentinel stored in `android_notification_id` for rows that never reached
/// the notification shade.
pub const NO_ANDROID_ID: i32 = -1;

/// Pick a fresh positive android id.
pub fn random_android_id() -> i32 {
    rand::rng().random_range(1..i32::MAX)
}

/// A row of the `notification` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    /// Backend id from `custom.i`. Summary rows have none.
    pub notification_id: Option<String>,
    pub android_id: i32,
    pub group_id: Option<String>,
    pub collapse_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub full_payload: String,
    pub created_at: i64,
    pub expire_at: i64,
    pub opened: bool,
    pub dismissed: bool,
    pub is_summary: bool,
}

impl NotificationRecord {
    /// Not dismissed and not opened.
    pub fn is_live(&self) -> bool {
        !self.dismissed && !self.opened
    }

    pub fn was_displayed(&self) -> bool {
        self.android_id != NO_ANDROID_ID
    }

    /// "Title body" line used in group summaries.
    pub fn preview_line(&self) -> String {
        preview_line(self.title.as_deref(), self.body.as_deref())
    }
}

pub(crate) fn preview_line(title: Option<&str>, body: Option<&str>) -> String {
    match (title.filter(|t| !t.is_empty()), body) {
        (Some(title), Some(body)) => format!("{} {}", title, body),
        (Some(title), None) => title.to_string(),
        (None, body) => body.unwrap_or_default().to_string(),
    }
}

/// Values for inserting or upserting an individual notification row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub notification_id: String,
    pub android_id: i32,
    pub group_id: Option<String>,
    pub collapse_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub full_payload: String,
    pub created_at: i64,
    pub expire_at: i64,
    pub dismissed: bool,
}

/// Everything written for one generation job, applied atomically.
#[derive(Debug, Clone)]
pub struct JobWrite {
    pub record: NewNotification,
    /// Live rows showing this android id are dismissed in the same transaction
    /// (collapse-key replacement).
    pub supersede_android_id: Option<i32>,
    /// Group summary row created or refreshed alongside the notification.
    pub summary: Option<SummaryWrite>,
}

/// Summary row state for a job landing in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWrite {
    pub group_id: String,
    /// Android id for the row when the group has no live summary yet.
    pub android_id: i32,
    /// Rendered text; `None` leaves the stored text alone.
    pub text: Option<String>,
    pub created_at: i64,
    pub expire_at: i64,
}
