use super::overrides::DisplayOverride;
use crate::payload::{ActionButton, NotificationPayload};
use crate::store::{preview_line, random_android_id, NO_ANDROID_ID};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Working copy of one notification while it passes through the pipeline.
///
/// Created per inbound payload or per restored row, never persisted itself.
/// The android id is allocated on first access and stays fixed for the
/// lifetime of the job.
#[derive(Debug)]
pub struct NotificationGenerationJob {
    payload: NotificationPayload,
    notification_id: String,
    restoring: bool,
    shown_timestamp: i64,
    android_id: OnceLock<i32>,
    overrides: DisplayOverride,
}

/// Read-only view of a job handed to host hooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    pub notification_id: String,
    pub android_id: i32,
    pub title: Option<String>,
    pub body: Option<String>,
    pub group_id: Option<String>,
    pub collapse_id: Option<String>,
    pub additional_data: Option<Map<String, Value>>,
    pub action_buttons: Vec<ActionButton>,
    pub priority: i64,
    pub sent_time_ms: Option<i64>,
    pub restoring: bool,
}

impl NotificationGenerationJob {
    pub fn new(payload: NotificationPayload, notification_id: String, shown_timestamp: i64) -> Self {
        Self {
            payload,
            notification_id,
            restoring: false,
            shown_timestamp,
            android_id: OnceLock::new(),
            overrides: DisplayOverride::default(),
        }
    }

    /// Job re-driving a stored row: keeps its android id and timestamp. A row
    /// that was never displayed gets a fresh id if it is shown now.
    pub fn restored(
        payload: NotificationPayload,
        notification_id: String,
        android_id: i32,
        shown_timestamp: i64,
    ) -> Self {
        let job = Self::new(payload, notification_id, shown_timestamp);
        if android_id != NO_ANDROID_ID {
            let _ = job.android_id.set(android_id);
        }
        Self {
            restoring: true,
            ..job
        }
    }

    pub fn with_restoring(mut self, restoring: bool) -> Self {
        self.restoring = restoring;
        self
    }

    /// Fix the android id before anything reads it. Returns false if one was
    /// already allocated.
    pub fn preset_android_id(&self, android_id: i32) -> bool {
        self.android_id.set(android_id).is_ok()
    }

    /// The android id the notification is shown under, allocating it on
    /// first use. An override id wins.
    pub fn android_id(&self) -> i32 {
        self.overrides
            .android_id
            .unwrap_or_else(|| *self.android_id.get_or_init(random_android_id))
    }

    /// The id assigned so far, without allocating.
    pub fn assigned_android_id(&self) -> Option<i32> {
        self.overrides
            .android_id
            .or_else(|| self.android_id.get().copied())
    }

    pub fn apply_override(&mut self, newer: &DisplayOverride) {
        self.overrides = self.overrides.merge(newer);
    }

    pub fn overrides(&self) -> &DisplayOverride {
        &self.overrides
    }

    pub fn payload(&self) -> &NotificationPayload {
        &self.payload
    }

    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn shown_timestamp(&self) -> i64 {
        self.shown_timestamp
    }

    pub fn title(&self) -> Option<String> {
        self.overrides.title.clone().or_else(|| self.payload.title())
    }

    pub fn body(&self) -> Option<String> {
        self.overrides.body.clone().or_else(|| self.payload.body())
    }

    pub fn has_body(&self) -> bool {
        self.body().is_some_and(|b| !b.is_empty())
    }

    pub fn group_id(&self) -> Option<String> {
        self.payload.group_id()
    }

    pub fn preview_line(&self) -> String {
        preview_line(self.title().as_deref(), self.body().as_deref())
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            notification_id: self.notification_id.clone(),
            android_id: self.android_id(),
            title: self.title(),
            body: self.body(),
            group_id: self.payload.group_id(),
            collapse_id: self.payload.collapse_id(),
            additional_data: self.payload.additional_data(),
            action_buttons: self.payload.action_buttons(),
            priority: self.payload.priority(),
            sent_time_ms: self.payload.sent_time_ms(),
            restoring: self.restoring,
        }
    }
}
