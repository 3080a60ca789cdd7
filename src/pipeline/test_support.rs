//! Fakes shared by the pipeline unit tests.

use super::context::PipelineContext;
use super::hooks::NotificationRenderer;
use super::job::{NotificationGenerationJob, NotificationSnapshot};
use super::summary::GroupSummary;
use crate::config::PipelineSettings;
use crate::payload::NotificationPayload;
use crate::store::{
    JobWrite, NewNotification, NotificationRecord, SqliteNotificationStore, SummaryWrite,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct RecordingRenderer {
    displayed: Mutex<Vec<NotificationSnapshot>>,
    summaries: Mutex<Vec<GroupSummary>>,
    cancelled: Mutex<Vec<i32>>,
    visible: Mutex<Vec<i32>>,
    refuse_display: AtomicBool,
}

impl RecordingRenderer {
    pub fn displayed(&self) -> Vec<NotificationSnapshot> {
        self.displayed.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<GroupSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn set_visible(&self, ids: Vec<i32>) {
        *self.visible.lock().unwrap() = ids;
    }

    pub fn refuse_display(&self) {
        self.refuse_display.store(true, Ordering::SeqCst);
    }
}

impl NotificationRenderer for RecordingRenderer {
    fn display(&self, job: &NotificationGenerationJob) -> bool {
        if self.refuse_display.load(Ordering::SeqCst) {
            return false;
        }
        self.displayed.lock().unwrap().push(job.snapshot());
        true
    }

    fn display_summary(&self, summary: &GroupSummary) -> bool {
        self.summaries.lock().unwrap().push(summary.clone());
        true
    }

    fn cancel(&self, android_id: i32) {
        self.cancelled.lock().unwrap().push(android_id);
    }

    fn visible_notification_ids(&self) -> anyhow::Result<Vec<i32>> {
        Ok(self.visible.lock().unwrap().clone())
    }
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        restore_delay_ms: 0,
        boot_restore_delay_secs: 0,
        foreground_timeout_ms: 200,
        ..Default::default()
    }
}

pub fn test_context() -> PipelineContext {
    test_context_with_renderer().0
}

pub fn test_context_with_renderer() -> (PipelineContext, Arc<RecordingRenderer>) {
    test_context_with_settings(test_settings())
}

pub fn test_context_with_settings(
    settings: PipelineSettings,
) -> (PipelineContext, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let store = Arc::new(SqliteNotificationStore::in_memory().unwrap());
    let ctx = PipelineContext::builder(store, renderer.clone())
        .settings(settings)
        .clock(Arc::new(|| 1_000))
        .build();
    (ctx, renderer)
}

pub fn bundle_payload(entries: &[(&str, &str)]) -> NotificationPayload {
    NotificationPayload::from_bundle(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Android id given to summaries stored by [`stored_row_with_summary`].
pub const TEST_SUMMARY_ANDROID_ID: i32 = 99;

/// Store a live displayed row directly.
pub fn stored_row(ctx: &PipelineContext, id: &str, android_id: i32, group: Option<&str>, body: &str) {
    ctx.store
        .persist_job(&row_write(id, android_id, group, body))
        .unwrap();
}

/// Store a live displayed group member together with its group summary row.
pub fn stored_row_with_summary(
    ctx: &PipelineContext,
    id: &str,
    android_id: i32,
    group: &str,
    body: &str,
) -> NotificationRecord {
    let mut write = row_write(id, android_id, Some(group), body);
    write.summary = Some(SummaryWrite {
        group_id: group.to_string(),
        android_id: TEST_SUMMARY_ANDROID_ID,
        text: None,
        created_at: 100,
        expire_at: 100_000,
    });
    ctx.store.persist_job(&write).unwrap();
    ctx.store.get_live_summary(group).unwrap().unwrap()
}

fn row_write(id: &str, android_id: i32, group: Option<&str>, body: &str) -> JobWrite {
    let custom = format!(r#"{{"i":"{}"}}"#, id);
    let mut entries = vec![("alert", body), ("custom", custom.as_str())];
    if let Some(group) = group {
        entries.push(("grp", group));
    }
    let payload = bundle_payload(&entries);

    JobWrite {
        record: NewNotification {
            notification_id: id.to_string(),
            android_id,
            group_id: group.map(str::to_string),
            collapse_id: None,
            title: None,
            body: Some(body.to_string()),
            full_payload: payload.to_json_string(),
            created_at: 100,
            expire_at: 100_000,
            dismissed: false,
        },
        supersede_android_id: None,
        summary: None,
    }
}
