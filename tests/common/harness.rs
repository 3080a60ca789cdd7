//! Test pipeline lifecycle
//!
//! Each test gets its own pipeline over a file-backed store in a temporary
//! directory, a controllable clock and recording fakes.

use super::constants::START_TIME;
use super::fakes::{FakeRenderer, RecordingHandlers};
use pushcore::config::PipelineSettings;
use pushcore::payload::Bundle;
use pushcore::pipeline::{
    ForegroundHandler, HostEnvironment, InAppPreviewHandler, NotificationExtender,
    NotificationPipeline, PipelineContext, WorkScheduler,
};
use pushcore::store::{NotificationRecord, NotificationStore, RecordFilter, SqliteNotificationStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Settings with the restore throttles zeroed and a short foreground wait.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        restore_delay_ms: 0,
        boot_restore_delay_secs: 0,
        foreground_timeout_ms: 300,
        ..Default::default()
    }
}

#[derive(Default)]
pub struct TestPipelineBuilder {
    settings: Option<PipelineSettings>,
    extender: Option<Arc<dyn NotificationExtender>>,
    foreground_handler: Option<Arc<dyn ForegroundHandler>>,
    host: Option<Arc<dyn HostEnvironment>>,
    work_scheduler: Option<Arc<dyn WorkScheduler>>,
    in_app_preview: Option<Arc<dyn InAppPreviewHandler>>,
}

impl TestPipelineBuilder {
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn extender(mut self, extender: Arc<dyn NotificationExtender>) -> Self {
        self.extender = Some(extender);
        self
    }

    pub fn foreground_handler(mut self, handler: Arc<dyn ForegroundHandler>) -> Self {
        self.foreground_handler = Some(handler);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn work_scheduler(mut self, scheduler: Arc<dyn WorkScheduler>) -> Self {
        self.work_scheduler = Some(scheduler);
        self
    }

    pub fn in_app_preview(mut self, handler: Arc<dyn InAppPreviewHandler>) -> Self {
        self.in_app_preview = Some(handler);
        self
    }

    pub fn build(self) -> TestPipeline {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("notifications.db");
        let clock = Arc::new(AtomicI64::new(START_TIME));
        let settings = self.settings.unwrap_or_else(fast_settings);
        let renderer = Arc::new(FakeRenderer::default());
        let handlers = Arc::new(RecordingHandlers::default());

        let store = Arc::new(SqliteNotificationStore::new(&db_path).expect("Failed to open store"));
        let mut builder = PipelineContext::builder(store, renderer.clone())
            .handlers(handlers.clone())
            .settings(settings.clone())
            .clock(clock_fn(&clock));
        if let Some(extender) = self.extender {
            builder = builder.extender(extender);
        }
        if let Some(handler) = self.foreground_handler {
            builder = builder.foreground_handler(handler);
        }
        if let Some(host) = self.host {
            builder = builder.host(host);
        }
        if let Some(scheduler) = self.work_scheduler {
            builder = builder.work_scheduler(scheduler);
        }
        if let Some(handler) = self.in_app_preview {
            builder = builder.in_app_preview(handler);
        }

        TestPipeline {
            pipeline: NotificationPipeline::new(builder.build()),
            renderer,
            handlers,
            clock,
            settings,
            db_path,
            _temp_dir: temp_dir,
        }
    }
}

fn clock_fn(clock: &Arc<AtomicI64>) -> pushcore::pipeline::Clock {
    let clock = clock.clone();
    Arc::new(move || clock.load(Ordering::SeqCst))
}

/// Pipeline under test. The temporary store is removed on drop.
pub struct TestPipeline {
    pub pipeline: NotificationPipeline,
    pub renderer: Arc<FakeRenderer>,
    pub handlers: Arc<RecordingHandlers>,
    pub clock: Arc<AtomicI64>,
    pub settings: PipelineSettings,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestPipeline {
    pub fn builder() -> TestPipelineBuilder {
        TestPipelineBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Simulate the process being killed and started again: same store file,
    /// fresh context, renderer and handlers.
    pub fn restart(self) -> Self {
        let store =
            Arc::new(SqliteNotificationStore::new(&self.db_path).expect("Failed to reopen store"));
        let renderer = Arc::new(FakeRenderer::default());
        let handlers = Arc::new(RecordingHandlers::default());
        let ctx = PipelineContext::builder(store, renderer.clone())
            .handlers(handlers.clone())
            .settings(self.settings.clone())
            .clock(clock_fn(&self.clock))
            .build();
        Self {
            pipeline: NotificationPipeline::new(ctx),
            renderer,
            handlers,
            ..self
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        self.pipeline.context().store()
    }

    pub fn now(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub fn advance(&self, secs: i64) {
        self.clock.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn record(&self, notification_id: &str) -> NotificationRecord {
        self.store()
            .get_by_notification_id(notification_id)
            .unwrap()
            .unwrap_or_else(|| panic!("no row for {}", notification_id))
    }

    /// Every row, summaries and inactive rows included.
    pub fn all_rows(&self) -> Vec<NotificationRecord> {
        self.store()
            .list(&RecordFilter {
                group_id: None,
                include_inactive: true,
            })
            .unwrap()
    }

    pub fn rows_for(&self, notification_id: &str) -> usize {
        self.all_rows()
            .iter()
            .filter(|r| r.notification_id.as_deref() == Some(notification_id))
            .count()
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// Bundle as delivered by the transport: `custom` carries the id.
pub fn bundle(notification_id: &str, alert: &str) -> Bundle {
    bundle_with(notification_id, alert, &[])
}

pub fn bundle_with(notification_id: &str, alert: &str, extra: &[(&str, &str)]) -> Bundle {
    let mut bundle = Bundle::new();
    bundle.insert(
        "custom".to_string(),
        serde_json::json!({ "i": notification_id }).to_string(),
    );
    bundle.insert("alert".to_string(), alert.to_string());
    for (key, value) in extra {
        bundle.insert(key.to_string(), value.to_string());
    }
    bundle
}

pub fn grouped(notification_id: &str, alert: &str, group_id: &str) -> Bundle {
    bundle_with(notification_id, alert, &[("grp", group_id)])
}

pub fn collapsing(notification_id: &str, alert: &str, collapse_id: &str) -> Bundle {
    bundle_with(notification_id, alert, &[("collapse_key", collapse_id)])
}
