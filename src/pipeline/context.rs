use super::dedup::InFlightSet;
use super::hooks::{
    guarded, ForegroundHandler, HostEnvironment, InAppPreviewHandler, NotificationExtender,
    NotificationHandlers, NotificationRenderer, WorkScheduler,
};
use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::store::NotificationStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Source of "now" in epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    NotStarted,
    Running,
    Done,
}

/// Everything the pipeline needs, created once by the host integration layer
/// and shared by every entry point for the life of the process.
pub struct PipelineContext {
    pub(crate) store: Arc<dyn NotificationStore>,
    pub(crate) renderer: Arc<dyn NotificationRenderer>,
    pub(crate) extender: Option<Arc<dyn NotificationExtender>>,
    pub(crate) foreground_handler: Option<Arc<dyn ForegroundHandler>>,
    pub(crate) handlers: Option<Arc<dyn NotificationHandlers>>,
    pub(crate) host: Option<Arc<dyn HostEnvironment>>,
    pub(crate) work_scheduler: Option<Arc<dyn WorkScheduler>>,
    pub(crate) in_app_preview: Option<Arc<dyn InAppPreviewHandler>>,
    pub(crate) settings: PipelineSettings,
    pub(crate) in_flight: InFlightSet,
    group_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    restore_state: Mutex<RestoreState>,
    clock: Clock,
}

impl PipelineContext {
    pub fn builder(
        store: Arc<dyn NotificationStore>,
        renderer: Arc<dyn NotificationRenderer>,
    ) -> PipelineContextBuilder {
        PipelineContextBuilder {
            store,
            renderer,
            extender: None,
            foreground_handler: None,
            handlers: None,
            host: None,
            work_scheduler: None,
            in_app_preview: None,
            settings: PipelineSettings::default(),
            clock: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Whether the host says the app is in focus. Without a host environment
    /// the app is assumed to be in the background.
    pub(crate) fn is_app_in_focus(&self) -> bool {
        let Some(host) = &self.host else {
            return false;
        };
        guarded("host_environment", || host.is_app_in_focus()).unwrap_or_else(|e| {
            warn!("{}", e);
            false
        })
    }

    /// Lock held while a group's children are read, its summary aggregated
    /// and the result written, so concurrent members see each other.
    pub(crate) fn group_lock(&self, group_id: &str) -> Arc<Mutex<()>> {
        self.group_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(group_id.to_string())
            .or_default()
            .clone()
    }

    pub fn restore_state(&self) -> RestoreState {
        *self
            .restore_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move NotStarted -> Running. False if a pass already started.
    pub(crate) fn begin_restore(&self) -> bool {
        let mut state = self
            .restore_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != RestoreState::NotStarted {
            return false;
        }
        *state = RestoreState::Running;
        true
    }

    pub(crate) fn finish_restore(&self) {
        *self
            .restore_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = RestoreState::Done;
    }

    /// Report the current badge count to the host.
    pub(crate) fn report_badge(&self) -> Option<usize> {
        let count = match self.store.badge_count() {
            Ok(count) => count,
            Err(e) => {
                error!("{}", PipelineError::store(e));
                return None;
            }
        };
        debug!("Badge count is now {}", count);
        if let Some(handlers) = &self.handlers {
            if let Err(e) = guarded("on_badge_count_changed", || {
                handlers.on_badge_count_changed(count)
            }) {
                warn!("{}", e);
            }
        }
        Some(count)
    }
}

pub struct PipelineContextBuilder {
    store: Arc<dyn NotificationStore>,
    renderer: Arc<dyn NotificationRenderer>,
    extender: Option<Arc<dyn NotificationExtender>>,
    foreground_handler: Option<Arc<dyn ForegroundHandler>>,
    handlers: Option<Arc<dyn NotificationHandlers>>,
    host: Option<Arc<dyn HostEnvironment>>,
    work_scheduler: Option<Arc<dyn WorkScheduler>>,
    in_app_preview: Option<Arc<dyn InAppPreviewHandler>>,
    settings: PipelineSettings,
    clock: Option<Clock>,
}

impl PipelineContextBuilder {
    pub fn extender(mut self, extender: Arc<dyn NotificationExtender>) -> Self {
        self.extender = Some(extender);
        self
    }

    pub fn foreground_handler(mut self, handler: Arc<dyn ForegroundHandler>) -> Self {
        self.foreground_handler = Some(handler);
        self
    }

    pub fn handlers(mut self, handlers: Arc<dyn NotificationHandlers>) -> Self {
        self.handlers = Some(handlers);
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

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> PipelineContext {
        let in_flight = InFlightSet::new(self.settings.scheduled_work_timeout());
        PipelineContext {
            store: self.store,
            renderer: self.renderer,
            extender: self.extender,
            foreground_handler: self.foreground_handler,
            handlers: self.handlers,
            host: self.host,
            work_scheduler: self.work_scheduler,
            in_app_preview: self.in_app_preview,
            settings: self.settings,
            in_flight,
            group_locks: Mutex::new(HashMap::new()),
            restore_state: Mutex::new(RestoreState::NotStarted),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(|| chrono::Utc::now().timestamp())),
        }
    }
}
