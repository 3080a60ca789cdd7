//! Interfaces the host application implements, and the guard every call to
//! them goes through.

use super::job::{NotificationGenerationJob, NotificationSnapshot};
use super::overrides::DisplayOverride;
use super::summary::GroupSummary;
use crate::error::PipelineError;
use crate::payload::NotificationPayload;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::SyncSender;

/// Builds and posts platform notifications. Must not touch the store.
pub trait NotificationRenderer: Send + Sync {
    /// Post the notification; returns whether something was actually shown.
    fn display(&self, job: &NotificationGenerationJob) -> bool;

    /// Post or update a group summary entry.
    fn display_summary(&self, summary: &GroupSummary) -> bool;

    /// Remove an entry from the shade.
    fn cancel(&self, android_id: i32);

    /// Android ids currently visible in the shade.
    fn visible_notification_ids(&self) -> anyhow::Result<Vec<i32>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtenderDecision {
    /// Use the default decision (display iff there is alert text).
    Default,
    /// Display, with the given changes.
    Display(DisplayOverride),
    /// Process silently.
    Suppress,
}

/// Background hook that can rewrite or silence a notification before display.
pub trait NotificationExtender: Send + Sync {
    fn extend(&self, notification: &NotificationSnapshot) -> anyhow::Result<ExtenderDecision>;
}

/// Completion handed to [`ForegroundHandler`]. Can be moved to another thread
/// and completed later; the pipeline waits a bounded time for it.
#[derive(Debug)]
pub struct DisplayCompletion {
    tx: SyncSender<Option<DisplayOverride>>,
}

impl DisplayCompletion {
    pub(crate) fn new(tx: SyncSender<Option<DisplayOverride>>) -> Self {
        Self { tx }
    }

    /// `Some` displays with the given override, `None` suppresses.
    pub fn complete(self, display: Option<DisplayOverride>) {
        // The pipeline may have stopped waiting
        let _ = self.tx.try_send(display);
    }

    pub fn display(self) {
        self.complete(Some(DisplayOverride::default()))
    }

    pub fn suppress(self) {
        self.complete(None)
    }
}

/// Asked whether a notification arriving while the app is in focus should be
/// shown.
pub trait ForegroundHandler: Send + Sync {
    fn will_show_in_foreground(&self, notification: &NotificationSnapshot, completion: DisplayCompletion);
}

/// What the user opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedResult {
    pub notification_ids: Vec<String>,
    pub action_id: String,
    pub group_id: Option<String>,
}

/// Fire-and-forget callbacks to the host app.
pub trait NotificationHandlers: Send + Sync {
    /// After the notification is durably stored. Not called for restores.
    fn on_received(&self, _notification: &NotificationSnapshot) {}

    fn on_opened(&self, _result: &OpenedResult) {}

    fn on_badge_count_changed(&self, _count: usize) {}
}

pub trait HostEnvironment: Send + Sync {
    fn is_app_in_focus(&self) -> bool;
}

/// A notification handed off to a background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledWork {
    pub notification_id: String,
    pub payload_json: String,
    pub timestamp: i64,
    pub is_high_priority: bool,
}

/// Runs generation on a background worker instead of the receiver thread.
///
/// The worker must call back `NotificationPipeline::process_scheduled`. Until
/// it does, redeliveries of the same id are reported as duplicates. Work that
/// will never run should be given up with
/// `NotificationPipeline::release_scheduled`; otherwise the id is freed once
/// `scheduled_work_timeout_secs` passes.
pub trait WorkScheduler: Send + Sync {
    fn schedule(&self, work: ScheduledWork) -> anyhow::Result<()>;
}

pub trait InAppPreviewHandler: Send + Sync {
    /// Show an in-app message preview; returns whether it was shown.
    fn show_preview(&self, preview_id: &str, payload: &NotificationPayload) -> bool;
}

/// Call a host hook, turning a panic into [`PipelineError::DeveloperHook`].
pub(crate) fn guarded<T>(hook: &'static str, f: impl FnOnce() -> T) -> Result<T, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PipelineError::DeveloperHook {
        hook,
        reason: panic_message(payload.as_ref()),
    })
}

/// Like [`guarded`], for hooks that report errors themselves.
pub(crate) fn guarded_result<T>(
    hook: &'static str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, PipelineError> {
    guarded(hook, f)?.map_err(|e| PipelineError::DeveloperHook {
        hook,
        reason: format!("{:#}", e),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_guarded_passes_value_through() {
        assert_eq!(guarded("renderer", || 5).unwrap(), 5);
    }

    #[test]
    fn test_guarded_catches_panic() {
        let err = guarded("renderer", || -> bool { panic!("kaboom") }).unwrap_err();
        match err {
            PipelineError::DeveloperHook { hook, reason } => {
                assert_eq!(hook, "renderer");
                assert_eq!(reason, "panicked: kaboom");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_guarded_result_maps_error() {
        let err = guarded_result("extender", || -> anyhow::Result<()> {
            Err(anyhow::anyhow!("bad input"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Hook 'extender' failed: bad input");
    }

    #[test]
    fn test_completion_after_receiver_dropped_is_harmless() {
        let (tx, rx) = mpsc::sync_channel(1);
        drop(rx);
        DisplayCompletion::new(tx).display();
    }

    #[test]
    fn test_completion_sends_choice() {
        let (tx, rx) = mpsc::sync_channel(1);
        DisplayCompletion::new(tx).suppress();
        assert_eq!(rx.recv().unwrap(), None);
    }
}
