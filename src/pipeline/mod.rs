//! Notification admission, deduplication, grouping and restoration.
//!
//! [`NotificationPipeline`] is the entry point for every caller: transport
//! receivers, background workers, the restore trigger and developer API
//! calls. It can be shared across threads.

mod admission;
mod context;
mod dedup;
mod hooks;
mod interaction;
mod job;
mod overrides;
mod restore;
mod shade_limit;
mod summary;

#[cfg(test)]
pub(crate) mod test_support;

pub use admission::{decide, DisplayDecision, JobOutcome};
pub use context::{Clock, PipelineContext, PipelineContextBuilder, RestoreState};
pub use dedup::{check_and_register, resolve_collapse, DedupVerdict, InFlightGuard, InFlightSet};
pub use hooks::{
    DisplayCompletion, ExtenderDecision, ForegroundHandler, HostEnvironment, InAppPreviewHandler,
    NotificationExtender, NotificationHandlers, NotificationRenderer, OpenedResult, ScheduledWork,
    WorkScheduler,
};
pub use job::{NotificationGenerationJob, NotificationSnapshot};
pub use overrides::DisplayOverride;
pub use restore::RestoreReport;
pub use summary::GroupSummary;

use crate::error::PipelineError;
use crate::payload::{Bundle, NotificationPayload};
use crate::store::{NotificationRecord, RecordFilter};
use hooks::{guarded, guarded_result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a received bundle was handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedBundleResult {
    pub is_onesignal_payload: bool,
    pub is_dup: bool,
    pub in_app_preview_shown: bool,
    pub is_async_work_scheduled: bool,
    /// Set when the job ran inline.
    pub outcome: Option<JobOutcome>,
}

impl ProcessedBundleResult {
    /// True when nothing else should handle the bundle. A foreign payload
    /// counts as processed too.
    pub fn processed(&self) -> bool {
        !self.is_onesignal_payload
            || self.is_dup
            || self.in_app_preview_shown
            || self.is_async_work_scheduled
    }
}

/// Values supplied by the caller instead of derived by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub android_id: Option<i32>,
    /// Epoch seconds; defaults to now.
    pub timestamp: Option<i64>,
    pub restoring: bool,
}

#[derive(Clone)]
pub struct NotificationPipeline {
    ctx: Arc<PipelineContext>,
}

impl NotificationPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Entry point for a bundle arriving from a push transport.
    pub fn process_bundle(&self, bundle: Bundle) -> ProcessedBundleResult {
        let ctx = self.ctx.as_ref();
        let payload = NotificationPayload::from_bundle(bundle);
        let mut result = ProcessedBundleResult::default();

        let Some(notification_id) = payload.notification_id() else {
            debug!("Ignoring payload without a notification id");
            return result;
        };
        result.is_onesignal_payload = true;

        if let (Some(preview_id), Some(handler)) = (payload.in_app_preview_id(), &ctx.in_app_preview) {
            match guarded("in_app_preview", || handler.show_preview(&preview_id, &payload)) {
                Ok(true) => {
                    debug!("Showed in-app preview {} instead of a notification", preview_id);
                    result.in_app_preview_shown = true;
                    return result;
                }
                Ok(false) => {}
                Err(e) => warn!("{}", e),
            }
        }

        let guard = match check_and_register(ctx, &payload, false) {
            DedupVerdict::Accept(guard) => guard,
            DedupVerdict::Duplicate => {
                result.is_dup = true;
                return result;
            }
            DedupVerdict::MissingId => {
                result.is_onesignal_payload = false;
                return result;
            }
        };

        let timestamp = ctx.now();
        if let Some(scheduler) = &ctx.work_scheduler {
            let work = ScheduledWork {
                notification_id: notification_id.clone(),
                payload_json: payload.to_json_string(),
                timestamp,
                is_high_priority: payload.is_high_priority(),
            };
            match guarded_result("work_scheduler", || scheduler.schedule(work)) {
                Ok(()) => {
                    debug!("Scheduled generation of {}", notification_id);
                    // The worker adopts the in-flight id
                    if let Some(guard) = guard {
                        guard.keep();
                    }
                    result.is_async_work_scheduled = true;
                    return result;
                }
                Err(e) => warn!("{}, processing inline", e),
            }
        }

        let job = NotificationGenerationJob::new(payload, notification_id, timestamp);
        result.outcome = Some(admission::process_job(ctx, job, guard));
        result
    }

    /// Process a bundle with caller-supplied android id, timestamp or restore
    /// flag. Skips in-app previews and work scheduling.
    pub fn process_payload(&self, bundle: Bundle, options: ProcessOptions) -> ProcessedBundleResult {
        let ctx = self.ctx.as_ref();
        let payload = NotificationPayload::from_bundle(bundle);
        let mut result = ProcessedBundleResult::default();

        let guard = match check_and_register(ctx, &payload, options.restoring) {
            DedupVerdict::Accept(guard) => guard,
            DedupVerdict::Duplicate => {
                result.is_onesignal_payload = true;
                result.is_dup = true;
                return result;
            }
            DedupVerdict::MissingId => return result,
        };
        result.is_onesignal_payload = true;

        let Some(notification_id) = payload.notification_id() else {
            return result;
        };
        let job = NotificationGenerationJob::new(
            payload,
            notification_id,
            options.timestamp.unwrap_or_else(|| ctx.now()),
        )
        .with_restoring(options.restoring);
        if let Some(android_id) = options.android_id {
            job.preset_android_id(android_id);
        }
        result.outcome = Some(admission::process_job(ctx, job, guard));
        result
    }

    /// Run work handed off by [`WorkScheduler`]. Releases the in-flight id
    /// even if the work cannot be decoded.
    pub fn process_scheduled(&self, work: ScheduledWork) -> Option<JobOutcome> {
        let ctx = self.ctx.as_ref();
        let guard = ctx.in_flight.adopt(&work.notification_id);
        let payload = match NotificationPayload::from_json_str(&work.payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Dropping scheduled work {}: {}", work.notification_id, e);
                return None;
            }
        };
        let job = NotificationGenerationJob::new(payload, work.notification_id, work.timestamp);
        Some(admission::process_job(ctx, job, Some(guard)))
    }

    /// Give up on work handed to the [`WorkScheduler`] that will never run, so
    /// a redelivery of the id is processed. Returns false if the id was not
    /// waiting on a worker.
    pub fn release_scheduled(&self, notification_id: &str) -> bool {
        let released = self.ctx.in_flight.release_handed_off(notification_id);
        if released {
            debug!("Released scheduled work for {}", notification_id);
        }
        released
    }

    /// Re-display stored notifications, at most once per pipeline. `None` if
    /// a pass already ran.
    pub fn restore(&self, likely_boot: bool) -> Option<RestoreReport> {
        restore::run(&self.ctx, likely_boot)
    }

    pub fn notification_opened(&self, android_id: i32, action_id: Option<&str>) -> Option<OpenedResult> {
        interaction::opened(&self.ctx, android_id, action_id)
    }

    pub fn notification_dismissed(&self, android_id: i32) -> bool {
        interaction::dismissed(&self.ctx, android_id)
    }

    pub fn remove_notification(&self, android_id: i32) -> bool {
        interaction::remove(&self.ctx, android_id)
    }

    pub fn clear_group(&self, group_id: &str) -> usize {
        interaction::clear_group(&self.ctx, group_id)
    }

    pub fn clear_all(&self) -> usize {
        interaction::clear_all(&self.ctx)
    }

    pub fn badge_count(&self) -> usize {
        self.ctx.store.badge_count().unwrap_or_else(|e| {
            error!("{}", PipelineError::store(e));
            0
        })
    }

    /// Hard-delete rows older than the restore window, whatever their state.
    pub fn cleanup_stale_records(&self) -> usize {
        let cutoff = self
            .ctx
            .now()
            .saturating_sub(self.ctx.settings.restore_window_secs);
        match self.ctx.store.delete_created_before(cutoff) {
            Ok(deleted) => {
                if deleted > 0 {
                    info!("Deleted {} stale notification record(s)", deleted);
                }
                deleted
            }
            Err(e) => {
                error!("{}", PipelineError::store(e));
                0
            }
        }
    }

    pub fn list(&self, filter: &RecordFilter) -> Vec<NotificationRecord> {
        self.ctx.store.list(filter).unwrap_or_else(|e| {
            error!("{}", PipelineError::store(e));
            Vec::new()
        })
    }
}
