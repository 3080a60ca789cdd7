//! Display-or-suppress decision and the processing of one generation job.
//!
//! Order for a job: collapse resolution, extender, decision, foreground
//! handshake, render, group summary, one store transaction, shade limit,
//! in-flight release, received callback, badge. Group summary and the store
//! transaction run under the group lock.

use super::context::PipelineContext;
use super::dedup::{resolve_collapse, InFlightGuard};
use super::hooks::{guarded, guarded_result, DisplayCompletion, ExtenderDecision, ForegroundHandler};
use super::job::{NotificationGenerationJob, NotificationSnapshot};
use super::overrides::DisplayOverride;
use super::summary::{self, GroupSummary};
use super::shade_limit;
use crate::error::PipelineError;
use crate::store::{JobWrite, NewNotification, NO_ANDROID_ID};
use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayDecision {
    Suppress,
    Display,
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub notification_id: String,
    pub decision: DisplayDecision,
    /// The renderer reported something was shown.
    pub shown: bool,
    /// Android id stored for the row; [`NO_ANDROID_ID`] if nothing was shown.
    pub android_id: i32,
    /// Android id of the entry this one replaced in the shade.
    pub replaced_android_id: Option<i32>,
    pub summary: Option<GroupSummary>,
    /// The store write committed.
    pub persisted: bool,
    pub badge_count: Option<usize>,
}

/// Display iff there is alert text, or a hook took over the notification.
pub fn decide(job: &NotificationGenerationJob, hook_wants_display: bool) -> DisplayDecision {
    if hook_wants_display || job.has_body() {
        DisplayDecision::Display
    } else {
        DisplayDecision::Suppress
    }
}

/// Run the extender, if any. Returns whether it asked for display, or `None`
/// if it suppressed the notification.
fn run_extender(ctx: &PipelineContext, job: &mut NotificationGenerationJob) -> Option<bool> {
    let Some(extender) = &ctx.extender else {
        return Some(false);
    };
    let snapshot = job.snapshot();
    match guarded_result("extender", || extender.extend(&snapshot)) {
        Ok(ExtenderDecision::Default) => Some(false),
        Ok(ExtenderDecision::Display(display_override)) => {
            job.apply_override(&display_override);
            Some(true)
        }
        Ok(ExtenderDecision::Suppress) => {
            debug!("Extender suppressed notification {}", job.notification_id());
            None
        }
        Err(e) => {
            warn!("{}, using default display decision", e);
            Some(false)
        }
    }
}

enum ForegroundVerdict {
    Display(Option<DisplayOverride>),
    Suppress,
}

/// Ask the foreground handler and wait, bounded, for its completion. A
/// timeout, a dropped completion or a failing handler all display as-is.
fn foreground_handshake(
    ctx: &PipelineContext,
    handler: &dyn ForegroundHandler,
    snapshot: &NotificationSnapshot,
) -> ForegroundVerdict {
    let (tx, rx) = mpsc::sync_channel(1);
    let completion = DisplayCompletion::new(tx);
    if let Err(e) = guarded("foreground_handler", || {
        handler.will_show_in_foreground(snapshot, completion)
    }) {
        warn!("{}, displaying with defaults", e);
        return ForegroundVerdict::Display(None);
    }

    match rx.recv_timeout(ctx.settings.foreground_timeout()) {
        Ok(Some(display_override)) => ForegroundVerdict::Display(Some(display_override)),
        Ok(None) => ForegroundVerdict::Suppress,
        Err(RecvTimeoutError::Timeout) => {
            info!(
                "Foreground handler did not complete {} within {:?}, displaying",
                snapshot.notification_id,
                ctx.settings.foreground_timeout()
            );
            ForegroundVerdict::Display(None)
        }
        Err(RecvTimeoutError::Disconnected) => {
            debug!(
                "Foreground handler dropped completion for {}, displaying",
                snapshot.notification_id
            );
            ForegroundVerdict::Display(None)
        }
    }
}

/// Process one job end to end. Never fails; failures are logged and
/// reflected in the outcome.
pub fn process_job(
    ctx: &PipelineContext,
    mut job: NotificationGenerationJob,
    in_flight: Option<InFlightGuard<'_>>,
) -> JobOutcome {
    let restoring = job.is_restoring();

    // An id reused from a live entry replaces that entry
    let reused_android_id = if restoring {
        None
    } else if let Some(preset) = job.assigned_android_id() {
        Some(preset)
    } else {
        resolve_collapse(ctx, job.payload(), restoring).filter(|id| job.preset_android_id(*id))
    };

    let mut decision = match run_extender(ctx, &mut job) {
        Some(wants_display) => decide(&job, wants_display),
        None => DisplayDecision::Suppress,
    };

    if decision == DisplayDecision::Display && !restoring {
        if let Some(handler) = &ctx.foreground_handler {
            if ctx.is_app_in_focus() {
                match foreground_handshake(ctx, handler.as_ref(), &job.snapshot()) {
                    ForegroundVerdict::Display(Some(display_override)) => {
                        job.apply_override(&display_override)
                    }
                    ForegroundVerdict::Display(None) => {}
                    ForegroundVerdict::Suppress => {
                        debug!(
                            "Foreground handler suppressed notification {}",
                            job.notification_id()
                        );
                        decision = DisplayDecision::Suppress;
                    }
                }
            }
        }
    }

    let shown = decision == DisplayDecision::Display
        && match guarded("renderer", || ctx.renderer.display(&job)) {
            Ok(shown) => shown,
            Err(e) => {
                warn!("{}", e);
                false
            }
        };
    let android_id = if shown { job.android_id() } else { NO_ANDROID_ID };
    let replaced_android_id = if shown {
        reused_android_id.filter(|id| *id == android_id)
    } else {
        None
    };

    let group_lock = if shown {
        job.group_id().map(|group_id| ctx.group_lock(&group_id))
    } else {
        None
    };
    let group_guard = group_lock
        .as_ref()
        .map(|lock| lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));

    let summary_update = if shown {
        summary::on_notification_shown(ctx, &job, replaced_android_id)
    } else {
        None
    };
    let (summary, summary_write) = match summary_update {
        Some(update) => (update.rendered, Some(update.write)),
        None => (None, None),
    };

    let payload = job.payload();
    let write = JobWrite {
        record: NewNotification {
            notification_id: job.notification_id().to_string(),
            android_id,
            group_id: payload.group_id(),
            collapse_id: payload.collapse_id(),
            title: job.title(),
            body: job.body(),
            full_payload: payload.to_json_string(),
            created_at: job.shown_timestamp(),
            expire_at: payload.expire_at(job.shown_timestamp(), ctx.settings.default_ttl_secs),
            // A restore that is not shown again must not be restored again
            dismissed: restoring && !shown,
        },
        supersede_android_id: replaced_android_id,
        summary: summary_write,
    };
    let persisted = match ctx.store.persist_job(&write) {
        Ok(_) => true,
        Err(e) => {
            error!(
                "Notification {} was not saved: {}",
                job.notification_id(),
                PipelineError::store(e)
            );
            false
        }
    };
    drop(group_guard);

    if shown && !restoring {
        shade_limit::enforce(ctx);
    }
    drop(in_flight);

    if persisted && !restoring {
        if let Some(handlers) = &ctx.handlers {
            let snapshot = job.snapshot();
            if let Err(e) = guarded("on_received", || handlers.on_received(&snapshot)) {
                warn!("{}", e);
            }
        }
    }

    let badge_count = if persisted && !restoring {
        ctx.report_badge()
    } else {
        None
    };

    debug!(
        "Notification {} processed: {:?}, shown={}, android_id={}",
        job.notification_id(),
        decision,
        shown,
        android_id
    );
    JobOutcome {
        notification_id: job.notification_id().to_string(),
        decision,
        shown,
        android_id,
        replaced_android_id,
        summary,
        persisted,
        badge_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{bundle_payload, test_context_with_renderer};

    fn job(entries: &[(&str, &str)]) -> NotificationGenerationJob {
        let payload = bundle_payload(entries);
        let id = payload.notification_id().unwrap();
        NotificationGenerationJob::new(payload, id, 500)
    }

    #[test]
    fn test_decide() {
        let with_body = job(&[("custom", r#"{"i":"a"}"#), ("alert", "hi")]);
        let without_body = job(&[("custom", r#"{"i":"b"}"#), ("alert", "")]);

        assert_eq!(decide(&with_body, false), DisplayDecision::Display);
        assert_eq!(decide(&without_body, false), DisplayDecision::Suppress);
        assert_eq!(decide(&without_body, true), DisplayDecision::Display);
    }

    #[test]
    fn test_displayed_job_is_stored_with_its_android_id() {
        let (ctx, renderer) = test_context_with_renderer();
        let outcome = process_job(
            &ctx,
            job(&[("custom", r#"{"i":"a"}"#), ("alert", "hi"), ("title", "T")]),
            None,
        );

        assert!(outcome.shown);
        assert!(outcome.persisted);
        assert_eq!(outcome.badge_count, Some(1));
        assert_eq!(renderer.displayed().len(), 1);

        let row = ctx.store.get_by_notification_id("a").unwrap().unwrap();
        assert_eq!(row.android_id, outcome.android_id);
        assert_eq!(row.title.as_deref(), Some("T"));
        assert_eq!(row.created_at, 500);
        assert_eq!(row.expire_at, 500 + ctx.settings.default_ttl_secs);
    }

    #[test]
    fn test_suppressed_job_is_stored_without_android_id() {
        let (ctx, renderer) = test_context_with_renderer();
        let outcome = process_job(&ctx, job(&[("custom", r#"{"i":"a"}"#)]), None);

        assert_eq!(outcome.decision, DisplayDecision::Suppress);
        assert!(!outcome.shown);
        assert!(renderer.displayed().is_empty());

        let row = ctx.store.get_by_notification_id("a").unwrap().unwrap();
        assert_eq!(row.android_id, NO_ANDROID_ID);
        assert!(!row.dismissed);
    }

    #[test]
    fn test_renderer_refusal_is_recorded() {
        let (ctx, renderer) = test_context_with_renderer();
        renderer.refuse_display();
        let outcome = process_job(&ctx, job(&[("custom", r#"{"i":"a"}"#), ("alert", "x")]), None);

        assert_eq!(outcome.decision, DisplayDecision::Display);
        assert!(!outcome.shown);
        let row = ctx.store.get_by_notification_id("a").unwrap().unwrap();
        assert_eq!(row.android_id, NO_ANDROID_ID);
    }

    #[test]
    fn test_in_flight_id_is_released() {
        let (ctx, _renderer) = test_context_with_renderer();
        let guard = ctx.in_flight.try_register("a").unwrap();
        process_job(&ctx, job(&[("custom", r#"{"i":"a"}"#), ("alert", "x")]), Some(guard));
        assert!(!ctx.in_flight.contains("a"));
    }

    #[test]
    fn test_collapse_reuses_android_id_and_dismisses_old_row() {
        let (ctx, _renderer) = test_context_with_renderer();
        let first = process_job(
            &ctx,
            job(&[("custom", r#"{"i":"a"}"#), ("alert", "1-0"), ("collapse_key", "score")]),
            None,
        );
        let second = process_job(
            &ctx,
            job(&[("custom", r#"{"i":"b"}"#), ("alert", "2-0"), ("collapse_key", "score")]),
            None,
        );

        assert_eq!(second.android_id, first.android_id);
        assert_eq!(second.replaced_android_id, Some(first.android_id));
        assert!(ctx.store.get_by_notification_id("a").unwrap().unwrap().dismissed);
        assert!(!ctx.store.get_by_notification_id("b").unwrap().unwrap().dismissed);
        assert_eq!(second.badge_count, Some(1));
    }

    #[test]
    fn test_group_summary_is_written_with_the_job() {
        let (ctx, renderer) = test_context_with_renderer();
        let grouped = |id: &str| {
            let custom = format!(r#"{{"i":"{}"}}"#, id);
            job(&[("custom", custom.as_str()), ("alert", id), ("grp", "g")])
        };

        let first = process_job(&ctx, grouped("a"), None);
        assert!(first.summary.is_none());
        let summary_row = ctx.store.get_live_summary("g").unwrap().unwrap();
        assert!(summary_row.body.is_none());
        assert!(renderer.summaries().is_empty());

        let second = process_job(&ctx, grouped("b"), None);
        let summary = second.summary.unwrap();
        assert_eq!(summary.android_id, summary_row.android_id);
        let stored = ctx.store.get_live_summary("g").unwrap().unwrap();
        assert_eq!(stored.id, summary_row.id);
        assert_eq!(stored.body.as_deref(), Some("2 new messages"));
    }

    #[test]
    fn test_suppressed_grouped_job_creates_no_summary() {
        let (ctx, _renderer) = test_context_with_renderer();
        process_job(
            &ctx,
            job(&[("custom", r#"{"i":"a"}"#), ("grp", "g")]),
            None,
        );
        assert!(ctx.store.get_live_summary("g").unwrap().is_none());
    }
}
