//! Re-display of stored notifications after the process was killed, the
//! device rebooted or the app was upgraded.

use super::admission::process_job;
use super::context::PipelineContext;
use super::hooks::guarded;
use super::job::NotificationGenerationJob;
use crate::error::PipelineError;
use crate::payload::NotificationPayload;
use crate::store::NotificationRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::thread;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Expired rows hard-deleted before selection.
    pub purged_expired: usize,
    /// Rows eligible before the visibility check.
    pub candidates: usize,
    /// Candidates already visible in the shade.
    pub skipped_visible: usize,
    /// Rows shown again.
    pub restored: usize,
    /// Rows that could not be re-driven.
    pub failed: usize,
}

/// Run the restore pass unless one already ran in this process.
pub fn run(ctx: &PipelineContext, likely_boot: bool) -> Option<RestoreReport> {
    if !ctx.begin_restore() {
        debug!("Restore already ran in this process, skipping");
        return None;
    }

    if likely_boot {
        let delay = ctx.settings.boot_restore_delay();
        debug!("Waiting {:?} before restoring after boot", delay);
        thread::sleep(delay);
    }

    let report = restore_all(ctx);
    ctx.finish_restore();
    ctx.report_badge();

    info!(
        "Restore finished: {} restored, {} failed, {} already visible, {} expired purged",
        report.restored, report.failed, report.skipped_visible, report.purged_expired
    );
    Some(report)
}

fn restore_all(ctx: &PipelineContext) -> RestoreReport {
    let mut report = RestoreReport::default();
    let now = ctx.now();

    match ctx.store.delete_expired(now) {
        Ok(purged) => report.purged_expired = purged,
        Err(e) => error!("Failed to purge expired notifications: {}", PipelineError::store(e)),
    }

    let cutoff = now.saturating_sub(ctx.settings.restore_window_secs);
    let candidates = match ctx.store.restore_candidates(cutoff) {
        Ok(candidates) => candidates,
        Err(e) => {
            error!("Failed to load restore candidates: {}", PipelineError::store(e));
            return report;
        }
    };
    report.candidates = candidates.len();

    let visible = visible_android_ids(ctx);
    let mut rows: Vec<NotificationRecord> = candidates
        .into_iter()
        .filter(|row| !visible.contains(&row.android_id))
        .collect();
    report.skipped_visible = report.candidates - rows.len();

    // Keep the newest, replay oldest first
    let max = ctx.settings.max_restore_count;
    if rows.len() > max {
        rows.drain(..rows.len() - max);
    }
    if rows.is_empty() {
        return report;
    }
    info!("Restoring {} notification(s)", rows.len());

    for (index, row) in rows.iter().enumerate() {
        if index > 0 {
            thread::sleep(ctx.settings.restore_delay());
        }
        match restore_row(ctx, row) {
            Ok(true) => report.restored += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("{}", e);
                report.failed += 1;
            }
        }
    }
    report
}

fn visible_android_ids(ctx: &PipelineContext) -> HashSet<i32> {
    let visible = guarded("renderer", || ctx.renderer.visible_notification_ids())
        .and_then(|ids| ids.map_err(PipelineError::PlatformQuery));
    match visible {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!("{}, assuming no notification is visible", e);
            HashSet::new()
        }
    }
}

/// Re-drive one stored row. Returns whether it was shown.
fn restore_row(ctx: &PipelineContext, row: &NotificationRecord) -> Result<bool, PipelineError> {
    let payload = NotificationPayload::from_json_str(&row.full_payload).map_err(|e| {
        PipelineError::RestoreRow {
            row_id: row.id,
            reason: e.to_string(),
        }
    })?;
    let notification_id = row
        .notification_id
        .clone()
        .or_else(|| payload.notification_id())
        .ok_or_else(|| PipelineError::RestoreRow {
            row_id: row.id,
            reason: "no notification id".to_string(),
        })?;

    let job = NotificationGenerationJob::restored(payload, notification_id, row.android_id, row.created_at);
    let outcome = process_job(ctx, job, None);
    if !outcome.persisted {
        return Err(PipelineError::RestoreRow {
            row_id: row.id,
            reason: "store write failed".to_string(),
        });
    }
    Ok(outcome.shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::RestoreState;
    use crate::config::PipelineSettings;
    use crate::pipeline::test_support::{
        stored_row, test_context_with_renderer, test_context_with_settings, test_settings,
    };
    use crate::store::{JobWrite, NewNotification};

    #[test]
    fn test_restores_only_invisible_rows_once() {
        let (ctx, renderer) = test_context_with_renderer();
        stored_row(&ctx, "a", 10, None, "one");
        stored_row(&ctx, "b", 11, None, "two");
        renderer.set_visible(vec![11]);

        assert_eq!(ctx.restore_state(), RestoreState::NotStarted);
        let report = run(&ctx, false).unwrap();
        assert_eq!(ctx.restore_state(), RestoreState::Done);

        assert_eq!(report.candidates, 2);
        assert_eq!(report.skipped_visible, 1);
        assert_eq!(report.restored, 1);
        assert_eq!(report.failed, 0);

        let displayed = renderer.displayed();
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].android_id, 10);
        assert!(displayed[0].restoring);

        assert!(run(&ctx, false).is_none());
    }

    #[test]
    fn test_malformed_row_does_not_stop_the_pass() {
        let (ctx, renderer) = test_context_with_renderer();
        ctx.store
            .persist_job(&JobWrite {
                record: NewNotification {
                    notification_id: "broken".to_string(),
                    android_id: 20,
                    group_id: None,
                    collapse_id: None,
                    title: None,
                    body: Some("x".to_string()),
                    full_payload: "{not json".to_string(),
                    created_at: 90,
                    expire_at: 100_000,
                    dismissed: false,
                },
                supersede_android_id: None,
                summary: None,
            })
            .unwrap();
        stored_row(&ctx, "ok", 21, None, "fine");

        let report = run(&ctx, false).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.restored, 1);
        assert_eq!(renderer.displayed()[0].notification_id, "ok");
    }

    #[test]
    fn test_restore_count_keeps_newest() {
        let (ctx, renderer) = test_context_with_settings(PipelineSettings {
            max_restore_count: 1,
            ..test_settings()
        });
        stored_row(&ctx, "a", 10, None, "older");
        stored_row(&ctx, "b", 11, None, "newer");

        let report = run(&ctx, false).unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(renderer.displayed()[0].notification_id, "b");
    }
}
