//! Group summary aggregation.
//!
//! A group gets a summary row in the same transaction as its first shown
//! member, so later arrivals always find it. The summary entry is only
//! rendered once the group holds at least two live notifications. Callers
//! hold the group lock from aggregation until the job is persisted.

use super::context::PipelineContext;
use super::hooks::guarded;
use super::job::NotificationGenerationJob;
use crate::error::PipelineError;
use crate::payload::NotificationPayload;
use crate::store::{NotificationRecord, SummaryWrite};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, warn};

/// The "N new messages" shade entry of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub android_id: i32,
    pub notification_count: usize,
    pub summary_text: String,
    /// One "title body" line per live notification, newest first.
    pub lines: Vec<String>,
}

/// Summary state produced for a shown job, persisted with the job.
#[derive(Debug, Clone)]
pub(crate) struct SummaryUpdate {
    /// The summary entry rendered for the group, if any.
    pub rendered: Option<GroupSummary>,
    pub write: SummaryWrite,
}

/// Aggregate the group summary for a job that was just shown.
///
/// `superseded` is the android id the job replaces via collapse; that row no
/// longer counts.
pub(crate) fn on_notification_shown(
    ctx: &PipelineContext,
    job: &NotificationGenerationJob,
    superseded: Option<i32>,
) -> Option<SummaryUpdate> {
    let group_id = job.group_id()?;
    match aggregate_fresh(ctx, job, &group_id, superseded) {
        Ok(update) => Some(update),
        Err(e) => {
            error!(
                "Failed to update summary of group {}: {}",
                group_id,
                PipelineError::store(e)
            );
            None
        }
    }
}

fn aggregate_fresh(
    ctx: &PipelineContext,
    job: &NotificationGenerationJob,
    group_id: &str,
    superseded: Option<i32>,
) -> Result<SummaryUpdate> {
    // A restored job is already stored; count it once
    let children: Vec<NotificationRecord> = ctx
        .store
        .live_group_children(group_id, superseded)?
        .into_iter()
        .filter(|c| c.notification_id.as_deref() != Some(job.notification_id()))
        .collect();

    let android_id = match ctx.store.get_live_summary(group_id)? {
        Some(row) => row.android_id,
        None => ctx.store.allocate_android_id()?,
    };
    let now = ctx.now();
    let mut write = SummaryWrite {
        group_id: group_id.to_string(),
        android_id,
        text: None,
        created_at: now,
        expire_at: job
            .payload()
            .expire_at(job.shown_timestamp(), ctx.settings.default_ttl_secs)
            .max(now),
    };

    let notification_count = children.len() + 1;
    if notification_count < 2 {
        debug!("Group {} has a single notification, no summary shown", group_id);
        return Ok(SummaryUpdate {
            rendered: None,
            write,
        });
    }

    let mut lines = Vec::with_capacity(notification_count);
    lines.push(job.preview_line());
    lines.extend(children.iter().map(NotificationRecord::preview_line));

    let summary = GroupSummary {
        group_id: group_id.to_string(),
        android_id,
        notification_count,
        summary_text: job.payload().summary_text(notification_count),
        lines,
    };
    write.text = Some(summary.summary_text.clone());
    render(ctx, &summary);
    Ok(SummaryUpdate {
        rendered: Some(summary),
        write,
    })
}

/// Bring a group summary in line with its remaining live children after some
/// were opened, dismissed or cancelled.
///
/// No children left retires the summary; one child leaves it alone; two or
/// more re-render it.
pub fn refresh_after_removal(ctx: &PipelineContext, group_id: &str) {
    let group_lock = ctx.group_lock(group_id);
    let _guard = group_lock
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(e) = rebuild(ctx, group_id) {
        error!(
            "Failed to refresh summary of group {}: {}",
            group_id,
            PipelineError::store(e)
        );
    }
}

fn rebuild(ctx: &PipelineContext, group_id: &str) -> Result<()> {
    let Some(summary_row) = ctx.store.get_live_summary(group_id)? else {
        return Ok(());
    };
    let children = ctx.store.live_group_children(group_id, None)?;

    match children.len() {
        0 => {
            debug!("Retiring summary of empty group {}", group_id);
            ctx.store.mark_dismissed(&[summary_row.android_id])?;
            cancel(ctx, summary_row.android_id);
        }
        1 => {}
        count => {
            // Newest child carries the template for the group
            let summary_text = NotificationPayload::from_json_str(&children[0].full_payload)
                .map(|p| p.summary_text(count))
                .unwrap_or_else(|e| {
                    warn!("{}", e);
                    format!("{} new messages", count)
                });
            let summary = GroupSummary {
                group_id: group_id.to_string(),
                android_id: summary_row.android_id,
                notification_count: count,
                summary_text,
                lines: children.iter().map(NotificationRecord::preview_line).collect(),
            };
            ctx.store
                .update_summary_text(summary.android_id, &summary.summary_text)?;
            render(ctx, &summary);
        }
    }
    Ok(())
}

fn render(ctx: &PipelineContext, summary: &GroupSummary) {
    match guarded("renderer", || ctx.renderer.display_summary(summary)) {
        Ok(true) => {}
        Ok(false) => debug!("Summary of group {} was not shown", summary.group_id),
        Err(e) => warn!("{}", e),
    }
}

pub(crate) fn cancel(ctx: &PipelineContext, android_id: i32) {
    if let Err(e) = guarded("renderer", || ctx.renderer.cancel(android_id)) {
        warn!("{}", e);
    }
}
