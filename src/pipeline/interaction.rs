//! User and developer interaction with shown notifications: open, dismiss,
//! clear.

use super::context::PipelineContext;
use super::hooks::{guarded, OpenedResult};
use super::summary::{cancel, refresh_after_removal};
use crate::error::PipelineError;
use crate::payload::DEFAULT_ACTION_ID;
use crate::store::NotificationRecord;
use anyhow::Result;
use tracing::{debug, error, info, warn};

/// The user tapped a notification or one of its buttons.
///
/// Opening a summary opens the whole group.
pub fn opened(ctx: &PipelineContext, android_id: i32, action_id: Option<&str>) -> Option<OpenedResult> {
    let (opened_row, rows) = match open_rows(ctx, android_id) {
        Ok(Some(rows)) => rows,
        Ok(None) => {
            debug!("No live notification with android id {} to open", android_id);
            return None;
        }
        Err(e) => {
            error!("Failed to mark {} opened: {}", android_id, PipelineError::store(e));
            return None;
        }
    };

    for row in &rows {
        if row.was_displayed() {
            cancel(ctx, row.android_id);
        }
    }
    if !opened_row.is_summary {
        if let Some(group_id) = &opened_row.group_id {
            refresh_after_removal(ctx, group_id);
        }
    }

    let opened = OpenedResult {
        notification_ids: rows
            .iter()
            .filter(|r| !r.is_summary)
            .filter_map(|r| r.notification_id.clone())
            .collect(),
        action_id: action_id.unwrap_or(DEFAULT_ACTION_ID).to_string(),
        group_id: opened_row.group_id.clone(),
    };
    if let Some(handlers) = &ctx.handlers {
        if let Err(e) = guarded("on_opened", || handlers.on_opened(&opened)) {
            warn!("{}", e);
        }
    }
    ctx.report_badge();
    Some(opened)
}

fn open_rows(
    ctx: &PipelineContext,
    android_id: i32,
) -> Result<Option<(NotificationRecord, Vec<NotificationRecord>)>> {
    let Some(row) = ctx.store.get_live_by_android_id(android_id)? else {
        return Ok(None);
    };
    let rows = match (&row.group_id, row.is_summary) {
        (Some(group_id), true) => ctx.store.open_group(group_id)?,
        _ => ctx.store.mark_opened(&[android_id])?,
    };
    Ok(Some((row, rows)))
}

/// The user swiped a notification away. Dismissing a summary dismisses the
/// group. Returns whether anything changed.
pub fn dismissed(ctx: &PipelineContext, android_id: i32) -> bool {
    let changed = match dismiss_rows(ctx, android_id, false) {
        Ok(changed) => changed,
        Err(e) => {
            error!("Failed to mark {} dismissed: {}", android_id, PipelineError::store(e));
            false
        }
    };
    if changed {
        ctx.report_badge();
    }
    changed
}

/// Remove a notification from the shade on the developer's request.
pub fn remove(ctx: &PipelineContext, android_id: i32) -> bool {
    let changed = match dismiss_rows(ctx, android_id, true) {
        Ok(changed) => changed,
        Err(e) => {
            error!("Failed to remove {}: {}", android_id, PipelineError::store(e));
            false
        }
    };
    if changed {
        ctx.report_badge();
    }
    changed
}

fn dismiss_rows(ctx: &PipelineContext, android_id: i32, cancel_shown: bool) -> Result<bool> {
    let Some(row) = ctx.store.get_live_by_android_id(android_id)? else {
        debug!("No live notification with android id {}", android_id);
        return Ok(false);
    };

    if row.is_summary {
        if let Some(group_id) = &row.group_id {
            // The platform drops the children along with the summary
            for id in ctx.store.dismiss_group(group_id)? {
                if cancel_shown || id != android_id {
                    cancel(ctx, id);
                }
            }
            return Ok(true);
        }
    }

    ctx.store.mark_dismissed(&[android_id])?;
    if cancel_shown {
        cancel(ctx, android_id);
    }
    if let Some(group_id) = &row.group_id {
        refresh_after_removal(ctx, group_id);
    }
    Ok(true)
}

/// Dismiss and cancel every live notification of a group, summary included.
pub fn clear_group(ctx: &PipelineContext, group_id: &str) -> usize {
    match ctx.store.dismiss_group(group_id) {
        Ok(android_ids) => {
            for id in &android_ids {
                cancel(ctx, *id);
            }
            info!("Cleared {} notification(s) of group {}", android_ids.len(), group_id);
            ctx.report_badge();
            android_ids.len()
        }
        Err(e) => {
            error!("Failed to clear group {}: {}", group_id, PipelineError::store(e));
            0
        }
    }
}

/// Dismiss and cancel every live notification.
pub fn clear_all(ctx: &PipelineContext) -> usize {
    match ctx.store.dismiss_all() {
        Ok(android_ids) => {
            for id in &android_ids {
                cancel(ctx, *id);
            }
            info!("Cleared {} notification(s)", android_ids.len());
            ctx.report_badge();
            android_ids.len()
        }
        Err(e) => {
            error!("Failed to clear notifications: {}", PipelineError::store(e));
            0
        }
    }
}
