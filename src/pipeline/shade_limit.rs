use super::context::PipelineContext;
use super::summary::{cancel, refresh_after_removal};
use crate::error::PipelineError;
use std::collections::BTreeSet;
use tracing::{error, info};

/// Dismiss and cancel the oldest live notifications beyond
/// `max_shade_notifications`. Returns how many were removed.
pub fn enforce(ctx: &PipelineContext) -> usize {
    let live = match ctx.store.live_displayed() {
        Ok(live) => live,
        Err(e) => {
            error!("Shade limit check failed: {}", PipelineError::store(e));
            return 0;
        }
    };
    let max = ctx.settings.max_shade_notifications;
    if live.len() <= max {
        return 0;
    }

    let surplus = &live[..live.len() - max];
    let android_ids: Vec<i32> = surplus.iter().map(|r| r.android_id).collect();
    if let Err(e) = ctx.store.mark_dismissed(&android_ids) {
        error!("Failed to trim shade: {}", PipelineError::store(e));
        return 0;
    }
    info!(
        "Shade limit {} reached, removed {} oldest notification(s)",
        max,
        android_ids.len()
    );

    for android_id in &android_ids {
        cancel(ctx, *android_id);
    }
    let groups: BTreeSet<&str> = surplus
        .iter()
        .filter_map(|r| r.group_id.as_deref())
        .collect();
    for group_id in groups {
        refresh_after_removal(ctx, group_id);
    }
    android_ids.len()
}
