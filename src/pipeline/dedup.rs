//! Duplicate detection and collapse-key resolution.
//!
//! The store is the authority on whether an id was seen. The in-flight set
//! only narrows the window in which two near-simultaneous deliveries of the
//! same id both pass the store check; the store write is an upsert, so a
//! delivery that slips through still ends up as one row.

use super::context::PipelineContext;
use crate::config::SCHEDULED_WORK_TIMEOUT_SECS;
use crate::error::PipelineError;
use crate::payload::NotificationPayload;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Ids whose generation job is currently running or handed to a worker.
///
/// A handed-off id stops blocking redeliveries once `handoff_timeout` passes
/// without a worker adopting it.
#[derive(Debug)]
pub struct InFlightSet {
    /// Value is the hand-off time, `None` while the job runs.
    ids: Mutex<HashMap<String, Option<Instant>>>,
    handoff_timeout: Duration,
}

impl Default for InFlightSet {
    fn default() -> Self {
        Self::new(Duration::from_secs(SCHEDULED_WORK_TIMEOUT_SECS))
    }
}

impl InFlightSet {
    pub fn new(handoff_timeout: Duration) -> Self {
        Self {
            ids: Mutex::new(HashMap::new()),
            handoff_timeout,
        }
    }

    fn ids(&self) -> MutexGuard<'_, HashMap<String, Option<Instant>>> {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `id`, or `None` if it is already being worked.
    pub fn try_register(&self, id: &str) -> Option<InFlightGuard<'_>> {
        let mut ids = self.ids();
        match ids.get(id) {
            None => {}
            Some(Some(handed_off)) if handed_off.elapsed() >= self.handoff_timeout => {
                warn!(
                    "Scheduled work for {} was not run within {:?}, accepting redelivery",
                    id, self.handoff_timeout
                );
            }
            Some(_) => return None,
        }
        ids.insert(id.to_string(), None);
        Some(InFlightGuard {
            set: self,
            id: id.to_string(),
            kept: false,
        })
    }

    /// Take over an id registered by an earlier, kept guard.
    pub fn adopt(&self, id: &str) -> InFlightGuard<'_> {
        self.ids().insert(id.to_string(), None);
        InFlightGuard {
            set: self,
            id: id.to_string(),
            kept: false,
        }
    }

    /// Drop a handed-off id whose work will never run. Ids of running jobs
    /// are left alone. Returns whether the id was released.
    pub fn release_handed_off(&self, id: &str) -> bool {
        let mut ids = self.ids();
        if matches!(ids.get(id), Some(Some(_))) {
            ids.remove(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains_key(id)
    }

    fn release(&self, id: &str) {
        self.ids().remove(id);
    }

    fn hand_off(&self, id: &str) {
        if let Some(handed_off) = self.ids().get_mut(id) {
            *handed_off = Some(Instant::now());
        }
    }
}

/// Removes its id from the in-flight set when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: String,
    kept: bool,
}

impl InFlightGuard<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Leave the id registered after this guard goes away; the work was
    /// handed to a worker that will [`InFlightSet::adopt`] it. Until then
    /// redeliveries of the id are duplicates, for at most the hand-off
    /// timeout.
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.kept {
            self.set.hand_off(&self.id);
        } else {
            self.set.release(&self.id);
        }
    }
}

#[derive(Debug)]
pub enum DedupVerdict<'a> {
    /// Proceed. Live deliveries hold the in-flight registration until the job
    /// is stored; restores hold none.
    Accept(Option<InFlightGuard<'a>>),
    Duplicate,
    /// No `custom.i`: not a payload from this backend. Nothing is stored.
    MissingId,
}

/// Decide whether a payload may be processed, registering it as in flight.
pub fn check_and_register<'a>(
    ctx: &'a PipelineContext,
    payload: &NotificationPayload,
    restoring: bool,
) -> DedupVerdict<'a> {
    let Some(id) = payload.notification_id() else {
        return DedupVerdict::MissingId;
    };

    if restoring {
        return DedupVerdict::Accept(None);
    }

    let Some(guard) = ctx.in_flight.try_register(&id) else {
        debug!("Notification {} is already being processed", id);
        return DedupVerdict::Duplicate;
    };

    match ctx.store.notification_exists(&id) {
        Ok(true) => {
            debug!("Notification {} was already received", id);
            DedupVerdict::Duplicate
        }
        Ok(false) => DedupVerdict::Accept(Some(guard)),
        Err(e) => {
            // The upsert keeps a redelivery to one row
            error!(
                "Duplicate check for {} failed, accepting: {}",
                id,
                PipelineError::store(e)
            );
            DedupVerdict::Accept(Some(guard))
        }
    }
}

/// Android id of the live notification this payload should replace.
pub fn resolve_collapse(
    ctx: &PipelineContext,
    payload: &NotificationPayload,
    restoring: bool,
) -> Option<i32> {
    if restoring {
        return None;
    }
    let collapse_id = payload.collapse_id()?;
    match ctx.store.find_live_by_collapse_id(&collapse_id) {
        Ok(Some(existing)) => {
            debug!(
                "Collapse key {} replaces android id {}",
                collapse_id, existing.android_id
            );
            Some(existing.android_id)
        }
        Ok(None) => None,
        Err(e) => {
            error!(
                "Collapse lookup for {} failed: {}",
                collapse_id,
                PipelineError::store(e)
            );
            None
        }
    }
}
