//! Recording fakes for the host hooks
//!
//! Every fake records what the pipeline asked of it so tests can assert on
//! the interaction afterwards.

use pushcore::payload::NotificationPayload;
use pushcore::pipeline::{
    DisplayCompletion, DisplayOverride, ExtenderDecision, ForegroundHandler, GroupSummary,
    HostEnvironment, InAppPreviewHandler, NotificationExtender, NotificationGenerationJob,
    NotificationHandlers, NotificationRenderer, NotificationSnapshot, OpenedResult, ScheduledWork,
    WorkScheduler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

// ============================================================================
// Renderer
// ============================================================================

/// Renderer that records posted and cancelled entries instead of drawing them.
#[derive(Default)]
pub struct FakeRenderer {
    displayed: Mutex<Vec<NotificationSnapshot>>,
    summaries: Mutex<Vec<GroupSummary>>,
    cancelled: Mutex<Vec<i32>>,
    visible: Mutex<Vec<i32>>,
    panic_on_display: AtomicBool,
    fail_visible_query: AtomicBool,
}

impl FakeRenderer {
    pub fn displayed(&self) -> Vec<NotificationSnapshot> {
        self.displayed.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<GroupSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Android ids reported as currently visible in the shade.
    pub fn set_visible(&self, ids: Vec<i32>) {
        *self.visible.lock().unwrap() = ids;
    }

    pub fn panic_on_display(&self) {
        self.panic_on_display.store(true, Ordering::SeqCst);
    }

    pub fn fail_visible_query(&self) {
        self.fail_visible_query.store(true, Ordering::SeqCst);
    }
}

impl NotificationRenderer for FakeRenderer {
    fn display(&self, job: &NotificationGenerationJob) -> bool {
        if self.panic_on_display.load(Ordering::SeqCst) {
            panic!("renderer exploded");
        }
        self.displayed.lock().unwrap().push(job.snapshot());
        true
    }

    fn display_summary(&self, summary: &GroupSummary) -> bool {
        self.summaries.lock().unwrap().push(summary.clone());
        true
    }

    fn cancel(&self, android_id: i32) {
        self.cancelled.lock().unwrap().push(android_id);
    }

    fn visible_notification_ids(&self) -> anyhow::Result<Vec<i32>> {
        if self.fail_visible_query.load(Ordering::SeqCst) {
            anyhow::bail!("notification service unavailable");
        }
        Ok(self.visible.lock().unwrap().clone())
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Default)]
pub struct RecordingHandlers {
    received: Mutex<Vec<NotificationSnapshot>>,
    opened: Mutex<Vec<OpenedResult>>,
    badge_counts: Mutex<Vec<usize>>,
}

impl RecordingHandlers {
    pub fn received(&self) -> Vec<NotificationSnapshot> {
        self.received.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<OpenedResult> {
        self.opened.lock().unwrap().clone()
    }

    pub fn badge_counts(&self) -> Vec<usize> {
        self.badge_counts.lock().unwrap().clone()
    }

    pub fn last_badge_count(&self) -> Option<usize> {
        self.badge_counts.lock().unwrap().last().copied()
    }
}

impl NotificationHandlers for RecordingHandlers {
    fn on_received(&self, notification: &NotificationSnapshot) {
        self.received.lock().unwrap().push(notification.clone());
    }

    fn on_opened(&self, result: &OpenedResult) {
        self.opened.lock().unwrap().push(result.clone());
    }

    fn on_badge_count_changed(&self, count: usize) {
        self.badge_counts.lock().unwrap().push(count);
    }
}

// ============================================================================
// Extender
// ============================================================================

/// Extender answering every notification with the same decision.
pub struct FixedExtender {
    decision: ExtenderDecision,
    seen: Mutex<Vec<NotificationSnapshot>>,
}

impl FixedExtender {
    pub fn new(decision: ExtenderDecision) -> Self {
        Self {
            decision,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<NotificationSnapshot> {
        self.seen.lock().unwrap().clone()
    }
}

impl NotificationExtender for FixedExtender {
    fn extend(&self, notification: &NotificationSnapshot) -> anyhow::Result<ExtenderDecision> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(self.decision.clone())
    }
}

pub struct PanickingExtender;

impl NotificationExtender for PanickingExtender {
    fn extend(&self, _notification: &NotificationSnapshot) -> anyhow::Result<ExtenderDecision> {
        panic!("extender exploded");
    }
}

// ============================================================================
// Foreground handler
// ============================================================================

#[derive(Debug, Clone)]
pub enum ForegroundBehavior {
    /// Complete on another thread after the delay.
    CompleteLater(Duration, Option<DisplayOverride>),
    /// Hold the completion and never answer.
    Hang,
    /// Drop the completion without answering.
    Drop,
}

pub struct ScriptedForegroundHandler {
    behavior: ForegroundBehavior,
    held: Mutex<Vec<DisplayCompletion>>,
    calls: Mutex<usize>,
}

impl ScriptedForegroundHandler {
    pub fn new(behavior: ForegroundBehavior) -> Self {
        Self {
            behavior,
            held: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ForegroundHandler for ScriptedForegroundHandler {
    fn will_show_in_foreground(&self, _notification: &NotificationSnapshot, completion: DisplayCompletion) {
        *self.calls.lock().unwrap() += 1;
        match &self.behavior {
            ForegroundBehavior::CompleteLater(delay, choice) => {
                let delay = *delay;
                let choice = choice.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    completion.complete(choice);
                });
            }
            ForegroundBehavior::Hang => self.held.lock().unwrap().push(completion),
            ForegroundBehavior::Drop => drop(completion),
        }
    }
}

// ============================================================================
// Host environment, scheduler, in-app preview
// ============================================================================

pub struct FakeHost {
    in_focus: AtomicBool,
}

impl FakeHost {
    pub fn new(in_focus: bool) -> Self {
        Self {
            in_focus: AtomicBool::new(in_focus),
        }
    }

    pub fn set_in_focus(&self, in_focus: bool) {
        self.in_focus.store(in_focus, Ordering::SeqCst);
    }
}

impl HostEnvironment for FakeHost {
    fn is_app_in_focus(&self) -> bool {
        self.in_focus.load(Ordering::SeqCst)
    }
}

/// Scheduler that queues work for the test to run by hand.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<Vec<ScheduledWork>>,
    reject: AtomicBool,
}

impl QueueScheduler {
    pub fn take(&self) -> Vec<ScheduledWork> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    pub fn reject(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

impl WorkScheduler for QueueScheduler {
    fn schedule(&self, work: ScheduledWork) -> anyhow::Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            anyhow::bail!("work queue is full");
        }
        self.queue.lock().unwrap().push(work);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPreview {
    shown: Mutex<Vec<String>>,
}

impl RecordingPreview {
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

impl InAppPreviewHandler for RecordingPreview {
    fn show_preview(&self, preview_id: &str, _payload: &NotificationPayload) -> bool {
        self.shown.lock().unwrap().push(preview_id.to_string());
        true
    }
}
