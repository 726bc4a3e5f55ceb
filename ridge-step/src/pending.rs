// Pending-step placeholders (spec.md §4.3.5). When `pick_step_nodes`
// returns a `should_enqueue_pending` error, the step is parked here
// instead of being rejected outright, and retried on every node-state
// change (or on the fallback timer) until it either succeeds or exhausts
// its retry budget.

use std::time::Duration;

use ridge_base::{JobId, StepId};

use crate::errors::StepCreateError;
use crate::request::StepRequest;

/// Defaults per §4.3.5.
pub const DEFAULT_STEP_RETRY_COUNT: u32 = 8;
pub const DEFAULT_STEP_RETRY_TIME: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct PendingStep {
    pub job_id: JobId,
    pub step_id: StepId,
    pub request: StepRequest,
    pub attempts: u32,
    pub last_attempt_at: i64,
    pub last_reason: StepCreateError,
}

impl PendingStep {
    pub fn new(job_id: JobId, step_id: StepId, request: StepRequest, reason: StepCreateError, now: i64) -> Self {
        PendingStep { job_id, step_id, request, attempts: 1, last_attempt_at: now, last_reason: reason }
    }

    /// True once the placeholder has exhausted its retry budget and
    /// should be failed outright rather than retried again.
    pub fn exhausted(&self, retry_count: u32) -> bool {
        self.attempts >= retry_count
    }

    /// Whether enough time has passed since the last attempt to retry on
    /// the fallback timer (independent of any node-state-change wakeup).
    pub fn due(&self, now: i64, retry_time: Duration) -> bool {
        now.saturating_sub(self.last_attempt_at) >= retry_time.as_secs() as i64
    }

    pub fn record_retry(&mut self, reason: StepCreateError, now: i64) {
        self.attempts += 1;
        self.last_attempt_at = now;
        self.last_reason = reason;
    }
}

/// A simple FIFO queue of parked step-create requests. `ridge-ctld` owns
/// the real one under its job-list lock; this is the bookkeeping logic
/// factored out so it can be tested without any locking machinery.
#[derive(Default)]
pub struct PendingQueue {
    entries: Vec<PendingStep>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: PendingStep) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains every entry "due" for a retry right now (either because a
    /// wakeup was requested or the fallback timer elapsed), leaving
    /// everything else queued.
    pub fn take_due(&mut self, now: i64, retry_time: Duration) -> Vec<PendingStep> {
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries).into_iter().partition(|e| e.due(now, retry_time));
        self.entries = rest;
        due
    }

    /// Removes every placeholder belonging to `job_id`, e.g. when the job
    /// itself is cancelled out from under its pending steps.
    pub fn remove_job(&mut self, job_id: JobId) -> Vec<PendingStep> {
        let (removed, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries).into_iter().partition(|e| e.job_id == job_id);
        self.entries = rest;
        removed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::StepRequest;

    fn entry(job: u32, attempts: u32) -> PendingStep {
        let mut e = PendingStep::new(JobId(job), StepId::Id(0), StepRequest::default(), StepCreateError::NodesBusy, 0);
        e.attempts = attempts;
        e
    }

    #[test]
    fn exhausted_after_retry_count_attempts() {
        let e = entry(1, DEFAULT_STEP_RETRY_COUNT);
        assert!(e.exhausted(DEFAULT_STEP_RETRY_COUNT));
        let e2 = entry(1, DEFAULT_STEP_RETRY_COUNT - 1);
        assert!(!e2.exhausted(DEFAULT_STEP_RETRY_COUNT));
    }

    #[test]
    fn take_due_only_drains_elapsed_entries() {
        let mut q = PendingQueue::new();
        let mut fresh = entry(1, 1);
        fresh.last_attempt_at = 100;
        let mut stale = entry(2, 1);
        stale.last_attempt_at = 0;
        q.push(fresh);
        q.push(stale);

        let due = q.take_due(100, DEFAULT_STEP_RETRY_TIME);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].job_id, JobId(2));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_job_drops_only_matching_entries() {
        let mut q = PendingQueue::new();
        q.push(entry(1, 1));
        q.push(entry(2, 1));
        let removed = q.remove_job(JobId(1));
        assert_eq!(removed.len(), 1);
        assert_eq!(q.len(), 1);
    }
}
