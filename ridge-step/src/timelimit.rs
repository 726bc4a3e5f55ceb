// Time-limit check (spec.md §4.3.8). A periodic sweep, not an event;
// the job-write lock must never be held while sending the kill message
// (§5's cancellation/timeout rule), so this module only decides *what*
// to send and leaves sending and requeueing to the caller.

use ridge_base::StepId;

use crate::model::{Job, JobState, Step};

#[derive(Clone, Debug)]
pub struct KillTimelimitMsg {
    pub step_id: StepId,
    pub uid: u32,
    pub start_time: i64,
    pub job_state: JobState,
    pub reason: &'static str,
}

/// `now - start_time - tot_suspend_time` compared against the step's own
/// time limit, capped at whatever's left of the job's. `None` means no
/// limit applies (neither the step nor the job set one).
fn effective_limit_minutes(step: &Step, job_limit_minutes: Option<u32>) -> Option<u32> {
    match (step.time_limit_minutes, job_limit_minutes) {
        (Some(s), Some(j)) => Some(s.min(j)),
        (Some(s), None) => Some(s),
        (None, Some(j)) => Some(j),
        (None, None) => None,
    }
}

/// Returns the kill message to send (and sets the step's state to
/// TIMEOUT) if `step` has exceeded its effective time limit as of `now`.
/// Does not mutate `job`; the caller applies `JobState`/`Step` state
/// transitions after releasing the write lock used to read them, per
/// §5.
pub fn check_step_timelimit(job: &Job, step: &Step, job_limit_minutes: Option<u32>, now: i64) -> Option<KillTimelimitMsg> {
    let limit = effective_limit_minutes(step, job_limit_minutes)?;
    let elapsed_secs = now.saturating_sub(step.start_time).saturating_sub(job.tot_suspend_time);
    let limit_secs = (limit as i64).saturating_mul(60);
    if elapsed_secs < limit_secs {
        return None;
    }
    Some(KillTimelimitMsg { step_id: step.step_id, uid: step.uid, start_time: step.start_time, job_state: job.state, reason: "time limit exceeded" })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{JobResources, StepFlags, StepNodeLayout};
    use ridge_base::Bitmap;
    use std::cell::Cell;
    use std::collections::HashMap;

    fn job(tot_suspend_time: i64) -> Job {
        Job {
            id: ridge_base::JobId(1),
            uid: 0,
            gid: 0,
            array_task_id: None,
            het_job_id: None,
            het_job_offset: None,
            state: JobState::Running,
            partition: "default".to_string(),
            nodes: Vec::new(),
            job_resources: JobResources::default(),
            cpus_used: HashMap::new(),
            memory_used_mb: HashMap::new(),
            core_bitmap_used: HashMap::new(),
            steps: Vec::new(),
            next_step_id: Cell::new(0),
            next_step_node_inx: Cell::new(0),
            end_time: 0,
            start_time: 0,
            tot_suspend_time,
        }
    }

    fn step(start_time: i64, time_limit_minutes: Option<u32>) -> Step {
        Step {
            step_id: ridge_base::StepId::Id(1),
            het_job_offset: None,
            layout: vec![StepNodeLayout { node: ridge_base::NodeIdx(0), num_tasks: 1, cpus_per_task: 1 }],
            mem_per_node_mb: HashMap::new(),
            core_bitmap_job: HashMap::new(),
            credential: None,
            gres: Vec::new(),
            flags: StepFlags::empty(),
            exit_node_bitmap: Bitmap::new(1),
            time_limit_minutes,
            cpu_freq: None,
            start_time,
            uid: 7,
            pending_contact: None,
        }
    }

    #[test]
    fn no_limit_never_fires() {
        let j = job(0);
        let s = step(0, None);
        assert!(check_step_timelimit(&j, &s, None, 1_000_000).is_none());
    }

    #[test]
    fn fires_once_elapsed_exceeds_limit() {
        let j = job(0);
        let s = step(0, Some(10));
        assert!(check_step_timelimit(&j, &s, None, 599).is_none());
        let msg = check_step_timelimit(&j, &s, None, 600).unwrap();
        assert_eq!(msg.step_id, s.step_id);
        assert_eq!(msg.uid, 7);
    }

    #[test]
    fn capped_at_job_limit_when_shorter() {
        let j = job(0);
        let s = step(0, Some(60));
        assert!(check_step_timelimit(&j, &s, Some(5), 299).is_none());
        assert!(check_step_timelimit(&j, &s, Some(5), 300).is_some());
    }

    #[test]
    fn suspend_time_is_excluded_from_elapsed() {
        let j = job(100);
        let s = step(0, Some(10));
        // 600s wall time but 100s suspended, so only 500s counted -> not yet expired.
        assert!(check_step_timelimit(&j, &s, None, 600).is_none());
        assert!(check_step_timelimit(&j, &s, None, 700).is_some());
    }
}
