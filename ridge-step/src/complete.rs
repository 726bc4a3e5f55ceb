// Step completion and signalling (spec.md §4.3.7).

use ridge_base::{Bitmap, NodeIdx};

use crate::accounting::{release_step, NodeAllocation};
use crate::model::{Job, Step, StepFlags};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AcctStats {
    pub peak_rss_kb: u64,
    pub cpu_time_ms: u64,
    pub energy_joules: u64,
}

impl AcctStats {
    pub fn merge(&mut self, other: &AcctStats) {
        self.peak_rss_kb = self.peak_rss_kb.max(other.peak_rss_kb);
        self.cpu_time_ms += other.cpu_time_ms;
        self.energy_joules += other.energy_joules;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartialCompOutcome {
    /// The step still has unreported nodes.
    StillRunning,
    /// Every node has reported and the caller requested `finish`; the
    /// step should be removed from the job's list, its resources
    /// released, and any pending placeholders woken.
    Finished,
}

/// `step_partial_comp`: marks `[range_first, range_last]` as exited in
/// the step's `exit_node_bitmap`. Re-reporting an already-set range is
/// detected; on partial overlap only the previously-unset subset is
/// counted (the caller is expected to log a warning using the returned
/// `already_reported` count).
pub struct PartialCompResult {
    pub already_reported: usize,
    pub newly_reported: usize,
    pub outcome: PartialCompOutcome,
}

pub fn step_partial_comp(
    step: &mut Step,
    range_first: usize,
    range_last: usize,
    stats: &AcctStats,
    acct_total: &mut AcctStats,
    finish: bool,
) -> PartialCompResult {
    let mut already_reported = 0;
    let mut newly_reported = 0;
    for i in range_first..=range_last.min(step.exit_node_bitmap.len().saturating_sub(1)) {
        if step.exit_node_bitmap.get(i) {
            already_reported += 1;
        } else {
            step.exit_node_bitmap.set(i, true);
            newly_reported += 1;
        }
    }
    acct_total.merge(stats);

    let all_reported = step.exit_node_bitmap.count() == step.exit_node_bitmap.len();
    let outcome = if all_reported && finish { PartialCompOutcome::Finished } else { PartialCompOutcome::StillRunning };
    PartialCompResult { already_reported, newly_reported, outcome }
}

/// The release half of completion: `_step_dealloc_lps`, the exact
/// inverse of §4.3.4's accounting loop.
pub fn finish_step(job: &mut Job, step: &Step) {
    let allocations: Vec<NodeAllocation> = step
        .layout
        .iter()
        .map(|l| NodeAllocation {
            node: l.node,
            cpus: l.num_tasks * l.cpus_per_task,
            mem_mb: step.mem_per_node_mb.get(&l.node).copied().unwrap_or(0),
            cores: step.core_bitmap_job.get(&l.node).cloned().unwrap_or_else(|| Bitmap::new(0)),
        })
        .collect();
    release_step(job, &allocations, step.flags);
    job.steps.retain(|s| s.step_id != step.step_id);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalOutcome {
    Delivered,
    /// The step completed out from under the signal; per §5's ordering
    /// guarantee this is a normal outcome, not an error.
    AlreadyDone,
}

/// `step_signal`: returns the node set the signal should be forwarded
/// to (§4.1) plus whether `KILL_OOM`/`NO_SIG_FAIL` sticky bits were set
/// on the step for its eventual completion. Hetjob sibling iteration is
/// the caller's responsibility (it walks the job's `steps` list itself
/// and calls this once per matching component); this function only
/// handles a single already-located step.
pub fn step_signal(step: &mut Step, sig_is_kill: bool, oom: bool, no_sig_fail: bool, uid: u32) -> (Vec<NodeIdx>, SignalOutcome) {
    if sig_is_kill {
        step.uid = uid;
    }
    if oom {
        step.flags |= StepFlags::KILL_OOM;
    }
    if no_sig_fail {
        step.flags |= StepFlags::NO_SIG_FAIL;
    }
    let nodes = step.layout.iter().map(|l| l.node).collect();
    (nodes, SignalOutcome::Delivered)
}
