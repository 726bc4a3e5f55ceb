// Resource accounting (spec.md §4.3.4): applying a step's per-node
// allocation to the job's used-counters, and its exact inverse for
// completion/deallocation (§4.3.7). The "continue on error, roll back at
// the end" rule is implemented literally: `allocate_step` never unwinds
// a node's counters the moment a later node fails, only after the whole
// loop has run, by replaying `release_step` over everything it actually
// touched.

use std::collections::HashMap;

use ridge_base::{Bitmap, NodeIdx};

use crate::model::{Job, Node, StepFlags};

#[derive(Clone, Debug)]
pub struct NodeAllocation {
    pub node: NodeIdx,
    /// Already the step's raw per-task*per-node cpu count, before
    /// thread-per-core rounding.
    pub cpus: u32,
    pub mem_mb: u64,
    pub cores: Bitmap,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccountingError {
    MemoryExceeded { node: NodeIdx },
}

impl std::fmt::Display for AccountingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountingError::MemoryExceeded { node } => write!(f, "node {node:?} exceeded available memory"),
        }
    }
}
impl std::error::Error for AccountingError {}

impl From<AccountingError> for ridge_base::Error {
    fn from(e: AccountingError) -> ridge_base::Error {
        ridge_base::err(e.to_string())
    }
}

fn rounded_cpus(node: Option<&Node>, cpus: u32) -> u32 {
    let tpc = node.map(|n| n.threads_per_core).unwrap_or(1).max(1);
    cpus.div_ceil(tpc) * tpc
}

fn apply_one(
    job: &mut Job,
    registry: &HashMap<NodeIdx, Node>,
    alloc: &NodeAllocation,
    overlap_force: bool,
    mem_zero: bool,
) -> Result<(), AccountingError> {
    if !overlap_force {
        let cpus = rounded_cpus(registry.get(&alloc.node), alloc.cpus);
        *job.cpus_used.entry(alloc.node).or_insert(0) += cpus;
    }

    // MEM_ZERO steps record the whole job's per-node allocation as the
    // step's memory but never debit `memory_used`.
    let mem_to_debit = if mem_zero { 0 } else { alloc.mem_mb };
    if mem_to_debit > 0 {
        let available = job.available_memory_mb(alloc.node);
        if mem_to_debit > available {
            return Err(AccountingError::MemoryExceeded { node: alloc.node });
        }
        *job.memory_used_mb.entry(alloc.node).or_insert(0) += mem_to_debit;
    }

    if !overlap_force {
        let total_cores = alloc.cores.len();
        let used = job.core_bitmap_used.entry(alloc.node).or_insert_with(|| Bitmap::new(total_cores));
        used.union(&alloc.cores);
    }

    Ok(())
}

fn release_one(job: &mut Job, alloc: &NodeAllocation, overlap_force: bool, mem_zero: bool, mem_applied: bool) {
    if !overlap_force {
        if let Some(used) = job.cpus_used.get_mut(&alloc.node) {
            *used = used.saturating_sub(alloc.cpus);
        }
    }
    if mem_applied && !mem_zero && alloc.mem_mb > 0 {
        if let Some(used) = job.memory_used_mb.get_mut(&alloc.node) {
            *used = used.saturating_sub(alloc.mem_mb);
        }
    }
    if !overlap_force {
        if let Some(used) = job.core_bitmap_used.get_mut(&alloc.node) {
            used.subtract(&alloc.cores);
        }
    }
}

/// Applies every node's allocation, continuing past individual
/// failures, then -- if anything failed -- releases everything that was
/// actually applied and returns the first error.
pub fn allocate_step(
    job: &mut Job,
    registry: &HashMap<NodeIdx, Node>,
    allocations: &[NodeAllocation],
    flags: StepFlags,
) -> Result<(), AccountingError> {
    let overlap_force = flags.contains(StepFlags::OVERLAP_FORCE);
    let mem_zero = flags.contains(StepFlags::MEM_ZERO);

    let mut applied: Vec<(&NodeAllocation, bool)> = Vec::new();
    let mut first_err = None;

    for alloc in allocations {
        match apply_one(job, registry, alloc, overlap_force, mem_zero) {
            Ok(()) => applied.push((alloc, true)),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_err {
        for (alloc, mem_applied) in applied {
            release_one(job, alloc, overlap_force, mem_zero, mem_applied);
        }
        return Err(e);
    }

    Ok(())
}

/// The inverse of `allocate_step`, used on normal step completion
/// (§4.3.7) rather than on a partial-allocate failure.
pub fn release_step(job: &mut Job, allocations: &[NodeAllocation], flags: StepFlags) {
    let overlap_force = flags.contains(StepFlags::OVERLAP_FORCE);
    let mem_zero = flags.contains(StepFlags::MEM_ZERO);
    for alloc in allocations {
        release_one(job, alloc, overlap_force, mem_zero, true);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{JobResources, JobState};
    use std::cell::Cell;

    fn job() -> Job {
        let mut mem_alloc_mb = HashMap::new();
        mem_alloc_mb.insert(NodeIdx(0), 1000);
        mem_alloc_mb.insert(NodeIdx(1), 500);
        Job {
            id: ridge_base::JobId(1),
            uid: 0,
            gid: 0,
            array_task_id: None,
            het_job_id: None,
            het_job_offset: None,
            state: JobState::Running,
            partition: "default".to_string(),
            nodes: vec![NodeIdx(0), NodeIdx(1)],
            job_resources: JobResources { cpus_alloc: HashMap::new(), mem_alloc_mb, core_bitmap: HashMap::new() },
            cpus_used: HashMap::new(),
            memory_used_mb: HashMap::new(),
            core_bitmap_used: HashMap::new(),
            steps: Vec::new(),
            next_step_id: Cell::new(0),
            next_step_node_inx: Cell::new(0),
            end_time: 0,
            start_time: 0,
            tot_suspend_time: 0,
        }
    }

    #[test]
    fn applies_cpu_and_memory_on_success() {
        let mut j = job();
        let allocs = vec![
            NodeAllocation { node: NodeIdx(0), cpus: 2, mem_mb: 200, cores: Bitmap::new(4) },
            NodeAllocation { node: NodeIdx(1), cpus: 1, mem_mb: 100, cores: Bitmap::new(4) },
        ];
        allocate_step(&mut j, &HashMap::new(), &allocs, StepFlags::empty()).unwrap();
        assert_eq!(j.cpus_used[&NodeIdx(0)], 2);
        assert_eq!(j.memory_used_mb[&NodeIdx(0)], 200);
        assert_eq!(j.memory_used_mb[&NodeIdx(1)], 100);
    }

    #[test]
    fn failure_on_one_node_rolls_back_everything() {
        let mut j = job();
        let allocs = vec![
            NodeAllocation { node: NodeIdx(0), cpus: 2, mem_mb: 200, cores: Bitmap::new(4) },
            // node 1 only has 500 MB available; request more than that.
            NodeAllocation { node: NodeIdx(1), cpus: 1, mem_mb: 900, cores: Bitmap::new(4) },
        ];
        let err = allocate_step(&mut j, &HashMap::new(), &allocs, StepFlags::empty()).unwrap_err();
        assert_eq!(err, AccountingError::MemoryExceeded { node: NodeIdx(1) });
        // node 0 succeeded first but must be rolled back once node 1 failed.
        assert_eq!(*j.cpus_used.get(&NodeIdx(0)).unwrap_or(&0), 0);
        assert_eq!(*j.memory_used_mb.get(&NodeIdx(0)).unwrap_or(&0), 0);
    }

    #[test]
    fn overlap_force_never_touches_used_counters() {
        let mut j = job();
        let allocs = vec![NodeAllocation { node: NodeIdx(0), cpus: 4, mem_mb: 0, cores: Bitmap::new(4) }];
        allocate_step(&mut j, &HashMap::new(), &allocs, StepFlags::OVERLAP_FORCE).unwrap();
        assert_eq!(*j.cpus_used.get(&NodeIdx(0)).unwrap_or(&0), 0);
    }

    proptest::proptest! {
        // spec.md §8: "0 <= memory_used(n) <= memory_alloc(n)" must hold
        // after every allocate_step call, success or failure -- either the
        // whole request fit and used reflects it exactly, or it didn't and
        // the roll-back rule (§9) leaves used at its pre-call value (0,
        // for a freshly built job).
        #[test]
        fn memory_used_never_exceeds_alloc_on_node_0(requested_mb in 0u64..2000) {
            let mut j = job();
            let allocs = vec![NodeAllocation { node: NodeIdx(0), cpus: 1, mem_mb: requested_mb, cores: Bitmap::new(4) }];
            let alloc_mb = j.job_resources.mem_alloc_mb[&NodeIdx(0)];
            let result = allocate_step(&mut j, &HashMap::new(), &allocs, StepFlags::empty());
            let used = *j.memory_used_mb.get(&NodeIdx(0)).unwrap_or(&0);
            prop_assert!(used <= alloc_mb);
            if requested_mb > alloc_mb {
                prop_assert!(result.is_err());
                prop_assert_eq!(used, 0);
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(used, requested_mb);
            }
        }
    }
}
