// Glues the pieces the rest of the crate keeps separate into the single
// pipeline spec.md §4.3 describes as one operation: pick nodes, lay
// tasks out on them, select cores, charge the job's used-counters, and
// hand back the `Step` ready for credential issuance. Each stage stays
// its own module (and its own unit tests) because the original keeps
// node-picking, layout, core selection and accounting as separate
// functions too; this is only the wiring.

use std::collections::HashMap;

use ridge_base::{Bitmap, NodeIdx, StepId};

use crate::accounting::{allocate_step, AccountingError, NodeAllocation};
use crate::core_select::{cores_needed, select_cores_for_node};
use crate::errors::StepCreateError;
use crate::gres::GresAdvisor;
use crate::layout::{build_step_layout, LayoutError};
use crate::model::{Job, Node, Step, StepFlags};
use crate::pick::pick_step_nodes;
use crate::request::{MemSpec, StepRequest};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateStepError {
    Pick(StepCreateError),
    Layout(LayoutError),
    Accounting(AccountingError),
}

impl std::fmt::Display for CreateStepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateStepError::Pick(e) => write!(f, "{e}"),
            CreateStepError::Layout(e) => write!(f, "{e}"),
            CreateStepError::Accounting(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CreateStepError {}

impl From<StepCreateError> for CreateStepError {
    fn from(e: StepCreateError) -> Self {
        CreateStepError::Pick(e)
    }
}
impl From<LayoutError> for CreateStepError {
    fn from(e: LayoutError) -> Self {
        CreateStepError::Layout(e)
    }
}
impl From<AccountingError> for CreateStepError {
    fn from(e: AccountingError) -> Self {
        CreateStepError::Accounting(e)
    }
}

impl From<CreateStepError> for ridge_base::Error {
    fn from(e: CreateStepError) -> ridge_base::Error {
        ridge_base::err(e.to_string())
    }
}

fn mem_for_node(req: &StepRequest, cpus_alloc_on_node: u32) -> u64 {
    match req.pn_min_memory {
        MemSpec::PerNode(mb) => mb,
        MemSpec::PerCpu(mb) => mb * cpus_alloc_on_node as u64,
    }
}

/// The regular (non-special) step-create path: `pick_step_nodes` →
/// `build_step_layout` → `select_cores_for_node` per node →
/// `allocate_step`. Returns the fully-populated `Step`, already charged
/// against `job`'s used-counters; the caller still owns credential
/// issuance (§4.4) since that needs an external `CredentialSigner`.
pub fn create_regular_step(
    job: &mut Job,
    registry: &HashMap<NodeIdx, Node>,
    system_up: &std::collections::HashSet<NodeIdx>,
    gres: &dyn GresAdvisor,
    req: &StepRequest,
    uid: u32,
    now: i64,
) -> Result<Step, CreateStepError> {
    let outcome = pick_step_nodes(job, registry, system_up, gres, req)?;
    let layout = build_step_layout(&outcome.nodes, req)?;

    let whole = req.flags.contains(StepFlags::WHOLE);
    let mut allocations = Vec::with_capacity(layout.len());
    let mut core_bitmap_job = HashMap::new();
    let mut mem_per_node_mb = HashMap::new();
    let mut oversub_offset = 0u32;

    for node_layout in &layout {
        let cpus_alloc_on_node = node_layout.num_tasks * node_layout.cpus_per_task;
        let node = registry.get(&node_layout.node);
        let needed = node.map(|n| cores_needed(n, cpus_alloc_on_node, whole)).unwrap_or(0);
        let cores = match node {
            Some(n) => select_cores_for_node(job, n, node_layout.node, needed, gres, req, oversub_offset),
            None => Bitmap::new(0),
        };
        oversub_offset = oversub_offset.wrapping_add(needed);

        let mem_mb = mem_for_node(req, cpus_alloc_on_node);
        mem_per_node_mb.insert(node_layout.node, mem_mb);
        core_bitmap_job.insert(node_layout.node, cores.clone());
        allocations.push(NodeAllocation { node: node_layout.node, cpus: cpus_alloc_on_node, mem_mb, cores });
    }

    allocate_step(job, registry, &allocations, req.flags)?;

    let step_id = req.step_id.map(StepId::Id).unwrap_or_else(|| StepId::Id(job.alloc_next_step_id()));

    Ok(Step {
        step_id,
        het_job_offset: job.het_job_offset,
        layout,
        mem_per_node_mb,
        core_bitmap_job,
        credential: None,
        gres: req.gres.iter().map(|g| g.name.clone()).collect(),
        flags: req.flags,
        exit_node_bitmap: Bitmap::new(job.nodes.len()),
        time_limit_minutes: None,
        cpu_freq: req.cpu_freq,
        start_time: now,
        uid,
        pending_contact: None,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gres::UnconstrainedGres;
    use crate::model::{JobResources, JobState, NodeState, TaskDist, TaskDistNode, TaskDistSocket};
    use std::cell::Cell;
    use std::collections::HashSet;

    fn node(idx: u32) -> Node {
        Node {
            idx: NodeIdx(idx),
            name: format!("n{idx}"),
            address: format!("10.0.0.{idx}"),
            sockets: 2,
            cores_per_socket: 4,
            threads_per_core: 1,
            real_memory_mb: 8192,
            state: NodeState::UpIdle,
            features: Vec::new(),
            gres: Vec::new(),
            last_response: 0,
            protocol_version: 1,
        }
    }

    fn job_with_nodes(n: u32) -> (Job, HashMap<NodeIdx, Node>, HashSet<NodeIdx>) {
        let mut registry = HashMap::new();
        let mut nodes = Vec::new();
        let mut cpus_alloc = HashMap::new();
        let mut core_bitmap = HashMap::new();
        let mut up = HashSet::new();
        for i in 0..n {
            let idx = NodeIdx(i);
            let nd = node(i);
            let total_cores = nd.total_cores();
            registry.insert(idx, nd);
            nodes.push(idx);
            cpus_alloc.insert(idx, 8);
            let mut full = Bitmap::new(total_cores as usize);
            full.set_all();
            core_bitmap.insert(idx, full);
            up.insert(idx);
        }
        let job = Job {
            id: ridge_base::JobId(1),
            uid: 0,
            gid: 0,
            array_task_id: None,
            het_job_id: None,
            het_job_offset: None,
            state: JobState::Running,
            partition: "default".to_string(),
            nodes,
            job_resources: JobResources { cpus_alloc, mem_alloc_mb: HashMap::new(), core_bitmap },
            cpus_used: HashMap::new(),
            memory_used_mb: HashMap::new(),
            core_bitmap_used: HashMap::new(),
            steps: Vec::new(),
            next_step_id: Cell::new(0),
            next_step_node_inx: Cell::new(0),
            end_time: 0,
            start_time: 0,
            tot_suspend_time: 0,
        };
        (job, registry, up)
    }

    #[test]
    fn basic_layout_scenario_gives_two_cpus_per_node() {
        // spec.md §8 scenario 1: 4 nodes x 8 CPUs, num_tasks=8, cpus_per_task=1
        // -> 2 CPUs on each of 4 nodes, cpus_used=2 per node after.
        let (mut job, registry, up) = job_with_nodes(4);
        let req = StepRequest {
            num_tasks: 8,
            cpu_count: 8,
            cpus_per_task: 1,
            min_nodes: Some(4),
            max_nodes: Some(4),
            task_dist: TaskDist { node: TaskDistNode::Block, socket: TaskDistSocket::SockBlock },
            ..StepRequest::default()
        };
        let step = create_regular_step(&mut job, &registry, &up, &UnconstrainedGres, &req, 0, 0).unwrap();

        assert_eq!(step.layout.len(), 4);
        for l in &step.layout {
            assert_eq!(l.num_tasks, 2);
            assert_eq!(l.cpus_per_task, 1);
            assert_eq!(job.cpus_used[&l.node], 2);
        }
    }

    #[test]
    fn cpus_per_task_zero_coerces_to_one_end_to_end() {
        let (mut job, registry, up) = job_with_nodes(4);
        let req = StepRequest { num_tasks: 4, cpu_count: 4, cpus_per_task: 0, min_nodes: Some(4), max_nodes: Some(4), ..StepRequest::default() };
        let step = create_regular_step(&mut job, &registry, &up, &UnconstrainedGres, &req, 0, 0).unwrap();
        assert!(step.layout.iter().all(|l| l.cpus_per_task == 1));
    }
}
