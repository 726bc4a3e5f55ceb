// Node-picking algorithm (spec.md §4.3.2). Executed under the job read
// lock by convention; this module performs no locking itself and trusts
// the caller to hold whatever's needed per §5.

use std::collections::{HashMap, HashSet};

use ridge_base::NodeIdx;

use crate::errors::StepCreateError;
use crate::gres::GresAdvisor;
use crate::model::{Job, Node, NodeState, StepFlags};
use crate::request::{MemSpec, StepRequest};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockReason {
    Cpu,
    Memory,
    Gres,
}

pub struct NodePickOutcome {
    pub nodes: Vec<NodeIdx>,
    pub usable_cpus: HashMap<NodeIdx, u32>,
}

/// Power-save and non-responding states the node will eventually leave
/// on its own (stepmgr.c: `IS_NODE_POWERED_DOWN || IS_NODE_POWERING_UP ||
/// IS_NODE_NO_RESPOND` -> `ESLURM_NODES_BUSY`), as opposed to a node that
/// is down/drained/future and will stay that way until an operator acts.
fn is_busy_wait_state(state: NodeState) -> bool {
    matches!(state, NodeState::PoweredDown | NodeState::PoweringUp | NodeState::NoRespond)
}

/// `avail = job.nodes ∩ system.up_nodes − exc_nodes`, feature-filtered,
/// per §4.3.2's opening definition.
fn available_nodes(
    job: &Job,
    registry: &HashMap<NodeIdx, Node>,
    req: &StepRequest,
) -> Vec<NodeIdx> {
    job.nodes
        .iter()
        .copied()
        .filter(|n| !req.exc_nodes.contains(n))
        .filter(|n| registry.get(n).map(|node| node.state.is_usable()).unwrap_or(false))
        .filter(|n| match &req.feature {
            None => true,
            Some(feature) => registry.get(n).map(|node| node.features.iter().any(|f| f == feature)).unwrap_or(false),
        })
        .collect()
}

/// Steps 1-5 of §4.3.2: per-node usable-CPU computation plus the reason
/// a node with zero usable CPUs is blocked.
fn usable_cpus_per_node(
    job: &Job,
    registry: &HashMap<NodeIdx, Node>,
    gres: &dyn GresAdvisor,
    req: &StepRequest,
    candidates: &[NodeIdx],
) -> (HashMap<NodeIdx, u32>, HashMap<NodeIdx, BlockReason>) {
    let overlap_force = req.flags.contains(StepFlags::OVERLAP_FORCE);
    let whole = req.flags.contains(StepFlags::WHOLE);

    let mut usable = HashMap::new();
    let mut blocked = HashMap::new();

    for &node_idx in candidates {
        let mut cpus = job.usable_cpus(node_idx, overlap_force, whole);

        if let MemSpec::PerCpu(mem_per_cpu) = req.pn_min_memory {
            if mem_per_cpu > 0 {
                let avail_mem = job.available_memory_mb(node_idx);
                let mem_bound = (avail_mem / mem_per_cpu) as u32;
                if mem_bound < cpus {
                    cpus = mem_bound;
                    if cpus == 0 {
                        blocked.insert(node_idx, BlockReason::Memory);
                    }
                }
            }
        }

        let gres_bound = gres.usable_cpus(node_idx, &req.gres);
        if gres_bound < cpus {
            cpus = gres_bound;
            if cpus == 0 {
                blocked.insert(node_idx, BlockReason::Gres);
            }
        }

        if let Some(ntasks_per_core) = req.ntasks_per_core {
            if let Some(node) = registry.get(&node_idx) {
                let core_bound = ntasks_per_core.saturating_mul(node.total_cores());
                cpus = cpus.min(core_bound);
            }
        }

        if cpus == 0 {
            blocked.entry(node_idx).or_insert(BlockReason::Cpu);
        }
        usable.insert(node_idx, cpus);
    }

    (usable, blocked)
}

pub fn pick_step_nodes(
    job: &Job,
    registry: &HashMap<NodeIdx, Node>,
    system_up: &HashSet<NodeIdx>,
    gres: &dyn GresAdvisor,
    req: &StepRequest,
) -> Result<NodePickOutcome, StepCreateError> {
    if req.flags.contains(StepFlags::OVERLAP_FORCE) && req.flags.contains(StepFlags::WHOLE) {
        return Err(StepCreateError::OverlapForceOnWholeStep);
    }

    let avail: Vec<NodeIdx> = available_nodes(job, registry, req).into_iter().filter(|n| system_up.contains(n)).collect();
    if avail.is_empty() {
        // Before declaring the request unsatisfiable outright, check
        // whether the reason every candidate dropped out is that it's
        // powered down, powering up, or simply hasn't responded yet --
        // all three resolve themselves without operator intervention, so
        // the caller should retry rather than give up (§8 boundary).
        let any_busy_wait = job
            .nodes
            .iter()
            .filter(|n| !req.exc_nodes.contains(n))
            .any(|n| registry.get(n).map(|node| is_busy_wait_state(node.state)).unwrap_or(false));
        if any_busy_wait {
            return Err(StepCreateError::NodesBusy);
        }
        return Err(if req.feature.is_some() { StepCreateError::FeatureNotActive } else { StepCreateError::NoNodes });
    }

    let (usable, blocked) = usable_cpus_per_node(job, registry, gres, req, &avail);

    let gres_deficit = blocked.values().filter(|r| **r == BlockReason::Gres).count() as u32;
    if gres_deficit > 0 {
        let min_nodes = req.min_nodes.unwrap_or(avail.len() as u32);
        let slack = (avail.len() as u32).saturating_sub(min_nodes);
        if gres_deficit > slack {
            return Err(StepCreateError::InvalidGres { deficit: gres_deficit, slack });
        }
    }

    if req.min_nodes.is_none() {
        // INFINITE: take all of avail regardless of current busy-ness.
        return Ok(NodePickOutcome { nodes: avail, usable_cpus: usable });
    }

    let min_nodes = req.min_nodes.unwrap();
    let max_nodes = req.max_nodes.unwrap_or(u32::MAX);

    let mut selected: Vec<NodeIdx> = Vec::new();
    let mut total_cpus = 0u32;

    if let Some(explicit) = &req.node_list {
        for &n in explicit {
            if !avail.contains(&n) {
                return Err(StepCreateError::NodesBusy);
            }
            selected.push(n);
            total_cpus += usable.get(&n).copied().unwrap_or(0);
        }
    } else {
        // Idle nodes (no other running step) round-robin starting at the
        // job's persistent cursor, so repeated small steps spread
        // themselves across the job's allocation.
        let start = (job.next_step_node_inx.get() as usize) % avail.len();
        let ordered: Vec<NodeIdx> = avail[start..].iter().chain(avail[..start].iter()).copied().collect();

        for n in ordered {
            if selected.len() as u32 >= max_nodes {
                break;
            }
            let is_idle = *job.cpus_used.get(&n).unwrap_or(&0) == 0;
            let cpus = usable.get(&n).copied().unwrap_or(0);
            if !is_idle || cpus == 0 {
                continue;
            }
            selected.push(n);
            total_cpus += cpus;
            if selected.len() as u32 >= min_nodes && total_cpus >= req.cpu_count {
                break;
            }
        }
        job.next_step_node_inx.set(((start + selected.len().max(1)) % avail.len()) as u32);
    }

    if (selected.len() as u32) < min_nodes || total_cpus < req.cpu_count {
        // Satisfiable in principle (structurally valid nodes exist) but
        // not right now: some node's CPUs are claimed by another step.
        return Err(StepCreateError::NodesBusy);
    }

    Ok(NodePickOutcome { nodes: selected, usable_cpus: usable })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gres::UnconstrainedGres;
    use crate::model::{Job, JobResources, JobState, Node, NodeState};
    use crate::request::StepRequest;
    use std::cell::Cell;

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
        let mut up = HashSet::new();
        for i in 0..n {
            let idx = NodeIdx(i);
            registry.insert(idx, node(i));
            nodes.push(idx);
            cpus_alloc.insert(idx, 8);
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
            job_resources: JobResources { cpus_alloc, mem_alloc_mb: HashMap::new(), core_bitmap: HashMap::new() },
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
    fn picks_enough_idle_nodes_for_cpu_count() {
        let (job, registry, up) = job_with_nodes(4);
        let req = StepRequest { cpu_count: 12, min_nodes: Some(1), max_nodes: Some(4), ..StepRequest::default() };
        let outcome = pick_step_nodes(&job, &registry, &up, &UnconstrainedGres, &req).unwrap();
        let total: u32 = outcome.nodes.iter().map(|n| outcome.usable_cpus[n]).sum();
        assert!(total >= 12);
    }

    #[test]
    fn busy_nodes_yield_nodes_busy() {
        let (mut job, registry, up) = job_with_nodes(2);
        job.cpus_used.insert(NodeIdx(0), 8);
        job.cpus_used.insert(NodeIdx(1), 8);
        let req = StepRequest { cpu_count: 4, min_nodes: Some(1), max_nodes: Some(2), ..StepRequest::default() };
        let result = pick_step_nodes(&job, &registry, &up, &UnconstrainedGres, &req);
        assert_eq!(result.unwrap_err(), StepCreateError::NodesBusy);
    }

    #[test]
    fn powered_down_nodes_yield_nodes_busy_not_no_nodes() {
        let (job, mut registry, up) = job_with_nodes(2);
        registry.get_mut(&NodeIdx(0)).unwrap().state = NodeState::PoweredDown;
        registry.get_mut(&NodeIdx(1)).unwrap().state = NodeState::NoRespond;
        let req = StepRequest::default();
        let result = pick_step_nodes(&job, &registry, &up, &UnconstrainedGres, &req);
        assert_eq!(result.unwrap_err(), StepCreateError::NodesBusy);
    }

    #[test]
    fn down_nodes_stay_no_nodes() {
        let (job, mut registry, up) = job_with_nodes(2);
        registry.get_mut(&NodeIdx(0)).unwrap().state = NodeState::Down;
        registry.get_mut(&NodeIdx(1)).unwrap().state = NodeState::Down;
        let req = StepRequest::default();
        let result = pick_step_nodes(&job, &registry, &up, &UnconstrainedGres, &req);
        assert_eq!(result.unwrap_err(), StepCreateError::NoNodes);
    }

    #[test]
    fn infinite_min_nodes_takes_everything() {
        let (job, registry, up) = job_with_nodes(3);
        let req = StepRequest { min_nodes: None, ..StepRequest::default() };
        let outcome = pick_step_nodes(&job, &registry, &up, &UnconstrainedGres, &req).unwrap();
        assert_eq!(outcome.nodes.len(), 3);
    }
}
