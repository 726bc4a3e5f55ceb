// Step-create request fields (spec.md §4.3.1). Only the fields the
// allocator, core-selector, and accounting paths actually branch on are
// modeled as typed fields; ones that only ever pass through to the
// credential or to a node agent (container id, resv-port count, cpu
// frequency hints) are kept as plain optional scalars.

use ridge_base::NodeIdx;

use crate::gres::GresRequest;
use crate::model::{StepFlags, TaskDist, TaskDistNode, TaskDistSocket};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemSpec {
    PerNode(u64),
    PerCpu(u64),
}

impl Default for MemSpec {
    fn default() -> Self {
        MemSpec::PerNode(0)
    }
}

#[derive(Clone, Debug)]
pub struct StepRequest {
    /// `None` encodes spec.md's `INFINITE` ("all of job's nodes").
    pub min_nodes: Option<u32>,
    pub max_nodes: Option<u32>,
    pub num_tasks: u32,
    pub cpu_count: u32,
    pub cpus_per_task: u32,
    pub pn_min_memory: MemSpec,
    pub node_list: Option<Vec<NodeIdx>>,
    pub exc_nodes: Vec<NodeIdx>,
    pub feature: Option<String>,
    pub relative: Option<u32>,
    pub task_dist: TaskDist,
    pub plane_size: Option<u32>,
    pub threads_per_core: Option<u32>,
    pub ntasks_per_core: Option<u32>,
    pub ntasks_per_tres: Option<u32>,
    pub gres: Vec<GresRequest>,
    pub cpu_freq: Option<u32>,
    pub container_id: Option<String>,
    pub step_id: Option<u32>,
    pub resv_port_count: Option<u32>,
    pub timeout_ms: u32,
    pub flags: StepFlags,
}

impl Default for StepRequest {
    fn default() -> Self {
        StepRequest {
            min_nodes: Some(1),
            max_nodes: None,
            num_tasks: 1,
            cpu_count: 1,
            cpus_per_task: 1,
            pn_min_memory: MemSpec::default(),
            node_list: None,
            exc_nodes: Vec::new(),
            feature: None,
            relative: None,
            task_dist: TaskDist { node: TaskDistNode::Block, socket: TaskDistSocket::SockBlock },
            plane_size: None,
            threads_per_core: None,
            ntasks_per_core: None,
            ntasks_per_tres: None,
            gres: Vec::new(),
            cpu_freq: None,
            container_id: None,
            step_id: None,
            resv_port_count: None,
            timeout_ms: 10_000,
            flags: StepFlags::empty(),
        }
    }
}
