// Job/node/partition/step data model (spec.md §3). Node/partition
// records are populated by `ridge-ctld`'s reconciler; `ridge-step` only
// needs read/write access to the fields the allocator and accounting
// paths touch.

use std::cell::Cell;
use std::collections::HashMap;

use bitflags::bitflags;
use ridge_base::{Bitmap, JobId, NodeIdx, StepId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    UpIdle,
    Allocated,
    Mixed,
    Down,
    Drain,
    Future,
    Cloud,
    PoweredDown,
    PoweringUp,
    PoweringDown,
    NoRespond,
    RebootRequested,
    RebootIssued,
    Completing,
}

impl NodeState {
    pub fn is_usable(&self) -> bool {
        matches!(self, NodeState::UpIdle | NodeState::Allocated | NodeState::Mixed | NodeState::Completing)
    }
}

#[derive(Clone, Debug)]
pub struct GresInventory {
    pub name: String,
    pub count: u32,
    /// Cores this device is affined to, if the device is core-bound.
    pub affined_cores: Option<Bitmap>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub idx: NodeIdx,
    pub name: String,
    pub address: String,
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
    pub real_memory_mb: u64,
    pub state: NodeState,
    pub features: Vec<String>,
    pub gres: Vec<GresInventory>,
    pub last_response: i64,
    pub protocol_version: u16,
}

impl Node {
    pub fn total_cores(&self) -> u32 {
        self.sockets * self.cores_per_socket
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PartitionFlags: u32 {
        const HIDDEN = 1 << 0;
        const ROOT_ONLY = 1 << 1;
        const NO_ROOT = 1 << 2;
        const EXCLUSIVE_USER = 1 << 3;
        const REQ_RESV = 1 << 4;
        const LLN = 1 << 5;
        const DEFAULT = 1 << 6;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PreemptMode {
    Off,
    Suspend,
    Requeue,
    Cancel,
}

#[derive(Clone, Debug)]
pub struct Partition {
    pub name: String,
    pub nodes: Vec<NodeIdx>,
    pub flags: PartitionFlags,
    pub priority: i32,
    pub preempt_mode: PreemptMode,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub min_time_minutes: Option<u32>,
    pub max_time_minutes: Option<u32>,
    pub qos_allow: Vec<String>,
    pub qos_deny: Vec<String>,
    pub account_allow: Vec<String>,
    pub account_deny: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Pending,
    Running,
    Completing,
    Completed,
    Failed,
    Cancelled,
    NodeFail,
    Timeout,
}

/// What the job currently owns on each node it was allocated, and how
/// much of that is claimed by running steps. The two halves (`_alloc`
/// and `_used`) are kept as separate maps rather than folded into one
/// struct per node because accounting only ever touches the `_used`
/// side and a lock-free read of `_alloc` must stay stable underneath.
#[derive(Clone, Debug, Default)]
pub struct JobResources {
    pub cpus_alloc: HashMap<NodeIdx, u32>,
    pub mem_alloc_mb: HashMap<NodeIdx, u64>,
    pub core_bitmap: HashMap<NodeIdx, Bitmap>,
}

#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub uid: u32,
    pub gid: u32,
    pub array_task_id: Option<u32>,
    pub het_job_id: Option<JobId>,
    pub het_job_offset: Option<u32>,
    pub state: JobState,
    pub partition: String,
    pub nodes: Vec<NodeIdx>,
    pub job_resources: JobResources,
    pub cpus_used: HashMap<NodeIdx, u32>,
    pub memory_used_mb: HashMap<NodeIdx, u64>,
    pub core_bitmap_used: HashMap<NodeIdx, Bitmap>,
    pub steps: Vec<Step>,
    /// Cursor state under interior mutability: both fields are only ever
    /// touched while the caller holds the job under a write lock (§5),
    /// so the `Cell` itself provides no synchronization -- the lock does.
    pub next_step_id: Cell<u32>,
    pub next_step_node_inx: Cell<u32>,
    pub end_time: i64,
    pub start_time: i64,
    pub tot_suspend_time: i64,
}

impl Job {
    pub fn alloc_next_step_id(&self) -> u32 {
        let id = self.next_step_id.get();
        self.next_step_id.set(id + 1);
        id
    }

    pub fn usable_cpus(&self, node: NodeIdx, overlap_force: bool, whole: bool) -> u32 {
        let alloc = *self.job_resources.cpus_alloc.get(&node).unwrap_or(&0);
        let used = *self.cpus_used.get(&node).unwrap_or(&0);
        if overlap_force {
            alloc
        } else if whole {
            if used > 0 {
                0
            } else {
                alloc
            }
        } else {
            alloc.saturating_sub(used)
        }
    }

    pub fn available_memory_mb(&self, node: NodeIdx) -> u64 {
        let alloc = *self.job_resources.mem_alloc_mb.get(&node).unwrap_or(&0);
        let used = *self.memory_used_mb.get(&node).unwrap_or(&0);
        alloc.saturating_sub(used)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct StepFlags: u32 {
        const OVERLAP_FORCE = 1 << 0;
        const WHOLE = 1 << 1;
        const OVERCOMMIT = 1 << 2;
        const EXCLUSIVE = 1 << 3;
        const MEM_ZERO = 1 << 4;
        const NO_KILL = 1 << 5;
        const NO_SIG_FAIL = 1 << 6;
        const INTERACTIVE = 1 << 7;
        const EXT_LAUNCHER = 1 << 8;
        const PENDING = 1 << 9;
        const KILL_OOM = 1 << 10;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskDistNode {
    Block,
    Cyclic,
    Plane,
    Arbitrary,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskDistSocket {
    SockBlock,
    SockCFull,
    SockCyclic,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaskDist {
    pub node: TaskDistNode,
    pub socket: TaskDistSocket,
}

#[derive(Clone, Debug)]
pub struct StepNodeLayout {
    pub node: NodeIdx,
    pub num_tasks: u32,
    pub cpus_per_task: u32,
}

/// A pending-step placeholder's contact info, set only when
/// `step_id == StepId::Pending` (§4.3.5).
#[derive(Clone, Debug)]
pub struct PendingContact {
    pub host: String,
    pub port: u16,
    pub queued_at: i64,
}

#[derive(Clone, Debug)]
pub struct Step {
    pub step_id: StepId,
    pub het_job_offset: Option<u32>,
    pub layout: Vec<StepNodeLayout>,
    pub mem_per_node_mb: HashMap<NodeIdx, u64>,
    pub core_bitmap_job: HashMap<NodeIdx, Bitmap>,
    pub credential: Option<Vec<u8>>,
    pub gres: Vec<String>,
    pub flags: StepFlags,
    pub exit_node_bitmap: Bitmap,
    pub time_limit_minutes: Option<u32>,
    pub cpu_freq: Option<u32>,
    pub start_time: i64,
    pub uid: u32,
    pub pending_contact: Option<PendingContact>,
}

impl Step {
    pub fn is_special(&self) -> bool {
        self.step_id.is_special()
    }

    pub fn node_count(&self) -> usize {
        self.layout.len()
    }
}
