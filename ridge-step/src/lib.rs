mod accounting;
mod complete;
mod core_select;
mod create;
mod credential;
mod errors;
mod gres;
mod hetjob;
mod layout;
mod model;
mod pending;
mod pick;
mod request;
mod special;
mod timelimit;

pub use accounting::{allocate_step, release_step, AccountingError, NodeAllocation};
pub use complete::{finish_step, step_partial_comp, step_signal, AcctStats, PartialCompOutcome, PartialCompResult, SignalOutcome};
pub use core_select::{cores_needed, select_cores_for_node};
pub use create::{create_regular_step, CreateStepError};
pub use credential::{build_credential_args, issue_credential, CredentialArgs, CredentialSigner};
pub use errors::{HetJobError, StepCreateError};
pub use gres::{FixedGres, GresAdvisor, GresRequest, UnconstrainedGres};
pub use hetjob::{resolve_het_groups, HetJobGroup, OrphanedComponent};
pub use layout::{build_step_layout, LayoutError};
pub use model::{
    GresInventory, Job, JobResources, JobState, Node, NodeState, PartitionFlags, PendingContact, PreemptMode, Step, StepFlags,
    StepNodeLayout, TaskDist, TaskDistNode, TaskDistSocket,
};
pub use model::Partition;
pub use pending::{PendingQueue, PendingStep, DEFAULT_STEP_RETRY_COUNT, DEFAULT_STEP_RETRY_TIME};
pub use pick::{pick_step_nodes, BlockReason, NodePickOutcome};
pub use request::{MemSpec, StepRequest};
pub use special::{build_special_step, is_invisible_to_node_picking, SpecialKind};
pub use timelimit::{check_step_timelimit, KillTimelimitMsg};
