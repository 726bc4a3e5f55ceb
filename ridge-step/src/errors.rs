// Step-create/hetjob outcomes kept as distinct enums so a caller at the
// RPC boundary can match on the specific reason, per spec.md §4.3.2/§9.
// They convert into `ridge_base::Error` only when a caller doesn't care
// which variant it got.

use ridge_base::err;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepCreateError {
    /// No node satisfies the request even with unlimited waiting.
    NoNodes,
    /// Satisfiable, but not right now; caller should park a pending-step
    /// placeholder (§4.3.5).
    NodesBusy,
    PortsBusy,
    InterconnectBusy,
    /// `_pick_step_nodes`'s GRES-deficit terminal check (§4.3.2): the
    /// shortfall exceeds the number of nodes the request can still give
    /// up and stay within `min_nodes`.
    InvalidGres { deficit: u32, slack: u32 },
    FeatureNotActive,
    /// WHOLE implies exclusive access to every core the job owns on a
    /// node; combining it with OVERLAP_FORCE is a user error rather than
    /// an ambiguity the allocator should silently resolve (§9 open
    /// question).
    OverlapForceOnWholeStep,
}

impl std::fmt::Display for StepCreateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepCreateError::NoNodes => write!(f, "no nodes satisfy the step request"),
            StepCreateError::NodesBusy => write!(f, "nodes busy"),
            StepCreateError::PortsBusy => write!(f, "ports busy"),
            StepCreateError::InterconnectBusy => write!(f, "interconnect busy"),
            StepCreateError::InvalidGres { deficit, slack } => {
                write!(f, "invalid gres request: deficit {deficit} exceeds available slack {slack}")
            }
            StepCreateError::FeatureNotActive => write!(f, "requested feature not active on any candidate node"),
            StepCreateError::OverlapForceOnWholeStep => write!(f, "OVERLAP_FORCE is incompatible with a WHOLE step"),
        }
    }
}

impl std::error::Error for StepCreateError {}

impl StepCreateError {
    /// True for the three outcomes that warrant a pending-step
    /// placeholder rather than an outright rejection (§4.3.5).
    pub fn should_enqueue_pending(&self) -> bool {
        matches!(self, StepCreateError::NodesBusy | StepCreateError::PortsBusy | StepCreateError::InterconnectBusy)
    }
}

impl From<StepCreateError> for ridge_base::Error {
    fn from(e: StepCreateError) -> ridge_base::Error {
        err(e.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HetJobError {
    /// A component job found no leader, or the leader's component set
    /// is missing members; per §9 this aborts the whole hetjob rather
    /// than just the orphaned component.
    IncompleteComponentSet,
}

impl std::fmt::Display for HetJobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HetJobError::IncompleteComponentSet => write!(f, "heterogeneous job component set is incomplete"),
        }
    }
}

impl std::error::Error for HetJobError {}

impl From<HetJobError> for ridge_base::Error {
    fn from(e: HetJobError) -> ridge_base::Error {
        err(e.to_string())
    }
}
