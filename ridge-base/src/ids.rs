use serde::{Deserialize, Serialize};

/// Dense index into the node table. Assigned once at load time and never
/// reassigned for the life of the process; nodes appended after a reload
/// keep the index they were given the first time they were seen.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeIdx(pub u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct JobId(pub u32);

/// A plain numbered step, or one of the four special steps that bypass
/// the normal node-picking allocator entirely.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum StepId {
    Id(u32),
    /// The job's batch-shell step.
    BatchScript,
    /// Container for externally-launched processes (PAM/SSH).
    ExternCont,
    /// Placeholder for an interactive (`salloc`-style) session.
    InteractiveStep,
    /// A deferred step-create request parked awaiting resources.
    Pending,
}

impl StepId {
    /// True for the four steps that never count against job used-counters
    /// and must stay invisible to the "idle nodes for step placement" scan.
    pub fn is_special(&self) -> bool {
        !matches!(self, StepId::Id(_))
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepId::Id(n) => write!(f, "{n}"),
            StepId::BatchScript => write!(f, "batch"),
            StepId::ExternCont => write!(f, "extern"),
            StepId::InteractiveStep => write!(f, "interactive"),
            StepId::Pending => write!(f, "pending"),
        }
    }
}

/// A step id tagged with which component of a heterogeneous job it
/// belongs to, if any.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct StepIdent {
    pub step_id: StepId,
    pub het_job_offset: Option<u32>,
}
