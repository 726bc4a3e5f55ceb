// The message bodies fixed by spec.md §6, and the `encode`/`decode`
// helpers every subsystem serializes them through. Bodies that embed a
// subsystem's own rich types (step layouts, credentials) are defined by
// that subsystem; this module only fixes the shapes the forwarder
// itself needs to reason about (fire-and-forget detection) plus the
// small signal/completion messages that don't belong to any one
// subsystem more than another.

use ridge_base::{err, Result, StepId};
use serde::{Deserialize, Serialize};

/// Encodes a wire body through MessagePack, the teacher's choice over
/// JSON for inter-node traffic (`submerge-net::lib.rs` does the same
/// `rmp_serde::to_vec` for its own `Msg` envelope). Every subsystem that
/// rides the forwarder serializes its body through here rather than
/// rolling its own encoder.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| err(format!("encode wire message: {e}")))
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(|e| err(format!("decode wire message: {e}")))
}

/// Tags a message with the routing behavior the forwarder needs to know
/// about before it can treat the message generically: whether a reply is
/// expected at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MsgKind {
    FileBcast,
    CancelJobStep,
    SignalTasks,
    TerminateTasks,
    KillTimelimit,
    StepComplete,
    JobStepCreate,
    RequestShutdown,
    RequestReconfigure,
}

impl MsgKind {
    /// REQUEST_SHUTDOWN and REQUEST_RECONFIGURE are fire-and-forget: the
    /// forwarder enumerates every descendant as unconditionally
    /// acknowledged and never attempts a read.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, MsgKind::RequestShutdown | MsgKind::RequestReconfigure)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignalMsg {
    pub step_id: StepId,
    pub signal: i32,
    pub flags: u32,
    pub uid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillTimelimitMsg {
    pub step_id: StepId,
    pub uid: u32,
    pub start_time: i64,
    pub state: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAcctStats {
    pub max_rss_kb: u64,
    pub cpu_time_ms: u64,
    pub energy_joules: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompleteMsg {
    pub step_id: StepId,
    pub range_first: u32,
    pub range_last: u32,
    pub exit_code: i32,
}
