// Hierarchical RPC forwarder, the wire-message contract of the control
// plane (§6), and a small node directory. Every other subsystem that
// needs to talk to node agents -- the step manager signalling a step, the
// broadcast agent streaming file blocks -- goes through `forward` here
// rather than opening its own connections.

mod directory;
mod forward;
mod transport;
pub mod wire;

pub use directory::{NodeDirectory, NodeRecord};
pub use forward::{
    forward, mark_as_failed_forward, ForwardError, ReplyItem, ReplyList, ReplyPayload,
};
pub use transport::{InProcessTransport, NodeBehavior, Transport, TransportFailure};
