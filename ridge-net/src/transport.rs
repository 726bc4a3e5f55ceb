// The forwarder's only external collaborator: something that can hand a
// message to one node and report what came back. `InProcessTransport`
// simulates an entire fleet of node agents in one process, recursively
// re-entering `forward` for a node's residual hostlist exactly the way a
// real node agent would -- just without a second machine involved.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::forward::{forward, ReplyPayload, ECONNREFUSED, EHOSTUNREACH};
use crate::wire::MsgKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportFailure {
    AddressResolve(i32),
    Socket(i32),
    Timeout,
}

pub trait Transport {
    /// Deliver `body` to `node`. If `residual` is non-empty, the node is
    /// expected to continue the tree construction for those names at the
    /// same `fanout` and return its own reply plus everything its
    /// subtree collects, each tagged with the name that produced it.
    fn deliver(
        &self,
        node: &str,
        kind: MsgKind,
        body: &[u8],
        residual: &[String],
        fanout: usize,
        timeout: Duration,
    ) -> Result<Vec<(String, Vec<u8>)>, TransportFailure>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeBehavior {
    Respond,
    AddressDown,
    RefuseSocket,
    Hang,
}

/// A fixed-behavior fleet used by tests and by `ridge-bcast`'s own test
/// suite. Every node defaults to `Respond`.
pub struct InProcessTransport {
    behaviors: Mutex<HashMap<String, NodeBehavior>>,
}

impl InProcessTransport {
    pub fn all_respond(nodes: &[String]) -> Self {
        let behaviors = nodes.iter().map(|n| (n.clone(), NodeBehavior::Respond)).collect();
        InProcessTransport { behaviors: Mutex::new(behaviors) }
    }

    pub fn set_behavior(&mut self, node: &str, behavior: NodeBehavior) {
        self.behaviors.get_mut().unwrap().insert(node.to_string(), behavior);
    }

    fn behavior_of(&self, node: &str) -> NodeBehavior {
        self.behaviors.lock().unwrap().get(node).copied().unwrap_or(NodeBehavior::Respond)
    }
}

impl Transport for InProcessTransport {
    fn deliver(
        &self,
        node: &str,
        kind: MsgKind,
        body: &[u8],
        residual: &[String],
        fanout: usize,
        timeout: Duration,
    ) -> Result<Vec<(String, Vec<u8>)>, TransportFailure> {
        match self.behavior_of(node) {
            NodeBehavior::AddressDown => return Err(TransportFailure::AddressResolve(EHOSTUNREACH)),
            NodeBehavior::RefuseSocket => return Err(TransportFailure::Socket(ECONNREFUSED)),
            NodeBehavior::Hang => {
                std::thread::sleep(timeout + Duration::from_millis(2));
                return Err(TransportFailure::Timeout);
            }
            NodeBehavior::Respond => {}
        }

        let mut out = vec![(node.to_string(), body.to_vec())];
        if !residual.is_empty() {
            let sub_replies = forward(self, residual, kind, body, fanout, Duration::from_millis(0), timeout);
            for r in sub_replies {
                match r.payload {
                    ReplyPayload::Ok(bytes) => out.push((r.node, bytes)),
                    ReplyPayload::Ack => out.push((r.node, Vec::new())),
                    // A descendant that failed within its own subtree is
                    // simply absent from this node's aggregated reply;
                    // the parent worker's reply-count check re-derives
                    // and marks it failed on the way back up.
                    ReplyPayload::Failed { .. } => {}
                }
            }
        }
        Ok(out)
    }
}
