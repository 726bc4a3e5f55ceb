// Live bitmaps rebuilt at reconfigure time (spec.md §4.6 step 1/2:
// "snapshot the old node table… rebuild static tables"). These are the
// `up`/`idle`/`completing`/`down` bitmaps the real controller keeps
// alongside the node table for O(1) scheduler queries; a reconfigure has
// to throw them away and rebuild from the freshly loaded node states
// because a node's index can shift composition (though never its own
// index, per §3) when dynamic nodes are appended or removed nodes leave
// gaps.

use ridge_base::Bitmap;
use ridge_step::{Node, NodeState};

use crate::tables::NodeTable;

#[derive(Clone, Debug)]
pub struct StateBitmaps {
    pub up: Bitmap,
    pub idle: Bitmap,
    pub completing: Bitmap,
    pub down: Bitmap,
}

fn is_down(state: NodeState) -> bool {
    matches!(state, NodeState::Down | NodeState::NoRespond)
}

impl StateBitmaps {
    pub fn build(nodes: &NodeTable) -> Self {
        let len = nodes.iter().map(|n| n.idx.0 as usize + 1).max().unwrap_or(0);
        let mut up = Bitmap::new(len);
        let mut idle = Bitmap::new(len);
        let mut completing = Bitmap::new(len);
        let mut down = Bitmap::new(len);
        for node in nodes.iter() {
            let i = node.idx.0 as usize;
            classify_node(node, &mut up, &mut idle, &mut completing, &mut down, i);
        }
        StateBitmaps { up, idle, completing, down }
    }
}

fn classify_node(node: &Node, up: &mut Bitmap, idle: &mut Bitmap, completing: &mut Bitmap, down: &mut Bitmap, i: usize) {
    if node.state.is_usable() {
        up.set(i, true);
    }
    if node.state == NodeState::UpIdle {
        idle.set(i, true);
    }
    if node.state == NodeState::Completing {
        completing.set(i, true);
    }
    if is_down(node.state) {
        down.set(i, true);
    }
}
