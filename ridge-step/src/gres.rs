// GRES (generic resource) slack is modeled as a trait rather than a
// concrete plugin system: spec.md treats "ask the GRES sub-system how
// many CPUs this node can still host" (§4.3.2 step 3) as an external
// collaborator, same as credential signing (§4.4) and library listing
// (`ridge-bcast`). `UnconstrainedGres` is the default used wherever a
// caller doesn't care about GRES at all; `FixedGres` is a small
// in-memory table good enough for tests.

use std::collections::HashMap;

use ridge_base::NodeIdx;

#[derive(Clone, Debug, Default)]
pub struct GresRequest {
    pub name: String,
    pub count_per_node: u32,
}

pub trait GresAdvisor {
    /// How many CPUs on `node` the GRES subsystem still permits this
    /// step to use, given `request`. Returning `u32::MAX` means
    /// unconstrained.
    fn usable_cpus(&self, node: NodeIdx, request: &[GresRequest]) -> u32;

    /// Cores on `node` affined to any of `request`'s devices, used to
    /// build the three-tier preference order in core selection
    /// (§4.3.3).
    fn affined_cores(&self, node: NodeIdx, request: &[GresRequest]) -> ridge_base::Bitmap;
}

pub struct UnconstrainedGres;

impl GresAdvisor for UnconstrainedGres {
    fn usable_cpus(&self, _node: NodeIdx, _request: &[GresRequest]) -> u32 {
        u32::MAX
    }

    fn affined_cores(&self, _node: NodeIdx, _request: &[GresRequest]) -> ridge_base::Bitmap {
        ridge_base::Bitmap::new(0)
    }
}

#[derive(Default)]
pub struct FixedGres {
    pub usable_cpus: HashMap<NodeIdx, u32>,
    pub affined: HashMap<NodeIdx, ridge_base::Bitmap>,
}

impl GresAdvisor for FixedGres {
    fn usable_cpus(&self, node: NodeIdx, _request: &[GresRequest]) -> u32 {
        self.usable_cpus.get(&node).copied().unwrap_or(u32::MAX)
    }

    fn affined_cores(&self, node: NodeIdx, _request: &[GresRequest]) -> ridge_base::Bitmap {
        self.affined.get(&node).cloned().unwrap_or_else(|| ridge_base::Bitmap::new(0))
    }
}
