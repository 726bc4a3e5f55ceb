use rapidhash::RapidHashMap;
use ridge_base::NodeIdx;

/// Everything the forwarder and transport need to know about a node in
/// order to address it: its transport address, the protocol version its
/// agent speaks, and when it was last heard from. This is the minimal
/// concrete stand-in for address resolution -- a real deployment would
/// resolve through DNS or a cached table maintained by the controller's
/// node table (§3); that table is `ridge-step`'s `NodeTable`, which keeps
/// its own richer `NodeRecord`-like entries. This directory exists so
/// `ridge-net` and `ridge-bcast` can be exercised without depending on
/// `ridge-step`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub idx: NodeIdx,
    pub address: String,
    pub protocol_version: u16,
}

#[derive(Clone, Debug, Default)]
pub struct NodeDirectory {
    by_name: RapidHashMap<String, NodeRecord>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        NodeDirectory { by_name: RapidHashMap::default() }
    }

    pub fn insert(&mut self, name: impl Into<String>, record: NodeRecord) {
        self.by_name.insert(name.into(), record);
    }

    pub fn resolve(&self, name: &str) -> Option<&NodeRecord> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_and_resolve() {
        let mut dir = NodeDirectory::new();
        dir.insert("n0", NodeRecord { idx: NodeIdx(0), address: "10.0.0.1:6818".into(), protocol_version: 1 });
        assert_eq!(dir.resolve("n0").unwrap().address, "10.0.0.1:6818");
        assert!(dir.resolve("n1").is_none());
    }
}
