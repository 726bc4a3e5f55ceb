// The node table (§3): a dense-indexed node list plus a name→index hash,
// with the invariant that an index assigned at load time never changes
// for the life of the process, and a node appended dynamically after a
// reload keeps whatever index it was first given.

use std::collections::HashMap;

use ridge_base::NodeIdx;
use ridge_step::{Node, Partition};

#[derive(Debug, Default)]
pub struct NodeTable {
    by_name: HashMap<String, NodeIdx>,
    nodes: Vec<Option<Node>>,
}

impl NodeTable {
    pub fn new() -> Self {
        NodeTable::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx.0 as usize).and_then(|n| n.as_ref())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Node> {
        self.by_name.get(name).and_then(|&idx| self.get(idx))
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIdx> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|n| n.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|n| n.name.as_str())
    }

    /// Inserts `node` (whose `idx` field is ignored on input), reusing
    /// the index already on file for its name if one exists, or
    /// appending a fresh one otherwise. Returns the index actually used.
    pub fn insert_or_update(&mut self, mut node: Node) -> NodeIdx {
        if let Some(&idx) = self.by_name.get(&node.name) {
            node.idx = idx;
            self.nodes[idx.0 as usize] = Some(node);
            return idx;
        }
        let idx = NodeIdx(self.nodes.len() as u32);
        node.idx = idx;
        self.by_name.insert(node.name.clone(), idx);
        self.nodes.push(Some(node));
        idx
    }

    /// Builds a fresh table from a config-parsed node list, one pass.
    /// Every node gets a newly assigned index in sorted-name order; this
    /// is only correct for a from-scratch load. Reconfigure against a
    /// live table must go node-by-node through `insert_or_update` so
    /// existing nodes keep their index (see `reconfigure.rs`).
    pub fn from_fresh_load(nodes: Vec<Node>) -> Self {
        let mut table = NodeTable::new();
        for node in nodes {
            table.insert_or_update(node);
        }
        table
    }
}

#[derive(Debug, Default)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
}

impl PartitionTable {
    pub fn new(partitions: Vec<Partition>) -> Self {
        PartitionTable { partitions }
    }

    pub fn find(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn default_partition(&self) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.flags.contains(ridge_step::PartitionFlags::DEFAULT))
    }

    pub fn default_partition_name(&self) -> Option<&str> {
        self.default_partition().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ridge_step::NodeState;

    fn node(name: &str) -> Node {
        Node {
            idx: NodeIdx(0),
            name: name.to_string(),
            address: name.to_string(),
            sockets: 1,
            cores_per_socket: 4,
            threads_per_core: 1,
            real_memory_mb: 1024,
            state: NodeState::UpIdle,
            features: Vec::new(),
            gres: Vec::new(),
            last_response: 0,
            protocol_version: 1,
        }
    }

    #[test]
    fn reinserting_a_known_name_keeps_its_index() {
        let mut table = NodeTable::new();
        let idx0 = table.insert_or_update(node("n0"));
        let idx1 = table.insert_or_update(node("n1"));
        assert_ne!(idx0, idx1);
        // Simulate a reconfigure that re-describes n0: same name, must
        // keep idx0.
        let mut updated = node("n0");
        updated.real_memory_mb = 2048;
        let reused = table.insert_or_update(updated);
        assert_eq!(reused, idx0);
        assert_eq!(table.get(idx0).unwrap().real_memory_mb, 2048);
    }

    #[test]
    fn dynamic_append_gets_a_fresh_index_past_the_load_time_set() {
        let mut table = NodeTable::from_fresh_load(vec![node("n0"), node("n1")]);
        let appended = table.insert_or_update(node("n2"));
        assert_eq!(appended, NodeIdx(2));
    }
}
