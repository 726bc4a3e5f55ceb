// Regular-step task layout (spec.md §4.3.3, §8 scenario 1). `pick.rs`
// decides which nodes a step gets; this module decides how many of
// `request.num_tasks` land on each of those nodes, per `task_dist.node`
// and `plane_size`, the same split the original draws between node
// selection (`_pick_step_nodes`) and layout (`step_layout_create`).

use std::collections::HashMap;

use ridge_base::NodeIdx;

use crate::model::{StepNodeLayout, TaskDistNode};
use crate::request::StepRequest;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LayoutError {
    /// Arbitrary distribution is driven entirely by the node list's
    /// repeat structure; there has to be at least one node to assign
    /// tasks to.
    EmptyNodeList,
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::EmptyNodeList => write!(f, "no nodes to lay tasks out on"),
        }
    }
}

impl std::error::Error for LayoutError {}

impl From<LayoutError> for ridge_base::Error {
    fn from(e: LayoutError) -> ridge_base::Error {
        ridge_base::err(e.to_string())
    }
}

/// spec.md §8 boundary: `cpus_per_task=0, num_tasks=N, cpu_count=N` →
/// cpus_per_task coerced to 1. A request never actually wants zero CPUs
/// per task; it means the caller left the field unset and one CPU per
/// task is what every other distribution path already assumes.
fn effective_cpus_per_task(req: &StepRequest) -> u32 {
    if req.cpus_per_task == 0 {
        1
    } else {
        req.cpus_per_task
    }
}

/// Assigns `req.num_tasks` tasks across `nodes` (the nodes `pick_step_nodes`
/// selected, in its order) according to `req.task_dist.node`, then
/// multiplies each node's task count by `cpus_per_task` to get the layout
/// `accounting` and `core_select` consume.
///
/// Block and cyclic produce the same per-node task *counts* here --
/// without per-task identity this representation can't show the
/// contiguous-vs-round-robin order the two distribute tasks in, only how
/// many land on each node, and that count is identical for both. Plane
/// differs because it groups tasks in batches of `plane_size` before
/// advancing to the next node, which changes how the remainder falls.
/// Arbitrary ignores `num_tasks` and `task_dist` entirely: it reads the
/// task count straight off how many times each node repeats in `nodes`,
/// which is how an explicit arbitrary node list expresses per-node task
/// counts in the first place.
pub fn build_step_layout(nodes: &[NodeIdx], req: &StepRequest) -> Result<Vec<StepNodeLayout>, LayoutError> {
    if nodes.is_empty() {
        return Err(LayoutError::EmptyNodeList);
    }
    let cpus_per_task = effective_cpus_per_task(req);

    if req.task_dist.node == TaskDistNode::Arbitrary {
        return Ok(arbitrary_counts(nodes).into_iter().map(|(node, num_tasks)| StepNodeLayout { node, num_tasks, cpus_per_task }).collect());
    }

    let counts = match req.task_dist.node {
        TaskDistNode::Block | TaskDistNode::Cyclic => even_counts(nodes.len(), req.num_tasks),
        TaskDistNode::Plane => plane_counts(nodes.len(), req.num_tasks, req.plane_size.unwrap_or(1).max(1)),
        TaskDistNode::Arbitrary => unreachable!("handled above"),
    };

    Ok(nodes
        .iter()
        .zip(counts)
        .filter(|(_, num_tasks)| *num_tasks > 0)
        .map(|(&node, num_tasks)| StepNodeLayout { node, num_tasks, cpus_per_task })
        .collect())
}

/// `num_tasks` split as evenly as possible across `node_count` nodes, the
/// first `num_tasks % node_count` of them taking one extra task.
fn even_counts(node_count: usize, num_tasks: u32) -> Vec<u32> {
    let node_count = node_count as u32;
    let base = num_tasks / node_count;
    let rem = num_tasks % node_count;
    (0..node_count).map(|i| base + u32::from(i < rem)).collect()
}

/// Tasks dealt in batches of `plane_size`, cycling through nodes: task
/// `t` lands on node `(t / plane_size) % node_count`.
fn plane_counts(node_count: usize, num_tasks: u32, plane_size: u32) -> Vec<u32> {
    let mut counts = vec![0u32; node_count];
    for t in 0..num_tasks {
        let node_i = ((t / plane_size) as usize) % node_count;
        counts[node_i] += 1;
    }
    counts
}

/// Counts how many times each node repeats in `nodes`, preserving the
/// order of first appearance.
fn arbitrary_counts(nodes: &[NodeIdx]) -> Vec<(NodeIdx, u32)> {
    let mut order: Vec<NodeIdx> = Vec::new();
    let mut counts: HashMap<NodeIdx, u32> = HashMap::new();
    for &n in nodes {
        *counts.entry(n).or_insert_with(|| {
            order.push(n);
            0
        }) += 1;
    }
    order.into_iter().map(|n| (n, counts[&n])).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{TaskDist, TaskDistSocket};

    fn nodes(n: u32) -> Vec<NodeIdx> {
        (0..n).map(NodeIdx).collect()
    }

    #[test]
    fn basic_layout_splits_evenly_across_four_nodes() {
        // spec.md §8 scenario 1: 4 nodes, num_tasks=8, cpus_per_task=1.
        let req = StepRequest { num_tasks: 8, cpus_per_task: 1, task_dist: TaskDist { node: TaskDistNode::Block, socket: TaskDistSocket::SockBlock }, ..StepRequest::default() };
        let layout = build_step_layout(&nodes(4), &req).unwrap();
        assert_eq!(layout.len(), 4);
        for l in &layout {
            assert_eq!(l.num_tasks, 2);
            assert_eq!(l.cpus_per_task, 1);
        }
    }

    #[test]
    fn cpus_per_task_zero_coerces_to_one() {
        let req = StepRequest { num_tasks: 4, cpus_per_task: 0, cpu_count: 4, ..StepRequest::default() };
        let layout = build_step_layout(&nodes(4), &req).unwrap();
        assert!(layout.iter().all(|l| l.cpus_per_task == 1));
    }

    #[test]
    fn remainder_goes_to_earlier_nodes() {
        let req = StepRequest { num_tasks: 10, cpus_per_task: 1, ..StepRequest::default() };
        let layout = build_step_layout(&nodes(4), &req).unwrap();
        let counts: Vec<u32> = layout.iter().map(|l| l.num_tasks).collect();
        assert_eq!(counts, vec![3, 3, 2, 2]);
    }

    #[test]
    fn plane_groups_tasks_in_plane_size_batches_per_node() {
        let req = StepRequest {
            num_tasks: 6,
            cpus_per_task: 1,
            task_dist: TaskDist { node: TaskDistNode::Plane, socket: TaskDistSocket::SockBlock },
            plane_size: Some(2),
            ..StepRequest::default()
        };
        let layout = build_step_layout(&nodes(3), &req).unwrap();
        // tasks 0,1 -> node0; 2,3 -> node1; 4,5 -> node2.
        assert_eq!(layout.iter().map(|l| l.num_tasks).collect::<Vec<_>>(), vec![2, 2, 2]);
    }

    #[test]
    fn arbitrary_reads_counts_from_node_list_repeats() {
        let req = StepRequest { cpus_per_task: 1, task_dist: TaskDist { node: TaskDistNode::Arbitrary, socket: TaskDistSocket::SockBlock }, ..StepRequest::default() };
        let explicit = vec![NodeIdx(0), NodeIdx(0), NodeIdx(1)];
        let layout = build_step_layout(&explicit, &req).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].node, NodeIdx(0));
        assert_eq!(layout[0].num_tasks, 2);
        assert_eq!(layout[1].node, NodeIdx(1));
        assert_eq!(layout[1].num_tasks, 1);
    }

    #[test]
    fn empty_node_list_is_an_error() {
        let req = StepRequest::default();
        assert_eq!(build_step_layout(&[], &req).unwrap_err(), LayoutError::EmptyNodeList);
    }
}
