// Special steps (spec.md §4.3.6). Four step ids bypass the normal
// node-picking/core-selection/accounting path entirely: their resources
// are derived directly from the job rather than computed per-request,
// and they must stay invisible to the "idle nodes for step placement"
// scan in `pick.rs`.

use std::collections::HashMap;

use ridge_base::{Bitmap, NodeIdx, StepId};

use crate::model::{Job, Node, Step, StepFlags, StepNodeLayout};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpecialKind {
    BatchScript,
    ExternCont,
    InteractiveStep,
    ExtLauncher,
}

/// Builds the fixed layout for a special step. `batch_host` is the node
/// the job's batch shell (or the interactive-session shell) runs on;
/// ignored for kinds that span the whole job.
///
/// EXT_LAUNCHER is the one special kind that is *not* one of the four
/// sentinel `StepId` values -- the spec lists it as bypassing the
/// allocator while still carrying an ordinary numbered step id, so the
/// caller supplies `step_id` for it directly rather than this module
/// inventing one.
pub fn build_special_step(
    job: &Job,
    registry: &HashMap<NodeIdx, Node>,
    kind: SpecialKind,
    step_id: StepId,
    batch_host: NodeIdx,
    uid: u32,
    now: i64,
) -> Step {
    let (layout, core_bitmap_job, gres) = match kind {
        SpecialKind::BatchScript => {
            let cpus = job.job_resources.cpus_alloc.get(&batch_host).copied().unwrap_or(0);
            let layout = vec![StepNodeLayout { node: batch_host, num_tasks: 1, cpus_per_task: cpus.max(1) }];
            (layout, whole_job_cores(job), whole_job_gres(job, registry))
        }
        SpecialKind::InteractiveStep => {
            let layout = vec![StepNodeLayout { node: batch_host, num_tasks: 1, cpus_per_task: 1 }];
            (layout, whole_job_cores(job), Vec::new())
        }
        SpecialKind::ExternCont => {
            let layout = job
                .nodes
                .iter()
                .map(|&n| StepNodeLayout { node: n, num_tasks: 1, cpus_per_task: job.job_resources.cpus_alloc.get(&n).copied().unwrap_or(0).max(1) })
                .collect();
            (layout, whole_job_cores(job), whole_job_gres(job, registry))
        }
        SpecialKind::ExtLauncher => {
            let layout = job.nodes.iter().map(|&n| StepNodeLayout { node: n, num_tasks: 1, cpus_per_task: 1 }).collect();
            (layout, whole_job_cores(job), Vec::new())
        }
    };

    Step {
        step_id,
        het_job_offset: job.het_job_offset,
        layout,
        mem_per_node_mb: job.job_resources.mem_alloc_mb.clone(),
        core_bitmap_job,
        credential: None,
        gres,
        flags: StepFlags::empty(),
        exit_node_bitmap: Bitmap::new(job.nodes.len()),
        time_limit_minutes: None,
        cpu_freq: None,
        start_time: now,
        uid,
        pending_contact: None,
    }
}

fn whole_job_cores(job: &Job) -> HashMap<NodeIdx, Bitmap> {
    job.job_resources.core_bitmap.clone()
}

fn whole_job_gres(job: &Job, registry: &HashMap<NodeIdx, Node>) -> Vec<String> {
    let mut names = Vec::new();
    for &n in &job.nodes {
        if let Some(node) = registry.get(&n) {
            for g in &node.gres {
                if !names.contains(&g.name) {
                    names.push(g.name.clone());
                }
            }
        }
    }
    names
}

/// Per §4.3.6: special steps never count against `cpus_used`/
/// `memory_used`, so `pick.rs`'s busy-node scan must never see them.
pub fn is_invisible_to_node_picking(step_id: StepId) -> bool {
    matches!(step_id, StepId::BatchScript | StepId::ExternCont | StepId::InteractiveStep)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{JobResources, JobState, NodeState};
    use std::cell::Cell;

    fn job_with_one_node() -> (Job, HashMap<NodeIdx, Node>) {
        let idx = NodeIdx(0);
        let mut cpus_alloc = HashMap::new();
        cpus_alloc.insert(idx, 4);
        let mut mem_alloc_mb = HashMap::new();
        mem_alloc_mb.insert(idx, 2048);
        let mut core_bitmap = HashMap::new();
        let mut bits = Bitmap::new(4);
        bits.set_all();
        core_bitmap.insert(idx, bits);

        let job = Job {
            id: ridge_base::JobId(1),
            uid: 0,
            gid: 0,
            array_task_id: None,
            het_job_id: None,
            het_job_offset: None,
            state: JobState::Running,
            partition: "default".to_string(),
            nodes: vec![idx],
            job_resources: JobResources { cpus_alloc, mem_alloc_mb, core_bitmap },
            cpus_used: HashMap::new(),
            memory_used_mb: HashMap::new(),
            core_bitmap_used: HashMap::new(),
            steps: Vec::new(),
            next_step_id: Cell::new(0),
            next_step_node_inx: Cell::new(0),
            end_time: 0,
            start_time: 0,
            tot_suspend_time: 0,
        };
        let mut registry = HashMap::new();
        registry.insert(
            idx,
            Node {
                idx,
                name: "n0".to_string(),
                address: "10.0.0.1".to_string(),
                sockets: 1,
                cores_per_socket: 4,
                threads_per_core: 1,
                real_memory_mb: 4096,
                state: NodeState::Allocated,
                features: Vec::new(),
                gres: Vec::new(),
                last_response: 0,
                protocol_version: 1,
            },
        );
        (job, registry)
    }

    #[test]
    fn batch_script_takes_whole_job_cpus_on_batch_host() {
        let (job, registry) = job_with_one_node();
        let step = build_special_step(&job, &registry, SpecialKind::BatchScript, StepId::BatchScript, NodeIdx(0), 0, 0);
        assert_eq!(step.layout.len(), 1);
        assert_eq!(step.layout[0].cpus_per_task, 4);
    }

    #[test]
    fn special_steps_are_invisible_to_node_picking() {
        assert!(is_invisible_to_node_picking(StepId::BatchScript));
        assert!(is_invisible_to_node_picking(StepId::ExternCont));
        assert!(is_invisible_to_node_picking(StepId::InteractiveStep));
        assert!(!is_invisible_to_node_picking(StepId::Id(3)));
    }
}
