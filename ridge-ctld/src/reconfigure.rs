// Controller restart/reconfigure reconciler (spec.md §4.6): re-reading
// the config file while the controller holds live job/step state.
// Grounded on `examples/original_source/src/slurmctld/read_config.c`'s
// `read_slurm_conf`/`_reconfigure`/`_compare_hostnames`, which performs
// exactly this snapshot-reparse-compare-rebind sequence around a much
// larger set of subsystems (gres, topology, licenses, triggers) this
// crate doesn't model.

use std::collections::{HashMap, HashSet};

use ridge_base::{err, Bitmap, JobId, NodeIdx, Result};
use ridge_net::wire::MsgKind;
use ridge_net::{forward, ReplyList, Transport};
use ridge_step::{Job, Node, Step, StepFlags};

use crate::identity::{IdentityChange, IdentityParams};
use crate::tables::{NodeTable, PartitionTable};

/// The one point this crate actually goes out over the wire: after a
/// successful reload, every node agent is told to reload its own copy
/// of the config (`REQUEST_RECONFIGURE`, §6). Fire-and-forget, per
/// `MsgKind::is_fire_and_forget` -- the forwarder acks every descendant
/// unconditionally and never waits for a reply.
pub fn notify_nodes_of_reconfigure(transport: &(dyn Transport + Sync), nodes: &NodeTable, fanout: usize) -> ReplyList {
    let names: Vec<String> = nodes.names().map(str::to_string).collect();
    forward(transport, &names, MsgKind::RequestReconfigure, &[], fanout, std::time::Duration::from_secs(5), std::time::Duration::from_secs(5))
}

/// A job flagged to eventually be terminated as a node failure because
/// something about its allocation no longer holds against the new
/// tables -- the reconciler itself never kills anything (it has no
/// signal path), it only marks the job so the scheduler's regular
/// node-fail handling picks it up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbortedJob {
    pub job_id: JobId,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    /// Per-node CPU/core layout changed under a name that still exists;
    /// allowed, but flags that a restart is recommended to pick up the
    /// new layout cleanly in every in-memory structure that caches it.
    pub need_restart: bool,
    pub identity_changes: Vec<IdentityChange>,
    pub aborted_jobs: Vec<AbortedJob>,
}

/// Step 3's hard failure: a name present in the live snapshot vanished
/// from the freshly parsed config (or the count changed), for a node
/// this reconciler has no reason to believe is dynamically managed.
/// Spec.md: "fail hard (restart required)".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestartRequired {
    pub missing_nodes: Vec<String>,
}

impl std::fmt::Display for RestartRequired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "restart required: node(s) removed from config: {:?}", self.missing_nodes)
    }
}

/// Step 2/3: applies a freshly parsed node list onto the live
/// `NodeTable`, in place. Any name present in `old` but missing from
/// `new_nodes` is a hard failure (`dynamic_names` excepts names the
/// caller knows are managed by cloud/dynamic-node provisioning, which
/// are allowed to come and go freely). Every node that survives keeps
/// its index (`NodeTable::insert_or_update`'s invariant); nodes new to
/// this load get a freshly appended one. Returns whether any surviving
/// node's core layout changed (flags `need_restart`, not a failure).
pub fn apply_node_table(
    nodes: &mut NodeTable,
    new_nodes: Vec<Node>,
    dynamic_names: &HashSet<String>,
) -> std::result::Result<bool, RestartRequired> {
    let new_names: HashSet<&str> = new_nodes.iter().map(|n| n.name.as_str()).collect();
    let missing: Vec<String> = nodes
        .names()
        .filter(|name| !new_names.contains(name) && !dynamic_names.contains(*name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(RestartRequired { missing_nodes: missing });
    }

    let mut layout_changed = false;
    for new_node in new_nodes {
        if let Some(old) = nodes.get_by_name(&new_node.name) {
            if old.total_cores() != new_node.total_cores() || old.threads_per_core != new_node.threads_per_core {
                layout_changed = true;
            }
        }
        nodes.insert_or_update(new_node);
    }
    Ok(layout_changed)
}

/// Step 5: features a node-features plugin marks "plugin-controlled"
/// are kept from the live record rather than overwritten by the
/// freshly parsed config; every other feature comes from config. When
/// no plugin-controlled set is known for a node (the common case, no
/// node-features plugin active) config wins outright.
pub fn restore_plugin_features(node: &mut Node, old_features: &[String], plugin_controlled: &HashSet<String>) {
    if plugin_controlled.is_empty() {
        return;
    }
    let preserved: Vec<String> = old_features.iter().filter(|f| plugin_controlled.contains(*f)).cloned().collect();
    for f in preserved {
        if !node.features.contains(&f) {
            node.features.push(f);
        }
    }
}

/// Step 4, first half: re-binds `job.partition` by name against the new
/// partition table. Returns `Some(reason)` if the partition vanished,
/// in which case the caller should push an `AbortedJob` and leave the
/// job's node/resource state untouched (spec.md: "flagged for eventual
/// node-fail termination", not an immediate hard delete).
fn rebind_partition(job: &Job, partitions: &PartitionTable) -> Option<String> {
    if partitions.find(&job.partition).is_none() {
        Some(format!("partition {:?} no longer exists", job.partition))
    } else {
        None
    }
}

/// Step 4, second half: a job's `job_resources` must still make sense
/// against the new node table -- every node it holds cores on must
/// still exist (already guaranteed by `apply_node_table`'s hard-fail
/// rule) and its recorded core bitmap length must not exceed the node's
/// current core count. A node whose core count *shrank* under an
/// unchanged name invalidates the job outright; growth is harmless (the
/// job just doesn't use the new cores).
fn job_resources_consistent(job: &Job, nodes: &NodeTable) -> bool {
    for (&node_idx, bitmap) in &job.job_resources.core_bitmap {
        let Some(node) = nodes.get(node_idx) else { return false };
        if bitmap.len() > node.total_cores() as usize {
            return false;
        }
    }
    true
}

/// Step 4, third part: re-OR's every step's `core_bitmap_job` into the
/// job's `core_bitmap_used`, skipping the step kinds the spec
/// enumerates as exempt from ever counting against job usage
/// (OVERLAP_FORCE, the three special sentinel steps, and EXT_LAUNCHER).
/// This is the Rust shape of "rescale `core_bitmap_job` from the old
/// node index to the new node index... and re-OR it into the job's
/// `core_bitmap_used`": because this model keys per-node maps by
/// `NodeIdx` rather than position in a flat array, and `NodeIdx` is
/// invariant for a node's lifetime (§3), there is no index to rescale
/// in the common case -- the relocation only has work to do if a step's
/// core bitmap was recorded against a node whose core count changed,
/// handled by truncating/growing the per-node bitmap to the node's
/// current size before OR-ing it in.
fn reoccupy_step_cores(job: &mut Job, nodes: &NodeTable) {
    let exempt = |step: &Step| {
        step.flags.contains(StepFlags::OVERLAP_FORCE)
            || step.flags.contains(StepFlags::EXT_LAUNCHER)
            || step.step_id.is_special()
    };
    let mut used_updates: HashMap<NodeIdx, Bitmap> = job.core_bitmap_used.clone();
    for step in &job.steps {
        if exempt(step) {
            continue;
        }
        for (&node_idx, bits) in &step.core_bitmap_job {
            let Some(node) = nodes.get(node_idx) else { continue };
            let target_len = node.total_cores() as usize;
            let resized = resize_bitmap(bits, target_len);
            used_updates
                .entry(node_idx)
                .and_modify(|existing| existing.union(&resized))
                .or_insert(resized);
        }
    }
    job.core_bitmap_used = used_updates;
}

fn resize_bitmap(src: &Bitmap, target_len: usize) -> Bitmap {
    if src.len() == target_len {
        return src.clone();
    }
    let mut out = Bitmap::new(target_len);
    for i in src.iter_set() {
        if i < target_len {
            out.set(i, true);
        }
    }
    out
}

/// The full per-job pass of step 4: rebind partition, validate
/// resources, re-occupy step cores. Jobs that fail validation are
/// appended to `aborted` rather than mutated further.
fn reconcile_job(job: &mut Job, nodes: &NodeTable, partitions: &PartitionTable, aborted: &mut Vec<AbortedJob>) {
    if let Some(reason) = rebind_partition(job, partitions) {
        aborted.push(AbortedJob { job_id: job.id, reason });
        return;
    }
    if !job_resources_consistent(job, nodes) {
        aborted.push(AbortedJob { job_id: job.id, reason: "job_resources inconsistent with new node core layout".to_string() });
        return;
    }
    reoccupy_step_cores(job, nodes);
}

/// Possible outcomes of comparing preempt-mode strings across a reload
/// (step 7). `gang` is treated as a substring flag within the mode
/// string, matching the source's `PREEMPT_MODE_GANG` bit folded into the
/// same field this crate represents as plain text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GangToggle {
    Started,
    Stopped,
}

pub fn gang_toggle(old_preempt_mode: &str, new_preempt_mode: &str) -> Option<GangToggle> {
    let old_gang = old_preempt_mode.contains("gang");
    let new_gang = new_preempt_mode.contains("gang");
    match (old_gang, new_gang) {
        (false, true) => Some(GangToggle::Started),
        (true, false) => Some(GangToggle::Stopped),
        _ => None,
    }
}

/// Top-level entry point: runs steps 3-4 of §4.6 against an already
/// rebuilt node/partition table (steps 1-2, parsing the file and
/// building the tables, are the caller's job via `ridge-config` and
/// `config_schema.rs` -- this function is the part that is genuinely
/// `ridge-ctld`'s own: reconciling *live* state against the result).
pub fn reconcile(
    nodes: &NodeTable,
    partitions: &PartitionTable,
    old_identity: &IdentityParams,
    new_identity: &mut IdentityParams,
    layout_changed: bool,
    jobs: &mut [Job],
) -> Result<ReconcileReport> {
    let identity_changes = old_identity.diff_against(new_identity);
    old_identity.revert_unsafe_changes(new_identity, &identity_changes);

    let mut aborted = Vec::new();
    for job in jobs.iter_mut() {
        reconcile_job(job, nodes, partitions, &mut aborted);
    }

    Ok(ReconcileReport { need_restart: layout_changed, identity_changes, aborted_jobs: aborted })
}

/// Validates hetjob component sets across every live job, folding
/// `ridge_step::resolve_het_groups`'s results into the same
/// `AbortedJob` vocabulary the rest of this module uses, per §9's
/// tolerance rules (orphaned component aborts itself; incomplete leader
/// set aborts the whole group).
pub fn validate_hetjobs(jobs: &[Job], expected_components: &HashMap<JobId, u32>) -> Vec<AbortedJob> {
    let (_groups, orphaned, incomplete) = ridge_step::resolve_het_groups(jobs, expected_components);
    let mut aborted = Vec::new();
    for o in orphaned {
        aborted.push(AbortedJob { job_id: o.job_id, reason: format!("heterogeneous job leader {:?} missing", o.missing_leader) });
    }
    for (leader_id, _) in incomplete {
        for job in jobs {
            if job.het_job_id == Some(leader_id) || job.id == leader_id {
                aborted.push(AbortedJob { job_id: job.id, reason: "heterogeneous job component set incomplete".to_string() });
            }
        }
    }
    aborted
}

pub fn require_no_restart(result: std::result::Result<bool, RestartRequired>) -> Result<bool> {
    result.map_err(|e| err(e.to_string()))
}
