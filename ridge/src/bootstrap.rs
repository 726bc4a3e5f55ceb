// Assembles a running controller's state from a cluster config file
// (spec.md §4.5, §4.6): parse once at startup into `Ridge::bootstrap`,
// then drive every later reload through `Ridge::reconfigure`, which is
// the same node-table/partition-table/identity-params path §4.6
// describes, ending in the fire-and-forget `REQUEST_RECONFIGURE`
// broadcast of §6.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use ridge_base::{err, NodeIdx, Result};
use ridge_config::{ParseContext, Schema, SchemaField, Table, ValueType};
use ridge_ctld::{
    apply_node_table, node_schema, nodes_from_table, notify_nodes_of_reconfigure, partition_schema, partitions_from_table,
    reconcile, require_no_restart, Controller, IdentityParams, NodeTable, PartitionTable, ReconcileReport,
};
use ridge_net::Transport;

/// Top-level config keys this crate reads directly; everything naming a
/// node or partition is `ridge_ctld::{node_schema, partition_schema}`'s
/// job, not this crate's.
fn identity_schema() -> Schema {
    vec![
        SchemaField::new("ClusterName", ValueType::String),
        SchemaField::new("AuthType", ValueType::String),
        SchemaField::new("CredType", ValueType::String),
        SchemaField::new("SchedType", ValueType::String),
        SchemaField::new("SwitchType", ValueType::String),
        SchemaField::new("SelectType", ValueType::String),
        SchemaField::new("BbType", ValueType::String),
        SchemaField::new("PreemptMode", ValueType::String),
    ]
}

fn full_schema() -> Schema {
    let mut schema = identity_schema();
    schema.extend(node_schema());
    schema.extend(partition_schema());
    schema
}

fn identity_from_table(table: &Table) -> IdentityParams {
    IdentityParams {
        auth_type: table.get_str("AuthType").unwrap_or("auth/munge").to_string(),
        cred_type: table.get_str("CredType").unwrap_or("cred/munge").to_string(),
        sched_type: table.get_str("SchedType").unwrap_or("sched/backfill").to_string(),
        switch_type: table.get_str("SwitchType").unwrap_or("switch/none").to_string(),
        select_type: table.get_str("SelectType").unwrap_or("select/cons_tres").to_string(),
        bb_type: table.get_str("BbType").unwrap_or("").to_string(),
        preempt_mode: table.get_str("PreemptMode").unwrap_or("off").to_string(),
    }
}

fn parse_config_file(path: &Path, cluster_name: &str) -> Result<Table> {
    let contents = std::fs::read_to_string(path).map_err(|e| err(format!("reading {}: {e}", path.display())))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let ctx = ParseContext::new(base_dir, cluster_name);
    let mut table = Table::new(full_schema());
    table.parse_file(&contents, &ctx)?;
    Ok(table)
}

fn node_index_of(nodes: &NodeTable) -> HashMap<String, NodeIdx> {
    nodes.iter().map(|n| (n.name.clone(), n.idx)).collect()
}

/// What `Ridge::bootstrap` needs from the caller: where the config file
/// lives, what cluster name `%c` substitutes to, and the forwarder
/// fan-out to use for the reconfigure broadcast (§4.1).
pub struct RidgeConfig {
    pub config_path: PathBuf,
    pub cluster_name: String,
    pub forward_fanout: usize,
}

/// The object a real controller `main` would hold: the lock-guarded
/// tables of §5, plus the bits bootstrap/reconfigure need that aren't
/// part of that lock set (the config file's own path, and the identity
/// parameters snapshot of §4.6 step 3, which predates any job/node data
/// and so doesn't belong behind the node or job lock).
pub struct Ridge {
    pub controller: Controller,
    identity: RwLock<IdentityParams>,
    config_path: PathBuf,
    cluster_name: String,
    forward_fanout: usize,
}

impl Ridge {
    /// Cold-start: parse `cfg.config_path` once, build fresh node and
    /// partition tables (every node gets an index in sorted-name order,
    /// the only point where that's correct -- see `NodeTable::from_fresh_load`),
    /// and construct the controller with an empty job list.
    pub fn bootstrap(cfg: RidgeConfig) -> Result<Ridge> {
        let table = parse_config_file(&cfg.config_path, &cfg.cluster_name)?;

        let raw_nodes = nodes_from_table(&table, "NodeName")?;
        let node_table = NodeTable::from_fresh_load(raw_nodes);
        let node_index = node_index_of(&node_table);
        let partitions = partitions_from_table(&table, "PartitionName", &node_index)?;
        let partition_table = PartitionTable::new(partitions);

        let identity = identity_from_table(&table);
        let controller = Controller::new(table, Vec::new(), node_table, partition_table);

        Ok(Ridge {
            controller,
            identity: RwLock::new(identity),
            config_path: cfg.config_path,
            cluster_name: cfg.cluster_name,
            forward_fanout: cfg.forward_fanout,
        })
    }

    /// Re-reads the config file from disk and drives the full §4.6
    /// reconciliation: rebuild the node table in place (preserving
    /// surviving nodes' indices), rebind partitions, diff and revert
    /// identity parameters, reoccupy step cores, abort jobs that no
    /// longer fit, then notify every node of the reload. Locks are
    /// acquired in §5's declared order (config, jobs, nodes, partitions).
    pub fn reconfigure(&self, transport: &(dyn Transport + Sync)) -> Result<ReconcileReport> {
        let new_table = parse_config_file(&self.config_path, &self.cluster_name)?;

        let node_index = node_index_of(&self.controller.nodes_read());
        let new_nodes = nodes_from_table(&new_table, "NodeName")?;
        let new_partitions = partitions_from_table(&new_table, "PartitionName", &node_index)?;
        let mut new_identity = identity_from_table(&new_table);

        let mut config = self.controller.config_write();
        let mut jobs = self.controller.jobs_write();
        let mut nodes = self.controller.nodes_write();
        let mut partitions = self.controller.partitions_write();

        let no_dynamic_exceptions: std::collections::HashSet<String> = std::collections::HashSet::new();
        let layout_changed = require_no_restart(apply_node_table(&mut nodes, new_nodes, &no_dynamic_exceptions))?;
        *partitions = PartitionTable::new(new_partitions);

        let mut identity = self.identity.write().unwrap();
        let report = reconcile(&nodes, &partitions, &identity, &mut new_identity, layout_changed, &mut jobs)?;
        *identity = new_identity;
        *config = new_table;

        drop(identity);
        drop(partitions);
        drop(nodes);
        drop(jobs);
        drop(config);

        notify_nodes_of_reconfigure(transport, &self.controller.nodes_read(), self.forward_fanout);
        Ok(report)
    }

    pub fn identity(&self) -> IdentityParams {
        self.identity.read().unwrap().clone()
    }
}
