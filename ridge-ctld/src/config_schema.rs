// Node/partition stanza schemas for the cluster config (spec.md §4.6
// step 2, "re-parse the config and rebuild static tables"). `ridge-ctld`
// is the only crate that needs a concrete schema: `ridge-config` itself
// stays schema-agnostic per spec.md §4.5.

use std::collections::HashMap;

use ridge_config::{Schema, SchemaField, Table, ValueType};
use ridge_step::{GresInventory, Node, NodeState, Partition, PartitionFlags, PreemptMode};

use ridge_base::{err, Result};

/// `NodeName=n[0-31] CPUs=... Sockets=... CoresPerSocket=... RealMemory=...`
/// An `EXPLINE` record: `NodeName` is the master (host-range) field.
pub fn node_schema() -> Schema {
    vec![
        SchemaField::new("NodeName", ValueType::Expline),
        SchemaField::new("NodeAddr", ValueType::String),
        SchemaField::new("Sockets", ValueType::Uint32),
        SchemaField::new("CoresPerSocket", ValueType::Uint32),
        SchemaField::new("ThreadsPerCore", ValueType::Uint32),
        SchemaField::new("RealMemory", ValueType::Uint64),
        SchemaField::new("Feature", ValueType::String),
        SchemaField::new("Gres", ValueType::String),
    ]
}

/// `PartitionName=batch Nodes=n[0-31] Default=YES MaxTime=UNLIMITED ...`
pub fn partition_schema() -> Schema {
    vec![
        SchemaField::new("PartitionName", ValueType::Expline),
        SchemaField::new("Nodes", ValueType::String),
        SchemaField::new("Default", ValueType::Boolean),
        SchemaField::new("Hidden", ValueType::Boolean),
        SchemaField::new("RootOnly", ValueType::Boolean),
        SchemaField::new("DisableRootJobs", ValueType::Boolean),
        SchemaField::new("ExclusiveUser", ValueType::Boolean),
        SchemaField::new("ReqResv", ValueType::Boolean),
        SchemaField::new("LLN", ValueType::Boolean),
        SchemaField::new("Priority", ValueType::Long),
        SchemaField::new("MinNodes", ValueType::Uint32),
        SchemaField::new("MaxNodes", ValueType::Uint32),
        SchemaField::new("MinTime", ValueType::Uint32),
        SchemaField::new("MaxTime", ValueType::Uint32),
        SchemaField::new("AllowQos", ValueType::String),
        SchemaField::new("DenyQos", ValueType::String),
        SchemaField::new("AllowAccounts", ValueType::String),
        SchemaField::new("DenyAccounts", ValueType::String),
    ]
}

/// Parses every `NodeName=` expansion slot under `key` into a `Node`
/// list. Dynamic node index preservation (§3's invariant that a node's
/// index never changes for the life of the process) is `tables.rs`'s
/// job, not this parser's -- this function only produces fresh records,
/// one per config slot, in deterministic (sorted-by-name) order.
pub fn nodes_from_table(table: &Table, key: &str) -> Result<Vec<Node>> {
    let Some(slots) = table.get_expline(key) else { return Ok(Vec::new()) };
    let mut nodes = Vec::new();
    for (name, slot) in slots {
        let sockets = slot.get_u32("Sockets").unwrap_or(1);
        let cores_per_socket = slot.get_u32("CoresPerSocket").unwrap_or(1);
        let threads_per_core = slot.get_u32("ThreadsPerCore").unwrap_or(1);
        let real_memory_mb = slot.get_u64("RealMemory").unwrap_or(0);
        let features: Vec<String> = slot
            .get_str("Feature")
            .map(|f| f.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let gres: Vec<GresInventory> = slot
            .get_str("Gres")
            .map(|g| {
                g.split(',')
                    .filter_map(|entry| {
                        let entry = entry.trim();
                        if entry.is_empty() {
                            return None;
                        }
                        let (gname, count) = entry.split_once(':').unwrap_or((entry, "1"));
                        let count = count.trim().parse().unwrap_or(1);
                        Some(GresInventory { name: gname.trim().to_string(), count, affined_cores: None })
                    })
                    .collect()
            })
            .unwrap_or_default();
        nodes.push(Node {
            idx: ridge_base::NodeIdx(0), // assigned by `tables.rs` on insertion
            name: name.clone(),
            address: slot.get_str("NodeAddr").unwrap_or(name).to_string(),
            sockets,
            cores_per_socket,
            threads_per_core,
            real_memory_mb,
            state: NodeState::UpIdle,
            features,
            gres,
            last_response: 0,
            protocol_version: 0,
        });
    }
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

/// Parses every `PartitionName=` expansion slot under `key`, resolving
/// `Nodes=` against `node_index` to a concrete `NodeIdx` list. Returns an
/// error if more than one slot sets the `Default` flag (§3's partition
/// invariant: "exactly zero or one partition carries the DEFAULT flag").
pub fn partitions_from_table(
    table: &Table,
    key: &str,
    node_index: &HashMap<String, ridge_base::NodeIdx>,
) -> Result<Vec<Partition>> {
    let Some(slots) = table.get_expline(key) else { return Ok(Vec::new()) };
    let mut partitions = Vec::new();
    let mut default_seen: Option<String> = None;
    for (name, slot) in slots {
        let mut flags = PartitionFlags::empty();
        if slot.get_bool("Default").unwrap_or(false) {
            if let Some(prior) = &default_seen {
                return Err(err(format!("more than one DEFAULT partition: {prior:?} and {name:?}")));
            }
            default_seen = Some(name.clone());
            flags |= PartitionFlags::DEFAULT;
        }
        if slot.get_bool("Hidden").unwrap_or(false) {
            flags |= PartitionFlags::HIDDEN;
        }
        if slot.get_bool("RootOnly").unwrap_or(false) {
            flags |= PartitionFlags::ROOT_ONLY;
        }
        if slot.get_bool("DisableRootJobs").unwrap_or(false) {
            flags |= PartitionFlags::NO_ROOT;
        }
        if slot.get_bool("ExclusiveUser").unwrap_or(false) {
            flags |= PartitionFlags::EXCLUSIVE_USER;
        }
        if slot.get_bool("ReqResv").unwrap_or(false) {
            flags |= PartitionFlags::REQ_RESV;
        }
        if slot.get_bool("LLN").unwrap_or(false) {
            flags |= PartitionFlags::LLN;
        }
        let nodes: Vec<ridge_base::NodeIdx> = slot
            .get_str("Nodes")
            .map(|spec| ridge_base::expand_hostlist(spec))
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .filter_map(|n| node_index.get(&n).copied())
            .collect();
        partitions.push(Partition {
            name: name.clone(),
            nodes,
            flags,
            priority: slot.get_long("Priority").unwrap_or(1) as i32,
            preempt_mode: PreemptMode::Off,
            min_nodes: slot.get_u32("MinNodes").unwrap_or(1),
            max_nodes: slot.get_u32("MaxNodes").unwrap_or(u32::MAX),
            min_time_minutes: slot.get_u32("MinTime"),
            max_time_minutes: slot.get_u32("MaxTime"),
            qos_allow: split_csv(slot.get_str("AllowQos")),
            qos_deny: split_csv(slot.get_str("DenyQos")),
            account_allow: split_csv(slot.get_str("AllowAccounts")),
            account_deny: split_csv(slot.get_str("DenyAccounts")),
        });
    }
    partitions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(partitions)
}

fn split_csv(text: Option<&str>) -> Vec<String> {
    text.map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use ridge_config::ParseContext;

    #[test]
    fn parses_node_expansion_with_uniform_attrs() {
        let mut table = Table::new(node_schema());
        let ctx = ParseContext::new(".", "testcluster");
        table.parse_line("NodeName=n[0-3] Sockets=2 CoresPerSocket=4 RealMemory=16000", &ctx).unwrap();
        let nodes = nodes_from_table(&table, "NodeName").unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].name, "n0");
        assert_eq!(nodes[0].total_cores(), 8);
        assert_eq!(nodes[0].real_memory_mb, 16000);
    }

    #[test]
    fn rejects_two_default_partitions() {
        let mut table = Table::new(partition_schema());
        let ctx = ParseContext::new(".", "testcluster");
        table.parse_line("PartitionName=batch Nodes=n0 Default=yes", &ctx).unwrap();
        table.parse_line("PartitionName=debug Nodes=n0 Default=yes", &ctx).unwrap();
        let result = partitions_from_table(&table, "PartitionName", &HashMap::new());
        assert!(result.is_err());
    }
}
