//! Lock hierarchy, controller-owned tables, and the reconfigure
//! reconciler (spec.md §4.6, §5). This is the crate that turns
//! `ridge-config`'s parsed tables and `ridge-step`'s job/node/partition
//! records into the single process-wide state a real controller holds,
//! and the one place that knows how to rebuild that state in place when
//! an operator reloads the config without restarting.

mod bitmaps;
mod config_schema;
mod identity;
mod locks;
mod reconfigure;
mod state_save;
mod tables;

pub use bitmaps::StateBitmaps;
pub use config_schema::{node_schema, nodes_from_table, partition_schema, partitions_from_table};
pub use identity::{IdentityChange, IdentityField, IdentityParams};
pub use locks::{Controller, FederationState};
pub use reconfigure::{
    apply_node_table, gang_toggle, notify_nodes_of_reconfigure, reconcile, require_no_restart, restore_plugin_features,
    validate_hetjobs, AbortedJob, GangToggle, ReconcileReport, RestartRequired,
};
pub use state_save::{load, save, LastConfigLite, LoadOutcome, CURRENT_VERSION};
pub use tables::{NodeTable, PartitionTable};
