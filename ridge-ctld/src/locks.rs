// Lock hierarchy (spec.md §5): config, then job list, then node table,
// then partition list, then federation. Every RPC dispatcher in the real
// controller declares up front which locks it needs and in which mode;
// here that's approximated by giving `Controller` one typed accessor per
// lock rather than exposing the `RwLock`s directly, so a call site can
// only acquire locks by going through an accessor -- and the accessors
// are listed below in the declared order, so acquiring them in the
// textual order they're written in is, by construction, the correct
// order. The federation lock has no data behind it yet (§9: federation
// itself is out of scope), but it stays in the struct so the acquisition
// order the real controller uses is preserved for whenever it's needed.

use std::sync::RwLock;

use ridge_config::Table;
use ridge_step::Job;

use crate::tables::{NodeTable, PartitionTable};

#[derive(Default)]
pub struct FederationState {
    pub federation_name: Option<String>,
}

pub struct Controller {
    config: RwLock<Table>,
    jobs: RwLock<Vec<Job>>,
    nodes: RwLock<NodeTable>,
    partitions: RwLock<PartitionTable>,
    federation: RwLock<FederationState>,
}

impl Controller {
    pub fn new(config: Table, jobs: Vec<Job>, nodes: NodeTable, partitions: PartitionTable) -> Self {
        Controller {
            config: RwLock::new(config),
            jobs: RwLock::new(jobs),
            nodes: RwLock::new(nodes),
            partitions: RwLock::new(partitions),
            federation: RwLock::new(FederationState::default()),
        }
    }

    // --- 1. Configuration lock ---
    pub fn config_read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.config.read().unwrap()
    }
    pub fn config_write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.config.write().unwrap()
    }

    // --- 2. Job list lock ---
    pub fn jobs_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Job>> {
        self.jobs.read().unwrap()
    }
    pub fn jobs_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Job>> {
        self.jobs.write().unwrap()
    }

    // --- 3. Node table lock ---
    pub fn nodes_read(&self) -> std::sync::RwLockReadGuard<'_, NodeTable> {
        self.nodes.read().unwrap()
    }
    pub fn nodes_write(&self) -> std::sync::RwLockWriteGuard<'_, NodeTable> {
        self.nodes.write().unwrap()
    }

    // --- 4. Partition list lock ---
    pub fn partitions_read(&self) -> std::sync::RwLockReadGuard<'_, PartitionTable> {
        self.partitions.read().unwrap()
    }
    pub fn partitions_write(&self) -> std::sync::RwLockWriteGuard<'_, PartitionTable> {
        self.partitions.write().unwrap()
    }

    // --- 5. Federation lock ---
    pub fn federation_read(&self) -> std::sync::RwLockReadGuard<'_, FederationState> {
        self.federation.read().unwrap()
    }
    pub fn federation_write(&self) -> std::sync::RwLockWriteGuard<'_, FederationState> {
        self.federation.write().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ridge_config::Schema;

    #[test]
    fn acquiring_every_lock_in_declared_order_does_not_deadlock() {
        let controller = Controller::new(Table::new(Schema::new()), Vec::new(), NodeTable::new(), PartitionTable::new(Vec::new()));
        let _c = controller.config_read();
        let _j = controller.jobs_read();
        let _n = controller.nodes_read();
        let _p = controller.partitions_read();
        let _f = controller.federation_read();
    }
}
