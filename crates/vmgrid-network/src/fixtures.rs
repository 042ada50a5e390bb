//! Shared test setup.

use std::sync::Arc;

use vmgrid_core::config::NetworkConfig;
use vmgrid_dispatch::{Dispatcher, RecordingExec, ScriptSet};
use vmgrid_state::{
    HostId, Instance, InstanceStatus, StateStore, Subnet, SubnetId, VlanId, ZoneId,
};

use crate::interface::InterfaceManager;

pub struct Env {
    pub store: StateStore,
    pub exec: RecordingExec,
    pub manager: InterfaceManager,
}

impl Env {
    pub fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let exec = RecordingExec::new();
        let manager = InterfaceManager::new(
            store.clone(),
            Dispatcher::new(Arc::new(exec.clone())),
            ScriptSet::new("/s"),
            &NetworkConfig::default(),
        );
        Self {
            store,
            exec,
            manager,
        }
    }

    /// `10.0.<id>.0/24` with gateway `.1`.
    pub fn subnet(&self, id: SubnetId, vlan: VlanId, zones: &[ZoneId]) -> Subnet {
        let subnet = Subnet {
            id,
            name: format!("net-{id}"),
            network: format!("10.0.{id}.0"),
            netmask: "255.255.255.0".to_string(),
            gateway: format!("10.0.{id}.1/24"),
            vlan,
            name_server: "10.0.0.53".to_string(),
            domain_search: "example.org".to_string(),
            vswitch: String::new(),
            zones: zones.to_vec(),
        };
        self.store.put(&subnet).unwrap();
        subnet
    }

    pub fn instance(&self, id: u64, hyper: Option<HostId>) -> Instance {
        let inst = Instance {
            id,
            hostname: format!("vm-{id}"),
            image_id: Some(1),
            flavor_id: 1,
            cluster_id: None,
            zone_id: 1,
            hyper,
            status: InstanceStatus::Running,
            userdata: String::new(),
            creator: 1,
            owner: 1,
            created_at: 0,
            updated_at: 0,
        };
        self.store.put(&inst).unwrap();
        inst
    }
}
