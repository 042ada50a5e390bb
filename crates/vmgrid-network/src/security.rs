//! Security rules in the wire shape consumed by the hypervisor scripts.

use serde::{Deserialize, Serialize};

use vmgrid_state::SecurityGroup;

/// One flattened rule, tagged with the group it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRecord {
    #[serde(rename = "Secgroup")]
    pub secgroup: u64,
    pub remote_ip: String,
    pub remote_group: String,
    pub direction: String,
    pub ip_version: String,
    pub protocol: String,
    pub port_min: i32,
    pub port_max: i32,
}

/// Flatten every rule of every group, in group order then rule order.
pub fn flatten_rules(groups: &[SecurityGroup]) -> Vec<SecurityRecord> {
    groups
        .iter()
        .flat_map(|group| {
            group.rules.iter().map(move |rule| SecurityRecord {
                secgroup: group.id,
                remote_ip: rule.remote_ip.clone(),
                remote_group: rule.remote_group.clone(),
                direction: rule.direction.clone(),
                ip_version: rule.ip_version.clone(),
                protocol: rule.protocol.clone(),
                port_min: rule.port_min,
                port_max: rule.port_max,
            })
        })
        .collect()
}

/// The `attach_nic` payload.
pub fn rules_document(groups: &[SecurityGroup]) -> serde_json::Result<String> {
    serde_json::to_string(&flatten_rules(groups))
}
