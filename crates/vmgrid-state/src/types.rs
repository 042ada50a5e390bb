//! Domain types for the VmGrid catalog.
//!
//! These types represent the persisted state of instances and the fleet
//! and network resources they consume. All types are serializable to/from
//! JSON for storage in redb tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

pub type InstanceId = u64;
pub type SubnetId = u64;
pub type ZoneId = u64;
/// Stable hypervisor host id, as known to the remote fleet.
pub type HostId = u32;
pub type VlanId = u32;

// ── Instance ──────────────────────────────────────────────────────

/// A virtual machine owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub hostname: String,
    /// `None` for cluster workers booted without an image.
    pub image_id: Option<u64>,
    pub flavor_id: u64,
    pub cluster_id: Option<u64>,
    pub zone_id: ZoneId,
    /// Hypervisor currently hosting the instance; `None` when unassigned.
    pub hyper: Option<HostId>,
    pub status: InstanceStatus,
    pub userdata: String,
    pub creator: u64,
    pub owner: u64,
    /// Unix timestamp (seconds) when the row was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last mutation.
    pub updated_at: u64,
}

/// Lifecycle status of an instance, as last reported by its hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Running,
    ShutOff,
    Suspended,
    Migrating,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Running => "running",
            InstanceStatus::ShutOff => "shut_off",
            InstanceStatus::Suspended => "suspended",
            InstanceStatus::Migrating => "migrating",
            InstanceStatus::Error => "error",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstanceStatus::Pending),
            "running" => Ok(InstanceStatus::Running),
            "shut_off" => Ok(InstanceStatus::ShutOff),
            "suspended" => Ok(InstanceStatus::Suspended),
            "migrating" => Ok(InstanceStatus::Migrating),
            "error" => Ok(InstanceStatus::Error),
            other => Err(StateError::UnknownStatus(other.to_string())),
        }
    }
}

// ── Sizing and images ─────────────────────────────────────────────

/// Immutable sizing template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flavor {
    pub id: u64,
    pub name: String,
    pub cpu: u32,
    /// Memory in MiB.
    pub memory: u32,
    /// Root disk in GiB.
    pub disk: u32,
    /// Swap in GiB.
    pub swap: u32,
    /// Ephemeral disk in GiB.
    pub ephemeral: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: u64,
    pub name: String,
    /// Disk format suffix, e.g. `qcow2`.
    pub format: String,
    pub status: ImageStatus,
    /// Virtualization type advertised to the guest (`kvm-x86_64`, `zvm`, ...).
    pub virt_type: String,
    /// Hypervisor type tag used to filter placement; empty means any.
    pub hypervisor_type: String,
    pub os_version: String,
    pub disk_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Available,
    Downloading,
    Error,
}

// ── Network ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subnet {
    pub id: SubnetId,
    pub name: String,
    /// Network address, e.g. `10.0.0.0`.
    pub network: String,
    /// Dotted netmask, e.g. `255.255.255.0`.
    pub netmask: String,
    /// Gateway, possibly with a prefix suffix (`10.0.0.1/24`).
    pub gateway: String,
    pub vlan: VlanId,
    pub name_server: String,
    pub domain_search: String,
    pub vswitch: String,
    /// Zones this subnet spans, in the catalog's natural order.
    pub zones: Vec<ZoneId>,
}

impl Subnet {
    /// Gateway address without any prefix suffix.
    pub fn gateway_address(&self) -> &str {
        self.gateway.split('/').next().unwrap_or_default()
    }

    pub fn spans_zone(&self, zone: ZoneId) -> bool {
        self.zones.contains(&zone)
    }
}

/// L2 segment binding: which hypervisor(s) currently serve a VLAN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Netlink {
    pub vlan: VlanId,
    pub hyper: Option<HostId>,
    /// Redundant binding partner.
    pub peer: Option<HostId>,
    pub creator: u64,
    pub owner: u64,
}

/// Allocated address; `address` carries the prefix length (`10.0.0.5/24`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub address: String,
    pub subnet_id: SubnetId,
}

impl Address {
    /// Bare IP without the prefix length.
    pub fn ip(&self) -> &str {
        self.address.split('/').next().unwrap_or_default()
    }
}

/// Virtual NIC attached to an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interface {
    pub id: u64,
    /// Device name, `ethN`.
    pub name: String,
    pub instance_id: InstanceId,
    pub address: Address,
    pub mac: String,
    pub mtu: u32,
    pub secgroups: Vec<u64>,
}

impl Interface {
    /// The `N` of an `ethN` device name.
    pub fn index(&self) -> Option<u32> {
        self.name.strip_prefix("eth")?.parse().ok()
    }
}

// ── Fleet ─────────────────────────────────────────────────────────

/// A hypervisor host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hyper {
    pub host_id: HostId,
    pub hostname: String,
    pub zone_id: ZoneId,
    /// Type tag matched against `Image::hypervisor_type`.
    pub hyper_type: String,
}

// ── Access ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Key {
    pub id: u64,
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityGroup {
    pub id: u64,
    pub name: String,
    pub rules: Vec<SecurityRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityRule {
    pub remote_ip: String,
    pub remote_group: String,
    /// `ingress` or `egress`.
    pub direction: String,
    /// `ipv4` or `ipv6`.
    pub ip_version: String,
    pub protocol: String,
    pub port_min: i32,
    pub port_max: i32,
}

// ── Dependents ────────────────────────────────────────────────────

/// Container-platform cluster whose workers are instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: u64,
    pub name: String,
    /// Platform version embedded in worker boot metadata.
    pub version: String,
    pub worker_num: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FloatingIp {
    pub id: u64,
    pub address: String,
    pub instance_id: Option<InstanceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    pub id: u64,
    pub name: String,
    /// Size in GiB.
    pub size: u32,
    pub instance_id: Option<InstanceId>,
}
