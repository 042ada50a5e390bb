//! Placement directives: the typed form of the fleet's control string.
//!
//! The remote scheduler understands three directive shapes:
//!
//! ```text
//! inter=<hostid> [<resource-spec>]          pin to one host
//! select=<group-token> <resource-spec>      scheduler picks from a group
//! toall=vlan-<vlan>:<hostA>,<hostB>         broadcast to a VLAN's two hosts
//! ```
//!
//! The core only ever builds [`PlacementDirective`] values; the string form
//! is produced once, by `Display`, at the dispatch boundary.

use std::fmt;

use vmgrid_state::{Flavor, HostId, Netlink, VlanId, ZoneId};

/// Resources a command needs on its target host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceSpec {
    pub cpu: u32,
    /// KiB.
    pub memory: u64,
    /// KiB.
    pub disk: u64,
    pub network: u32,
}

impl ResourceSpec {
    /// Full footprint of a flavor: memory in KiB, all disks summed in KiB.
    pub fn for_flavor(flavor: &Flavor) -> Self {
        let disk_gib =
            u64::from(flavor.disk) + u64::from(flavor.swap) + u64::from(flavor.ephemeral);
        Self {
            cpu: flavor.cpu,
            memory: u64::from(flavor.memory) * 1024,
            disk: disk_gib * 1024 * 1024,
            network: 0,
        }
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={} memory={} disk={} network={}",
            self.cpu, self.memory, self.disk, self.network
        )
    }
}

/// Names the set of zone/type-eligible hosts: `group-zone-<zone>:<h1>,<h2>,...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupToken(String);

impl GroupToken {
    /// Hosts are kept in the order given (catalog scan order).
    pub fn new(zone: ZoneId, hosts: &[HostId]) -> Self {
        let hosts: Vec<String> = hosts.iter().map(ToString::to_string).collect();
        Self(format!("group-zone-{zone}:{}", hosts.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which host(s) should execute a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementDirective {
    /// Nothing to address; dispatching it is a no-op.
    None,
    Direct {
        host: HostId,
        resources: Option<ResourceSpec>,
    },
    Group {
        token: GroupToken,
        resources: ResourceSpec,
    },
    FanOut {
        vlan: VlanId,
        host_a: HostId,
        host_b: HostId,
    },
}

impl PlacementDirective {
    pub fn direct(host: HostId) -> Self {
        PlacementDirective::Direct {
            host,
            resources: None,
        }
    }

    /// Pin to `host` if there is one, otherwise a no-op directive.
    pub fn on_host(host: Option<HostId>) -> Self {
        host.map_or(PlacementDirective::None, Self::direct)
    }

    /// Address whichever host(s) currently serve a VLAN.
    ///
    /// Two distinct bound hosts fan out; a single (or duplicated) binding
    /// degrades to a direct directive; an unbound VLAN yields `None`.
    pub fn for_netlink(netlink: &Netlink) -> Self {
        match (netlink.hyper, netlink.peer) {
            (Some(a), Some(b)) if a != b => PlacementDirective::FanOut {
                vlan: netlink.vlan,
                host_a: a,
                host_b: b,
            },
            (Some(host), _) | (None, Some(host)) => Self::direct(host),
            (None, None) => PlacementDirective::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PlacementDirective::None)
    }
}

impl fmt::Display for PlacementDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementDirective::None => Ok(()),
            PlacementDirective::Direct {
                host,
                resources: None,
            } => write!(f, "inter={host}"),
            PlacementDirective::Direct {
                host,
                resources: Some(spec),
            } => write!(f, "inter={host} {spec}"),
            PlacementDirective::Group { token, resources } => {
                write!(f, "select={token} {resources}")
            }
            PlacementDirective::FanOut {
                vlan,
                host_a,
                host_b,
            } => write!(f, "toall=vlan-{vlan}:{host_a},{host_b}"),
        }
    }
}
