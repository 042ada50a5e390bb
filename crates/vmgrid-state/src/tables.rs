//! redb table definitions for the VmGrid catalog.
//!
//! Record tables use `u64` keys and `&[u8]` values (JSON-serialized domain
//! types). Most are keyed by their own id; hypervisors are keyed by host id
//! and netlinks by VLAN id, which makes "one netlink per VLAN" a property of
//! the key space.

use redb::TableDefinition;

/// Per-table id sequences keyed by table name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const INSTANCES: TableDefinition<u64, &[u8]> = TableDefinition::new("instances");
pub const FLAVORS: TableDefinition<u64, &[u8]> = TableDefinition::new("flavors");
pub const IMAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("images");
pub const SUBNETS: TableDefinition<u64, &[u8]> = TableDefinition::new("subnets");

/// VLAN bindings keyed by VLAN id.
pub const NETLINKS: TableDefinition<u64, &[u8]> = TableDefinition::new("netlinks");

pub const INTERFACES: TableDefinition<u64, &[u8]> = TableDefinition::new("interfaces");

/// Hypervisors keyed by host id.
pub const HYPERS: TableDefinition<u64, &[u8]> = TableDefinition::new("hypers");

pub const KEYS: TableDefinition<u64, &[u8]> = TableDefinition::new("keys");
pub const SECGROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("secgroups");
pub const CLUSTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("clusters");
pub const FLOATING_IPS: TableDefinition<u64, &[u8]> = TableDefinition::new("floating_ips");
pub const VOLUMES: TableDefinition<u64, &[u8]> = TableDefinition::new("volumes");

pub const RECORD_TABLES: [TableDefinition<u64, &[u8]>; 12] = [
    INSTANCES,
    FLAVORS,
    IMAGES,
    SUBNETS,
    NETLINKS,
    INTERFACES,
    HYPERS,
    KEYS,
    SECGROUPS,
    CLUSTERS,
    FLOATING_IPS,
    VOLUMES,
];
