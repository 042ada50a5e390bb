//! VmGrid network: virtual NIC lifecycle.
//!
//! Interfaces get an address and MAC from their subnet, are bound to the
//! subnet's VLAN (creating the VLAN binding lazily, never overwriting an
//! existing one), and have forwarding state installed on whichever
//! hypervisor(s) serve that VLAN. Reconciliation diffs an instance's
//! interface set against a desired subnet list.
//!
//! # Components
//!
//! - **`allocator`**: address pools, MAC validation and generation
//! - **`interface`**: create/delete against catalog and fleet
//! - **`reconcile`**: detach-then-attach set reconciliation
//! - **`security`**: security rule flattening for agent payloads

pub mod allocator;
pub mod error;
pub mod interface;
pub mod reconcile;
pub mod security;

#[cfg(test)]
mod fixtures;

pub use allocator::{AddressPool, generate_mac, normalize_mac};
pub use error::{NetworkError, NetworkResult};
pub use interface::{InterfaceManager, InterfaceSpec};
pub use reconcile::{Reconciliation, next_interface_index};
pub use security::{SecurityRecord, flatten_rules, rules_document};
