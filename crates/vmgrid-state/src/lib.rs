//! vmgrid-state: the catalog for VmGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds instances, flavors, images,
//! subnets, VLAN bindings (netlinks), interfaces, hypervisors, keys,
//! security groups, clusters, floating IPs, and volumes.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns
//! and keyed by a `u64` id. Ids are handed out by a per-table sequence
//! stored in the same database, so they are allocated inside the write
//! transaction that inserts the row.
//!
//! Reads go through [`CatalogRead`], implemented by both [`StateStore`]
//! (a fresh read transaction per call) and [`WriteTxn`] (reads see the
//! transaction's own uncommitted writes). redb admits a single writer at a
//! time, which is what serializes address allocation and VLAN binding
//! creation across concurrent requests.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{CatalogRead, Record, StateStore, WriteTxn};
pub use types::*;
