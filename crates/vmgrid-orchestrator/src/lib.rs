//! vmgrid-orchestrator: instance lifecycle for VmGrid.
//!
//! Drives create, lifecycle actions, composite update (migrate, resize,
//! rename, NIC reconciliation), delete and listing against the catalog,
//! the placement resolver, the network layer and the remote fleet.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── StateStore (instances, flavors, images, clusters, dependents)
//!   ├── placement (zone → group token or pinned host)
//!   ├── InterfaceManager (addresses, MACs, VLAN bindings)
//!   ├── build_metadata (boot document per instance)
//!   ├── Dispatcher (one remote command at a time)
//!   └── FloatingIpService / VolumeService (teardown collaborators)
//! ```

pub mod collaborators;
pub mod delete;
pub mod error;
pub mod list;
pub mod orchestrator;
pub mod request;
pub mod update;

pub use collaborators::{
    CollabFuture, DryRunFloatingIps, DryRunVolumes, FloatingIpService, VolumeService,
};
pub use error::{ErrorClass, ProvisionError, ProvisionResult};
pub use list::{InstancePage, InstanceView};
pub use orchestrator::Orchestrator;
pub use request::{CreateRequest, InstanceAction, ListQuery, SortField, SortOrder, UpdateRequest};
pub use update::{ResizePlan, Updated, plan_resize};
