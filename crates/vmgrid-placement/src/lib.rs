//! VmGrid placement: where a command runs.
//!
//! This crate decides *where* without touching the fleet: it resolves the
//! zone an instance lands in, the set of hypervisors eligible to host it,
//! and encodes the decision as a [`PlacementDirective`]. Dispatching the
//! directive is `vmgrid-dispatch`'s job.
//!
//! # Components
//!
//! - **`directive`**: typed directives, resource specs, group tokens
//! - **`resolver`**: zone resolution, group selection, explicit host checks

pub mod directive;
pub mod error;
pub mod resolver;

pub use directive::{GroupToken, PlacementDirective, ResourceSpec};
pub use error::{PlacementError, PlacementResult};
pub use resolver::{eligible_hosts, resolve_group, resolve_zone, validate_explicit_host};
