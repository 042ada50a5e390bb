//! Placement error types.

use thiserror::Error;
use vmgrid_state::{HostId, StateError, SubnetId, ZoneId};

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("subnet {subnet} doesn't cross zone {zone}")]
    ZoneMismatch { subnet: SubnetId, zone: ZoneId },

    #[error("no zone is shared by primary subnet {primary} and all secondary subnets")]
    NoCommonZone { primary: SubnetId },

    #[error("no qualified hypervisor in zone {zone} (type {hyper_type:?})")]
    NoEligibleHost { zone: ZoneId, hyper_type: String },

    #[error("hypervisor {host} is in zone {host_zone}, not zone {zone}")]
    HostZoneMismatch {
        host: HostId,
        host_zone: ZoneId,
        zone: ZoneId,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
