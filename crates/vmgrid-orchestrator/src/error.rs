//! Orchestrator error types and their user-facing classification.

use std::fmt;

use thiserror::Error;

use vmgrid_dispatch::DispatchError;
use vmgrid_metadata::MetadataError;
use vmgrid_network::NetworkError;
use vmgrid_placement::PlacementError;
use vmgrid_state::{InstanceId, InstanceStatus, StateError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("image {image} is not available")]
    ImageUnavailable { image: u64 },

    #[error("an image is required unless booting a cluster worker")]
    ImageRequired,

    #[error("instance {instance} must be shut off before migration (status {status})")]
    MigrationRequiresShutdown {
        instance: InstanceId,
        status: InstanceStatus,
    },

    #[error("instance {instance} must be shut off before resize")]
    ResizeWhileRunning { instance: InstanceId },

    #[error("flavor {to} would shrink the disks of flavor {from}")]
    ShrinkNotAllowed { from: u64, to: u64 },

    #[error("instance {instance} is not placed on any hypervisor")]
    NotPlaced { instance: InstanceId },

    #[error("unknown instance action {0:?}")]
    UnknownAction(String),

    #[error("floating ip {id} could not be released: {message}")]
    FloatingIp { id: u64, message: String },

    #[error("volume {id} could not be detached: {message}")]
    Volume { id: u64, message: String },

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Failure taxonomy reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or disallowed input; nothing was mutated.
    Validation,
    /// A referenced record does not exist; nothing was mutated.
    NotFound,
    /// No host can take the request; no instance row was created.
    Scheduling,
    /// A remote call failed; catalog state may already have changed.
    RemoteExecution,
    /// Catalog read/write failure.
    Persistence,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Validation => "validation",
            ErrorClass::NotFound => "not found",
            ErrorClass::Scheduling => "scheduling",
            ErrorClass::RemoteExecution => "remote execution",
            ErrorClass::Persistence => "persistence",
        };
        f.write_str(s)
    }
}

impl ProvisionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProvisionError::InvalidRequest(_)
            | ProvisionError::ImageUnavailable { .. }
            | ProvisionError::ImageRequired
            | ProvisionError::MigrationRequiresShutdown { .. }
            | ProvisionError::ResizeWhileRunning { .. }
            | ProvisionError::ShrinkNotAllowed { .. }
            | ProvisionError::NotPlaced { .. }
            | ProvisionError::UnknownAction(_) => ErrorClass::Validation,
            ProvisionError::FloatingIp { .. }
            | ProvisionError::Volume { .. }
            | ProvisionError::Dispatch(_) => ErrorClass::RemoteExecution,
            ProvisionError::Placement(err) => placement_class(err),
            ProvisionError::Network(err) => network_class(err),
            ProvisionError::Metadata(MetadataError::Allocation { source, .. }) => {
                network_class(source)
            }
            ProvisionError::Metadata(MetadataError::Encode(_)) => ErrorClass::Persistence,
            ProvisionError::State(err) => state_class(err),
        }
    }
}

fn state_class(err: &StateError) -> ErrorClass {
    match err {
        StateError::NotFound { .. } => ErrorClass::NotFound,
        StateError::UnknownStatus(_) => ErrorClass::Validation,
        _ => ErrorClass::Persistence,
    }
}

fn placement_class(err: &PlacementError) -> ErrorClass {
    match err {
        PlacementError::NoEligibleHost { .. } => ErrorClass::Scheduling,
        PlacementError::State(err) => state_class(err),
        PlacementError::ZoneMismatch { .. }
        | PlacementError::NoCommonZone { .. }
        | PlacementError::HostZoneMismatch { .. } => ErrorClass::Validation,
    }
}

fn network_class(err: &NetworkError) -> ErrorClass {
    match err {
        NetworkError::Teardown { first, .. } => network_class(first),
        NetworkError::Dispatch(_) => ErrorClass::RemoteExecution,
        NetworkError::State(err) => state_class(err),
        NetworkError::Encode(_) => ErrorClass::Persistence,
        NetworkError::InvalidSubnet { .. } => ErrorClass::Validation,
        other if other.is_validation() => ErrorClass::Validation,
        _ => ErrorClass::Persistence,
    }
}
