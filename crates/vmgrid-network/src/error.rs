//! Network error types.

use thiserror::Error;
use vmgrid_dispatch::DispatchError;
use vmgrid_state::{InstanceId, StateError, SubnetId, ZoneId};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("subnet {subnet} is malformed: {reason}")]
    InvalidSubnet { subnet: SubnetId, reason: String },

    #[error("address {address} is not a usable host address of subnet {subnet}")]
    InvalidAddress { address: String, subnet: SubnetId },

    #[error("address {address} is already in use on subnet {subnet}")]
    AddressInUse { address: String, subnet: SubnetId },

    #[error("invalid mac address {mac:?}: {reason}")]
    InvalidMac { mac: String, reason: &'static str },

    #[error("subnet {subnet} has no free address left")]
    SubnetExhausted { subnet: SubnetId },

    #[error("subnet {subnet} does not span zone {zone}")]
    ZoneMismatch { subnet: SubnetId, zone: ZoneId },

    #[error("instance {instance} already has an interface on subnet {subnet}")]
    DuplicateSubnet {
        instance: InstanceId,
        subnet: SubnetId,
    },

    #[error("{failed} of {attempted} interface teardowns failed, first: {first}")]
    Teardown {
        failed: usize,
        attempted: usize,
        first: Box<NetworkError>,
    },

    #[error("failed to encode security rules: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl NetworkError {
    /// Malformed or disallowed caller input.
    pub fn is_validation(&self) -> bool {
        match self {
            NetworkError::InvalidAddress { .. }
            | NetworkError::AddressInUse { .. }
            | NetworkError::InvalidMac { .. }
            | NetworkError::SubnetExhausted { .. }
            | NetworkError::ZoneMismatch { .. }
            | NetworkError::DuplicateSubnet { .. } => true,
            NetworkError::Teardown { first, .. } => first.is_validation(),
            _ => false,
        }
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
