//! Metadata synthesis error types.

use thiserror::Error;
use vmgrid_network::NetworkError;
use vmgrid_state::SubnetId;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("allocation on subnet {subnet} failed: {source}")]
    Allocation {
        subnet: SubnetId,
        #[source]
        source: NetworkError,
    },

    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MetadataError {
    pub fn network(&self) -> Option<&NetworkError> {
        match self {
            MetadataError::Allocation { source, .. } => Some(source),
            MetadataError::Encode(_) => None,
        }
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;
