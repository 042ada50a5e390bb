//! Operation inputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use vmgrid_state::{HostId, SubnetId, ZoneId};

use crate::error::ProvisionError;

/// Input to [`Orchestrator::create`](crate::Orchestrator::create).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRequest {
    pub count: u32,
    /// Hostname, or hostname prefix when `count > 1`.
    pub hostname: String,
    pub userdata: String,
    /// `None` only for cluster workers.
    pub image: Option<u64>,
    pub flavor: u64,
    pub primary_subnet: SubnetId,
    /// Pinned primary address; only valid for a single instance.
    pub primary_address: Option<String>,
    pub primary_mac: Option<String>,
    pub secondary_subnets: Vec<SubnetId>,
    pub keys: Vec<u64>,
    pub secgroups: Vec<u64>,
    pub zone: Option<ZoneId>,
    pub cluster: Option<u64>,
    /// Role advertised to cluster workers.
    pub service: String,
    /// Pin every instance of the batch to this hypervisor.
    pub hyper: Option<HostId>,
}

impl CreateRequest {
    /// Hostname of the `index`-th (0-based) instance of the batch.
    pub fn hostname_for(&self, index: u32) -> String {
        if self.count == 1 {
            self.hostname.clone()
        } else {
            format!("{}-{}", self.hostname, index + 1)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ProvisionError> {
        if self.count == 0 {
            return Err(ProvisionError::InvalidRequest(
                "count must be at least 1".to_string(),
            ));
        }
        if self.hostname.trim().is_empty() {
            return Err(ProvisionError::InvalidRequest(
                "hostname must not be empty".to_string(),
            ));
        }
        let pinned = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if self.count > 1 && (pinned(&self.primary_address) || pinned(&self.primary_mac)) {
            return Err(ProvisionError::InvalidRequest(
                "a pinned primary address or mac needs count = 1".to_string(),
            ));
        }
        if self.image.is_none() && self.cluster.is_none() {
            return Err(ProvisionError::ImageRequired);
        }
        Ok(())
    }
}

/// Input to [`Orchestrator::update`](crate::Orchestrator::update). Every
/// field left as `None` is left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateRequest {
    pub flavor: Option<u64>,
    pub hostname: Option<String>,
    pub action: Option<InstanceAction>,
    /// Desired subnet set; `None` skips interface reconciliation.
    pub subnets: Option<Vec<SubnetId>>,
    /// Security groups for newly attached interfaces.
    pub secgroups: Vec<u64>,
    /// Migration target.
    pub hyper: Option<HostId>,
}

/// Lifecycle actions understood by the hypervisor agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceAction {
    Start,
    Shutdown,
    Destroy,
    Suspend,
    Resume,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Shutdown => "shutdown",
            InstanceAction::Destroy => "destroy",
            InstanceAction::Suspend => "suspend",
            InstanceAction::Resume => "resume",
        }
    }
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceAction {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(InstanceAction::Start),
            "shutdown" => Ok(InstanceAction::Shutdown),
            "destroy" => Ok(InstanceAction::Destroy),
            "suspend" => Ok(InstanceAction::Suspend),
            "resume" => Ok(InstanceAction::Resume),
            other => Err(ProvisionError::UnknownAction(other.to_string())),
        }
    }
}

/// Sortable instance columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Hostname,
    Status,
    CreatedAt,
    UpdatedAt,
}

/// A column with a direction. Parsed from `created_at`, `-created_at`
/// (descending), `+hostname`, or `hostname desc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for SortOrder {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let (column, descending) = if let Some(rest) = s.strip_prefix('-') {
            (rest, true)
        } else if let Some(rest) = s.strip_prefix('+') {
            (rest, false)
        } else {
            match s.split_once(char::is_whitespace) {
                Some((column, dir)) => match dir.trim().to_ascii_lowercase().as_str() {
                    "desc" => (column, true),
                    "asc" => (column, false),
                    _ => return Err(ProvisionError::InvalidRequest(format!("bad order {s:?}"))),
                },
                None => (s, false),
            }
        };
        let field = match column {
            "id" => SortField::Id,
            "hostname" => SortField::Hostname,
            "status" => SortField::Status,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            other => {
                return Err(ProvisionError::InvalidRequest(format!(
                    "cannot order by {other:?}"
                )));
            }
        };
        Ok(Self { field, descending })
    }
}

/// Input to [`Orchestrator::list`](crate::Orchestrator::list).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub offset: u64,
    /// `0` means the configured page size.
    pub limit: u64,
    /// Empty means newest first.
    pub order: String,
    /// Hostname substring filter.
    pub query: String,
}
