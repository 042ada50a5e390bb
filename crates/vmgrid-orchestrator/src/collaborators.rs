//! Floating-IP and volume subsystems, as seen from instance teardown.
//!
//! Both are called while the delete transaction is open, so an
//! implementation must not write to the catalog itself; the orchestrator
//! mirrors each success into the transaction. Both calls must be idempotent
//! so that a rolled-back delete can be retried.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use vmgrid_core::RequestContext;
use vmgrid_state::Volume;

/// Boxed future returned by the collaborator traits.
pub type CollabFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

pub trait FloatingIpService: Send + Sync {
    fn delete<'a>(&'a self, ctx: &'a RequestContext, id: u64) -> CollabFuture<'a, ()>;
}

pub trait VolumeService: Send + Sync {
    /// Rename/resize a volume. An empty name and zero size detach it.
    fn update<'a>(
        &'a self,
        ctx: &'a RequestContext,
        id: u64,
        name: &'a str,
        size: u32,
    ) -> CollabFuture<'a, Volume>;
}

/// Acknowledges every call and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunFloatingIps;

impl FloatingIpService for DryRunFloatingIps {
    fn delete<'a>(&'a self, _ctx: &'a RequestContext, id: u64) -> CollabFuture<'a, ()> {
        info!(floating_ip = id, "dry-run floating ip release");
        Box::pin(async { Ok(()) })
    }
}

/// Acknowledges every call and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunVolumes;

impl VolumeService for DryRunVolumes {
    fn update<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        id: u64,
        name: &'a str,
        size: u32,
    ) -> CollabFuture<'a, Volume> {
        info!(volume = id, name, size, "dry-run volume update");
        Box::pin(async move {
            Ok(Volume {
                id,
                name: name.to_string(),
                size,
                instance_id: None,
            })
        })
    }
}
