//! Composite update: migrate, resize, rename, lifecycle action, NIC diff.

use tracing::info;

use vmgrid_core::RequestContext;
use vmgrid_network::Reconciliation;
use vmgrid_placement::{PlacementDirective, ResourceSpec, validate_explicit_host};
use vmgrid_state::*;

use crate::error::{ProvisionError, ProvisionResult};
use crate::orchestrator::{Orchestrator, epoch_secs, placed_on};
use crate::request::UpdateRequest;

/// Result of [`Orchestrator::update`].
#[derive(Debug)]
pub struct Updated {
    pub instance: Instance,
    pub migrated: bool,
    pub resized: bool,
    pub renamed: bool,
    pub interfaces: Reconciliation,
}

/// Resize plan: the new flavor and what the host must add.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizePlan {
    pub flavor: Flavor,
    pub growth: ResourceSpec,
    /// Root plus ephemeral disk growth in GiB.
    pub disk_delta: u32,
}

/// Validate a flavor change and compute the growth the host must provide.
///
/// Disks never shrink; cpu and memory deltas are floored at zero.
pub fn plan_resize(current: &Flavor, target: &Flavor) -> ProvisionResult<ResizePlan> {
    if target.disk < current.disk || target.ephemeral < current.ephemeral {
        return Err(ProvisionError::ShrinkNotAllowed {
            from: current.id,
            to: target.id,
        });
    }
    let disk_delta = (target.disk - current.disk) + (target.ephemeral - current.ephemeral);
    Ok(ResizePlan {
        flavor: target.clone(),
        growth: ResourceSpec {
            cpu: target.cpu.saturating_sub(current.cpu),
            memory: u64::from(target.memory.saturating_sub(current.memory)),
            disk: u64::from(disk_delta),
            network: 0,
        },
        disk_delta,
    })
}

impl Orchestrator {
    /// Apply every requested change, in order: migrate, resize, rename,
    /// lifecycle action, interface reconciliation.
    ///
    /// All preconditions are checked before the first command goes out. A
    /// failing step stops the remaining ones; earlier steps stay applied.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: InstanceId,
        req: &UpdateRequest,
    ) -> ProvisionResult<Updated> {
        let mut instance = self.state.require::<Instance>(id)?;

        let migrate_to = req.hyper.filter(|&target| instance.hyper != Some(target));
        if let Some(target) = migrate_to {
            if instance.status != InstanceStatus::ShutOff {
                return Err(ProvisionError::MigrationRequiresShutdown {
                    instance: id,
                    status: instance.status,
                });
            }
            placed_on(&instance)?;
            validate_explicit_host(&self.state, target, instance.zone_id)?;
        }

        let resize = match req.flavor.filter(|&f| f != instance.flavor_id) {
            Some(flavor_id) => {
                if instance.status == InstanceStatus::Running {
                    return Err(ProvisionError::ResizeWhileRunning { instance: id });
                }
                let current = self.state.require::<Flavor>(instance.flavor_id)?;
                let target = self.state.require::<Flavor>(flavor_id)?;
                let plan = plan_resize(&current, &target)?;
                placed_on(&instance)?;
                Some(plan)
            }
            None => None,
        };

        let rename = req
            .hostname
            .as_deref()
            .filter(|h| !h.is_empty() && *h != instance.hostname)
            .map(str::to_string);
        if req.action.is_some() {
            placed_on(&instance)?;
        }
        let secgroups: Vec<SecurityGroup> = match &req.subnets {
            Some(subnets) => {
                let current = self.state.interfaces_for_instance(id)?;
                self.network.subnets_to_attach(&instance, &current, subnets)?;
                self.state.require_all(&req.secgroups)?
            }
            None => Vec::new(),
        };

        // (1) migrate, addressed to the current host.
        if let Some(target) = migrate_to {
            let host = placed_on(&instance)?;
            let command = self.scripts.migrate_vm(id, target);
            self.dispatcher
                .execute(ctx, &PlacementDirective::direct(host), &command)
                .await?;
            info!(instance = id, from = host, to = target, "migration dispatched");
        }

        // (2) resize
        if let Some(plan) = &resize {
            let host = placed_on(&instance)?;
            let directive = PlacementDirective::Direct {
                host,
                resources: Some(plan.growth),
            };
            let command = self.scripts.resize_vm(id, &plan.flavor, plan.disk_delta);
            self.dispatcher.execute(ctx, &directive, &command).await?;

            instance.flavor_id = plan.flavor.id;
            instance.updated_at = epoch_secs();
            self.state.put(&instance)?;
            info!(instance = id, flavor = plan.flavor.id, "resize dispatched");
        }

        // (3) rename, catalog only.
        if let Some(hostname) = &rename {
            instance.hostname = hostname.clone();
            instance.updated_at = epoch_secs();
            self.state.put(&instance)?;
            info!(instance = id, %hostname, "instance renamed");
        }

        // (4) lifecycle action
        if let Some(action) = req.action {
            self.dispatch_action(ctx, &instance, action).await?;
        }

        // (5) NIC reconciliation
        let interfaces = match &req.subnets {
            Some(subnets) => {
                self.network
                    .reconcile_interfaces(ctx, &instance, subnets, &secgroups)
                    .await?
            }
            None => Reconciliation::default(),
        };

        Ok(Updated {
            instance,
            migrated: migrate_to.is_some(),
            resized: resize.is_some(),
            renamed: rename.is_some(),
            interfaces,
        })
    }
}
