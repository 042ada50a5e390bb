//! Instance teardown.

use tracing::{debug, info};

use vmgrid_core::RequestContext;
use vmgrid_placement::PlacementDirective;
use vmgrid_state::*;

use crate::error::{ProvisionError, ProvisionResult};
use crate::orchestrator::{Orchestrator, adjust_workers_in};

/// Hostname prefix of instances that count as cluster workers.
const WORKER_PREFIX: &str = "worker-";

impl Orchestrator {
    /// Delete an instance and everything hanging off it.
    ///
    /// Collaborator and fleet calls run first against a snapshot of the
    /// instance's dependents. The catalog changes are applied afterwards in
    /// one short transaction, so a failure anywhere leaves the instance
    /// row, its interfaces and its dependents as they were. Remote commands
    /// already sent are not undone.
    pub async fn delete(&self, ctx: &RequestContext, id: InstanceId) -> ProvisionResult<()> {
        let instance = self.state.require::<Instance>(id)?;
        let fips = self.state.floating_ips_for_instance(id)?;
        let volumes = self.state.volumes_for_instance(id)?;
        let ifaces = self.state.interfaces_for_instance(id)?;

        for fip in &fips {
            self.floating_ips
                .delete(ctx, fip.id)
                .await
                .map_err(|message| ProvisionError::FloatingIp {
                    id: fip.id,
                    message,
                })?;
            debug!(instance = id, floating_ip = fip.id, "floating ip released");
        }

        for volume in &volumes {
            self.volumes
                .update(ctx, volume.id, "", 0)
                .await
                .map_err(|message| ProvisionError::Volume {
                    id: volume.id,
                    message,
                })?;
            debug!(instance = id, volume = volume.id, "volume detached");
        }

        if let Some(host) = instance.hyper {
            let command = self.scripts.clear_vm(id);
            self.dispatcher
                .execute(ctx, &PlacementDirective::direct(host), &command)
                .await?;
        }

        self.network.unbind_interfaces(ctx, &ifaces).await?;

        self.state.write(|txn| {
            // A concurrent delete may have won while the fleet was busy.
            txn.require::<Instance>(id)?;
            if let Some(cluster) = instance.cluster_id
                && instance.hostname.starts_with(WORKER_PREFIX)
            {
                adjust_workers_in(txn, cluster, -1)?;
            }
            for fip in &fips {
                txn.remove::<FloatingIp>(fip.id)?;
            }
            for volume in &volumes {
                if let Some(current) = txn.get::<Volume>(volume.id)? {
                    txn.put(&Volume {
                        instance_id: None,
                        ..current
                    })?;
                }
            }
            for iface in &ifaces {
                txn.remove::<Interface>(iface.id)?;
            }
            txn.remove::<Instance>(id)?;
            Ok(())
        })?;
        info!(
            instance = id,
            hostname = %instance.hostname,
            interfaces = ifaces.len(),
            "instance deleted"
        );
        Ok(())
    }
}
