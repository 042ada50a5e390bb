//! Orchestrator: the instance lifecycle state machine.
//!
//! ```text
//! pending ──► running ◄──► shut_off ──► migrating ──► running | shut_off
//!    └──────────┴─────────────┴──────────────┴──────► deleted
//! ```
//!
//! The orchestrator issues commands and records intent; status transitions
//! become visible when the hypervisor agent reports back through
//! [`Orchestrator::apply_agent_report`]. Commands within one operation are
//! strictly sequential.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use vmgrid_core::{RequestContext, VmgridConfig};
use vmgrid_dispatch::{Dispatcher, RemoteExec, ScriptSet};
use vmgrid_metadata::{MetadataError, MetadataRequest, build_metadata};
use vmgrid_network::InterfaceManager;
use vmgrid_placement::{
    PlacementDirective, ResourceSpec, resolve_group, resolve_zone, validate_explicit_host,
};
use vmgrid_state::*;

use crate::collaborators::{FloatingIpService, VolumeService};
use crate::error::{ProvisionError, ProvisionResult};
use crate::request::{CreateRequest, InstanceAction};

pub struct Orchestrator {
    pub(crate) state: StateStore,
    pub(crate) network: InterfaceManager,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) scripts: ScriptSet,
    pub(crate) floating_ips: Arc<dyn FloatingIpService>,
    pub(crate) volumes: Arc<dyn VolumeService>,
    pub(crate) page_size: u64,
}

impl Orchestrator {
    pub fn new(
        state: StateStore,
        exec: Arc<dyn RemoteExec>,
        floating_ips: Arc<dyn FloatingIpService>,
        volumes: Arc<dyn VolumeService>,
        config: &VmgridConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(exec);
        let scripts = ScriptSet::new(config.scripts.dir.clone());
        let network = InterfaceManager::new(
            state.clone(),
            dispatcher.clone(),
            scripts.clone(),
            &config.network,
        );
        Self {
            state,
            network,
            dispatcher,
            scripts,
            floating_ips,
            volumes,
            page_size: config.list.page_size.max(1),
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn network(&self) -> &InterfaceManager {
        &self.network
    }

    /// Provision `count` instances.
    ///
    /// Everything that can be checked is checked before the first row is
    /// written. A failure inside the batch stops it; instances created by
    /// earlier iterations are kept and returned nowhere, so the caller must
    /// reconcile them.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: &CreateRequest,
    ) -> ProvisionResult<Vec<Instance>> {
        req.validate()?;

        let image = match req.image {
            Some(id) => {
                let image = self.state.require::<Image>(id)?;
                if image.status != ImageStatus::Available {
                    return Err(ProvisionError::ImageUnavailable { image: id });
                }
                Some(image)
            }
            None => None,
        };
        let flavor = self.state.require::<Flavor>(req.flavor)?;
        let primary = self.state.require::<Subnet>(req.primary_subnet)?;
        let secondaries: Vec<Subnet> = self.state.require_all(&req.secondary_subnets)?;
        let cluster = req
            .cluster
            .map(|id| self.state.require::<Cluster>(id))
            .transpose()?;
        let keys: Vec<Key> = self.state.require_all(&req.keys)?;
        let secgroups: Vec<SecurityGroup> = self.state.require_all(&req.secgroups)?;

        let zone = resolve_zone(&primary, &secondaries, req.zone)?;
        let resources = ResourceSpec::for_flavor(&flavor);
        let directive = match req.hyper {
            Some(host) => {
                validate_explicit_host(&self.state, host, zone)?;
                PlacementDirective::Direct {
                    host,
                    resources: Some(resources),
                }
            }
            None => {
                let hyper_type = image
                    .as_ref()
                    .map(|i| i.hypervisor_type.as_str())
                    .unwrap_or_default();
                PlacementDirective::Group {
                    token: resolve_group(&self.state, hyper_type, zone)?,
                    resources,
                }
            }
        };
        debug!(zone, %directive, count = req.count, "placement resolved");

        let mut created = Vec::with_capacity(req.count as usize);
        for index in 0..req.count {
            let hostname = req.hostname_for(index);
            let now = epoch_secs();
            let instance = self.state.insert(|id| Instance {
                id,
                hostname: hostname.clone(),
                image_id: req.image,
                flavor_id: flavor.id,
                cluster_id: req.cluster,
                zone_id: zone,
                hyper: None,
                status: InstanceStatus::Pending,
                userdata: req.userdata.clone(),
                creator: ctx.user_id,
                owner: ctx.org_id,
                created_at: now,
                updated_at: now,
            })?;
            info!(instance = instance.id, %hostname, zone, "instance created");

            let metadata = build_metadata(
                ctx,
                &self.network,
                MetadataRequest {
                    instance: &instance,
                    primary: &primary,
                    primary_address: req.primary_address.as_deref(),
                    primary_mac: req.primary_mac.as_deref(),
                    secondaries: &secondaries,
                    keys: &keys,
                    userdata: &req.userdata,
                    secgroups: &secgroups,
                    image: image.as_ref(),
                    cluster: cluster.as_ref(),
                    service: &req.service,
                },
            )
            .await;
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.discard_pending(ctx, &instance).await;
                    return Err(err.into());
                }
            };

            let boot_name = if primary.domain_search.is_empty() {
                hostname
            } else {
                format!("{hostname}.{}", primary.domain_search)
            };
            let command = match (&image, &cluster) {
                (Some(image), _) => self.scripts.launch_vm(
                    instance.id,
                    &format!("image-{}.{}", image.id, image.format),
                    &boot_name,
                    &flavor,
                    metadata.document.to_base64().map_err(MetadataError::from)?,
                ),
                (None, Some(cluster)) => {
                    self.adjust_workers(cluster.id, 1)?;
                    self.scripts.oc_vm(
                        instance.id,
                        &flavor,
                        &boot_name,
                        metadata.document.to_json().map_err(MetadataError::from)?,
                    )
                }
                (None, None) => return Err(ProvisionError::ImageRequired),
            };
            self.dispatcher.execute(ctx, &directive, &command).await?;
            created.push(instance);
        }

        Ok(created)
    }

    /// Best-effort undo of a half-built instance: release whatever
    /// interfaces it got and drop its pending row.
    async fn discard_pending(&self, ctx: &RequestContext, instance: &Instance) {
        let ifaces = match self.state.interfaces_for_instance(instance.id) {
            Ok(ifaces) => ifaces,
            Err(err) => {
                warn!(instance = instance.id, error = %err, "cannot list interfaces to release");
                Vec::new()
            }
        };
        for iface in &ifaces {
            if let Err(err) = self.network.delete_interface(ctx, iface).await {
                warn!(instance = instance.id, interface = %iface.name, error = %err, "interface release failed");
            }
        }
        match self.state.remove::<Instance>(instance.id) {
            Ok(_) => info!(instance = instance.id, "pending instance discarded"),
            Err(err) => warn!(instance = instance.id, error = %err, "pending instance not removed"),
        }
    }

    pub(crate) fn adjust_workers(&self, cluster: u64, delta: i64) -> ProvisionResult<()> {
        self.state.write(|txn| adjust_workers_in(txn, cluster, delta))?;
        Ok(())
    }

    /// Send a lifecycle action to the instance's current host.
    ///
    /// Nothing is persisted; the new status arrives with the agent's report.
    pub async fn change_instance_status(
        &self,
        ctx: &RequestContext,
        id: InstanceId,
        action: InstanceAction,
    ) -> ProvisionResult<Instance> {
        let instance = self.state.require::<Instance>(id)?;
        self.dispatch_action(ctx, &instance, action).await?;
        Ok(instance)
    }

    pub(crate) async fn dispatch_action(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        action: InstanceAction,
    ) -> ProvisionResult<()> {
        let host = placed_on(instance)?;
        let command = self.scripts.action_vm(instance.id, action.as_str());
        self.dispatcher
            .execute(ctx, &PlacementDirective::direct(host), &command)
            .await?;
        info!(instance = instance.id, %action, host, "lifecycle action dispatched");
        Ok(())
    }

    /// Record the status and host the hypervisor agent reports.
    pub fn apply_agent_report(
        &self,
        id: InstanceId,
        status: InstanceStatus,
        hyper: Option<HostId>,
    ) -> ProvisionResult<Instance> {
        let instance = self.state.write(|txn| {
            let mut instance = txn.require::<Instance>(id)?;
            let previous = instance.status;
            instance.status = status;
            instance.hyper = hyper;
            instance.updated_at = epoch_secs();
            txn.put(&instance)?;
            debug!(instance = id, from = %previous, to = %status, ?hyper, "agent report applied");
            Ok(instance)
        })?;
        Ok(instance)
    }
}

pub(crate) fn adjust_workers_in(txn: &WriteTxn, cluster: u64, delta: i64) -> StateResult<()> {
    let mut record = txn.require::<Cluster>(cluster)?;
    record.worker_num = if delta >= 0 {
        record.worker_num.saturating_add(delta.unsigned_abs() as u32)
    } else {
        record.worker_num.saturating_sub(delta.unsigned_abs() as u32)
    };
    txn.put(&record)?;
    debug!(cluster, workers = record.worker_num, "cluster worker count adjusted");
    Ok(())
}

pub(crate) fn placed_on(instance: &Instance) -> ProvisionResult<HostId> {
    instance
        .hyper
        .ok_or(ProvisionError::NotPlaced {
            instance: instance.id,
        })
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
