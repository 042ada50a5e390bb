//! Interface allocation plus document assembly for one instance.

use tracing::{debug, warn};

use vmgrid_core::RequestContext;
use vmgrid_network::{InterfaceManager, InterfaceSpec, flatten_rules};
use vmgrid_state::{Cluster, Image, Instance, Interface, Key, SecurityGroup, Subnet};

use crate::builder::MetadataBuilder;
use crate::document::{InstanceDocument, OcpRecord, RouteRecord, ZvmRecord};
use crate::error::{MetadataError, MetadataResult};

/// Virtualization family that gets the OS/disk/vswitch hint block.
pub const ZVM_VIRT_TYPE: &str = "zvm";

/// Inputs for [`build_metadata`]. Everything is already resolved.
#[derive(Debug, Clone, Copy)]
pub struct MetadataRequest<'a> {
    pub instance: &'a Instance,
    pub primary: &'a Subnet,
    pub primary_address: Option<&'a str>,
    pub primary_mac: Option<&'a str>,
    pub secondaries: &'a [Subnet],
    pub keys: &'a [Key],
    pub userdata: &'a str,
    pub secgroups: &'a [SecurityGroup],
    /// `None` for cluster workers booted without an image.
    pub image: Option<&'a Image>,
    pub cluster: Option<&'a Cluster>,
    /// Role of a cluster worker, e.g. `worker`.
    pub service: &'a str,
}

#[derive(Debug)]
pub struct Metadata {
    pub interfaces: Vec<Interface>,
    pub document: InstanceDocument,
}

/// Allocate the primary interface (`eth0`), then one per secondary subnet in
/// order, and assemble the boot document.
///
/// The first failed allocation aborts the build. Interfaces allocated before
/// it stay in the catalog; releasing them is the caller's job.
pub async fn build_metadata(
    ctx: &RequestContext,
    network: &InterfaceManager,
    req: MetadataRequest<'_>,
) -> MetadataResult<Metadata> {
    let secgroup_ids: Vec<u64> = req.secgroups.iter().map(|g| g.id).collect();
    let mut builder = MetadataBuilder::new();
    let mut interfaces = Vec::with_capacity(1 + req.secondaries.len());

    let primary = network
        .create_interface(
            ctx,
            req.instance,
            InterfaceSpec {
                subnet: req.primary,
                address: req.primary_address,
                mac: req.primary_mac,
                name: "eth0".to_string(),
                secgroups: &secgroup_ids,
            },
        )
        .await
        .map_err(|source| allocation_failed(req.instance, req.primary, source))?;
    builder.interface(
        &primary,
        req.primary,
        Some(RouteRecord::default_via(req.primary.gateway_address())),
    );
    interfaces.push(primary);

    for (i, subnet) in req.secondaries.iter().enumerate() {
        let iface = network
            .create_interface(
                ctx,
                req.instance,
                InterfaceSpec::auto(subnet, format!("eth{}", i + 1), &secgroup_ids),
            )
            .await
            .map_err(|source| allocation_failed(req.instance, subnet, source))?;
        builder.interface(&iface, subnet, None);
        interfaces.push(iface);
    }

    let virt_type = req.image.map(|image| image.virt_type.as_str()).unwrap_or_default();
    builder
        .userdata(req.userdata)
        .virt_type(virt_type)
        .dns(&req.primary.name_server)
        .keys(req.keys.iter().map(|k| k.public_key.clone()))
        .security(flatten_rules(req.secgroups));

    if let Some(image) = req.image.filter(|image| image.virt_type == ZVM_VIRT_TYPE) {
        builder.zvm(ZvmRecord {
            os_version: image.os_version.clone(),
            disk_type: image.disk_type.clone(),
            vswitch: req.primary.vswitch.clone(),
        });
    }
    if let Some(cluster) = req.cluster {
        builder.ocp(OcpRecord {
            version: cluster.version.clone(),
            service: req.service.to_string(),
        });
    }

    debug!(
        instance = req.instance.id,
        interfaces = interfaces.len(),
        "boot metadata assembled"
    );
    Ok(Metadata {
        interfaces,
        document: builder.build(),
    })
}

fn allocation_failed(
    instance: &Instance,
    subnet: &Subnet,
    source: vmgrid_network::NetworkError,
) -> MetadataError {
    warn!(
        instance = instance.id,
        subnet = subnet.id,
        network = %subnet.network,
        netmask = %subnet.netmask,
        error = %source,
        "address allocation failed"
    );
    MetadataError::Allocation {
        subnet: subnet.id,
        source,
    }
}
