//! Interface create/delete against the catalog and the VLAN's hypervisors.

use tracing::{debug, info, warn};

use vmgrid_core::RequestContext;
use vmgrid_core::config::NetworkConfig;
use vmgrid_dispatch::{Dispatcher, ScriptSet};
use vmgrid_placement::PlacementDirective;
use vmgrid_state::{Address, CatalogRead, Instance, Interface, Netlink, StateStore, Subnet};

use crate::allocator::{AddressPool, generate_mac, normalize_mac};
use crate::error::{NetworkError, NetworkResult};

/// What to allocate for one new interface.
#[derive(Debug, Clone)]
pub struct InterfaceSpec<'a> {
    pub subnet: &'a Subnet,
    /// Caller-chosen address; auto-assigned when absent or empty.
    pub address: Option<&'a str>,
    /// Caller-chosen MAC; generated when absent or empty.
    pub mac: Option<&'a str>,
    pub name: String,
    pub secgroups: &'a [u64],
}

impl<'a> InterfaceSpec<'a> {
    pub fn auto(subnet: &'a Subnet, name: String, secgroups: &'a [u64]) -> Self {
        Self {
            subnet,
            address: None,
            mac: None,
            name,
            secgroups,
        }
    }
}

/// Allocates, binds and tears down virtual NICs.
#[derive(Clone)]
pub struct InterfaceManager {
    pub(crate) state: StateStore,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) scripts: ScriptSet,
    mtu: u32,
    mac_prefix: String,
}

impl InterfaceManager {
    pub fn new(
        state: StateStore,
        dispatcher: Dispatcher,
        scripts: ScriptSet,
        config: &NetworkConfig,
    ) -> Self {
        Self {
            state,
            dispatcher,
            scripts,
            mtu: config.mtu,
            mac_prefix: config.mac_prefix.clone(),
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    /// Allocate and persist an interface, then install forwarding state on
    /// whichever host(s) serve the subnet's VLAN.
    ///
    /// An unbound VLAN has nobody to notify; that is not an error.
    pub async fn create_interface(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        spec: InterfaceSpec<'_>,
    ) -> NetworkResult<Interface> {
        let subnet = spec.subnet;
        let (iface, netlink) = self.persist_interface(ctx, instance, &spec)?;
        info!(
            instance = instance.id,
            interface = %iface.name,
            address = %iface.address.address,
            mac = %iface.mac,
            vlan = subnet.vlan,
            "interface allocated"
        );

        let directive = PlacementDirective::for_netlink(&netlink);
        let command = self.scripts.set_host(
            subnet.vlan,
            &iface.mac,
            &instance.hostname,
            &iface.address.address,
            &subnet.domain_search,
        );
        self.dispatcher.execute(ctx, &directive, &command).await?;
        Ok(iface)
    }

    fn persist_interface(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        spec: &InterfaceSpec<'_>,
    ) -> NetworkResult<(Interface, Netlink)> {
        let subnet = spec.subnet;
        if !subnet.spans_zone(instance.zone_id) {
            return Err(NetworkError::ZoneMismatch {
                subnet: subnet.id,
                zone: instance.zone_id,
            });
        }

        // Allocation and binding commit together; dropping the txn on any
        // early return releases the address again.
        let txn = self.state.begin_write()?;
        let existing = txn.interfaces_for_instance(instance.id)?;
        if existing.iter().any(|i| i.address.subnet_id == subnet.id) {
            return Err(NetworkError::DuplicateSubnet {
                instance: instance.id,
                subnet: subnet.id,
            });
        }

        let pool = AddressPool::for_subnet(subnet, &txn.interfaces_on_subnet(subnet.id)?)?;
        let address = match spec.address.filter(|a| !a.is_empty()) {
            Some(requested) => pool.claim(requested)?,
            None => pool.next_free()?,
        };
        let mac = match spec.mac.filter(|m| !m.is_empty()) {
            Some(requested) => normalize_mac(requested)?,
            None => generate_mac(&self.mac_prefix),
        };

        let iface = txn.insert(|id| Interface {
            id,
            name: spec.name.clone(),
            instance_id: instance.id,
            address: Address {
                address,
                subnet_id: subnet.id,
            },
            mac,
            mtu: self.mtu,
            secgroups: spec.secgroups.to_vec(),
        })?;

        let netlink = match txn.get::<Netlink>(u64::from(subnet.vlan))? {
            Some(existing) => existing,
            None => {
                let created = Netlink {
                    vlan: subnet.vlan,
                    hyper: None,
                    peer: None,
                    creator: ctx.user_id,
                    owner: ctx.org_id,
                };
                txn.put(&created)?;
                debug!(vlan = subnet.vlan, "network binding created");
                created
            }
        };

        txn.commit()?;
        Ok((iface, netlink))
    }

    /// Remove forwarding state for `iface` from the hosts serving its VLAN.
    ///
    /// Reads go against the committed catalog; no write transaction is held
    /// while the command is in flight. A missing subnet or VLAN binding is
    /// logged and skipped.
    pub async fn unbind_interface(
        &self,
        ctx: &RequestContext,
        iface: &Interface,
    ) -> NetworkResult<()> {
        let Some(subnet) = self.state.get::<Subnet>(iface.address.subnet_id)? else {
            warn!(
                interface = iface.id,
                subnet = iface.address.subnet_id,
                "subnet of interface is gone, skipping host unbinding"
            );
            return Ok(());
        };
        let Some(netlink) = self.state.get::<Netlink>(u64::from(subnet.vlan))? else {
            warn!(
                interface = iface.id,
                vlan = subnet.vlan,
                "no network binding for VLAN, skipping host unbinding"
            );
            return Ok(());
        };

        let command = self
            .scripts
            .del_host(subnet.vlan, &iface.mac, &iface.address.address);
        self.dispatcher
            .execute(ctx, &PlacementDirective::for_netlink(&netlink), &command)
            .await?;
        Ok(())
    }

    /// Unbind `iface`, then drop its catalog row.
    pub async fn delete_interface(
        &self,
        ctx: &RequestContext,
        iface: &Interface,
    ) -> NetworkResult<()> {
        self.unbind_interface(ctx, iface).await?;
        self.state.remove::<Interface>(iface.id)?;
        info!(
            instance = iface.instance_id,
            interface = %iface.name,
            address = %iface.address.address,
            "interface released"
        );
        Ok(())
    }

    /// Unbind every interface, continuing past failures. Catalog rows are
    /// left for the caller to remove once the whole teardown succeeded.
    ///
    /// Returns [`NetworkError::Teardown`] carrying the first failure when any
    /// interface could not be unbound.
    pub async fn unbind_interfaces(
        &self,
        ctx: &RequestContext,
        ifaces: &[Interface],
    ) -> NetworkResult<()> {
        let mut failures = Vec::new();
        for iface in ifaces {
            if let Err(err) = self.unbind_interface(ctx, iface).await {
                warn!(interface = iface.id, error = %err, "interface teardown failed");
                failures.push(err);
            }
        }

        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(NetworkError::Teardown {
                failed,
                attempted: ifaces.len(),
                first: Box::new(first),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use vmgrid_state::HostId;

    fn bind(env: &Env, vlan: u32, hyper: Option<HostId>, peer: Option<HostId>) {
        env.store
            .put(&Netlink {
                vlan,
                hyper,
                peer,
                creator: 1,
                owner: 1,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn create_on_unbound_vlan_creates_binding_without_dispatch() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, None);
        let ctx = RequestContext::new(7, 3);

        let iface = env
            .manager
            .create_interface(&ctx, &inst, InterfaceSpec::auto(&subnet, "eth0".into(), &[]))
            .await
            .unwrap();

        assert_eq!(iface.address.address, "10.0.1.2/24");
        assert_eq!(iface.mtu, 1450);
        assert!(iface.mac.starts_with("52:54:"));
        assert!(env.exec.calls().is_empty());

        let link = env.store.require::<Netlink>(1001).unwrap();
        assert_eq!((link.hyper, link.peer), (None, None));
        assert_eq!((link.creator, link.owner), (7, 3));
    }

    #[tokio::test]
    async fn create_fans_out_to_both_bound_hosts() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        bind(&env, 1001, Some(3), Some(4));
        let inst = env.instance(1, Some(3));

        let iface = env
            .manager
            .create_interface(
                &RequestContext::default(),
                &inst,
                InterfaceSpec {
                    subnet: &subnet,
                    address: Some("10.0.1.40"),
                    mac: Some("52:54:AA:BB:CC:DD"),
                    name: "eth0".into(),
                    secgroups: &[2],
                },
            )
            .await
            .unwrap();

        assert_eq!(iface.mac, "52:54:aa:bb:cc:dd");
        assert_eq!(iface.secgroups, vec![2]);
        let calls = env.exec.calls_to("set_host.sh");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].control, "toall=vlan-1001:3,4");
        assert_eq!(
            calls[0].command,
            "/s/set_host.sh '1001' '52:54:aa:bb:cc:dd' 'vm-1' '10.0.1.40/24' 'example.org'"
        );
    }

    #[tokio::test]
    async fn existing_binding_is_never_overwritten() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        bind(&env, 1001, Some(5), None);

        env.manager
            .create_interface(
                &RequestContext::new(9, 9),
                &env.instance(1, None),
                InterfaceSpec::auto(&subnet, "eth0".into(), &[]),
            )
            .await
            .unwrap();

        let link = env.store.require::<Netlink>(1001).unwrap();
        assert_eq!(link.hyper, Some(5));
        assert_eq!(link.creator, 1);
        assert_eq!(env.exec.calls()[0].control, "inter=5");
    }

    #[tokio::test]
    async fn invalid_caller_values_leave_no_rows() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, None);
        let ctx = RequestContext::default();

        let err = env
            .manager
            .create_interface(
                &ctx,
                &inst,
                InterfaceSpec {
                    mac: Some("01:00:5e:00:00:01"),
                    ..InterfaceSpec::auto(&subnet, "eth0".into(), &[])
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = env
            .manager
            .create_interface(
                &ctx,
                &inst,
                InterfaceSpec {
                    address: Some("192.168.0.4"),
                    ..InterfaceSpec::auto(&subnet, "eth0".into(), &[])
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidAddress { .. }));

        assert!(env.store.list::<Interface>().unwrap().is_empty());
        assert!(env.store.get::<Netlink>(1001).unwrap().is_none());
    }

    #[tokio::test]
    async fn subnet_outside_instance_zone_is_rejected() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[2]);

        let err = env
            .manager
            .create_interface(
                &RequestContext::default(),
                &env.instance(1, None),
                InterfaceSpec::auto(&subnet, "eth0".into(), &[]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::ZoneMismatch { subnet: 1, zone: 1 }));
    }

    #[tokio::test]
    async fn second_interface_on_same_subnet_is_rejected() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, None);
        let ctx = RequestContext::default();

        env.manager
            .create_interface(&ctx, &inst, InterfaceSpec::auto(&subnet, "eth0".into(), &[]))
            .await
            .unwrap();
        let err = env
            .manager
            .create_interface(&ctx, &inst, InterfaceSpec::auto(&subnet, "eth1".into(), &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::DuplicateSubnet { .. }));
    }

    #[tokio::test]
    async fn delete_unbinds_then_removes() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        bind(&env, 1001, Some(2), None);
        let ctx = RequestContext::default();
        let iface = env
            .manager
            .create_interface(&ctx, &env.instance(1, None), InterfaceSpec::auto(&subnet, "eth0".into(), &[]))
            .await
            .unwrap();
        env.exec.clear();

        env.manager.delete_interface(&ctx, &iface).await.unwrap();

        let calls = env.exec.calls_to("del_host.sh");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].control, "inter=2");
        assert!(env.store.get::<Interface>(iface.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_without_binding_still_removes_row() {
        let env = Env::new();
        let subnet = env.subnet(1, 1001, &[1]);
        let ctx = RequestContext::default();
        let iface = env
            .manager
            .create_interface(&ctx, &env.instance(1, None), InterfaceSpec::auto(&subnet, "eth0".into(), &[]))
            .await
            .unwrap();
        env.store.remove::<Netlink>(1001).unwrap();

        env.manager.delete_interface(&ctx, &iface).await.unwrap();

        assert!(env.exec.calls().is_empty());
        assert!(env.store.list::<Interface>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_continues_past_failures_and_aggregates() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let b = env.subnet(2, 1002, &[1]);
        bind(&env, 1001, Some(2), None);
        bind(&env, 1002, Some(2), None);
        let ctx = RequestContext::default();
        let inst = env.instance(1, None);
        let first = env
            .manager
            .create_interface(&ctx, &inst, InterfaceSpec::auto(&a, "eth0".into(), &[]))
            .await
            .unwrap();
        let second = env
            .manager
            .create_interface(&ctx, &inst, InterfaceSpec::auto(&b, "eth1".into(), &[]))
            .await
            .unwrap();
        env.exec.clear();
        env.exec.fail_matching("del_host.sh '1001'");

        let err = env
            .manager
            .unbind_interfaces(&ctx, &[first, second])
            .await
            .unwrap_err();

        // Both were attempted.
        assert_eq!(env.exec.calls_to("del_host.sh").len(), 2);
        assert!(matches!(
            err,
            NetworkError::Teardown {
                failed: 1,
                attempted: 2,
                ..
            }
        ));
        // Rows stay until the caller commits the teardown.
        assert_eq!(env.store.list::<Interface>().unwrap().len(), 2);
    }
}
