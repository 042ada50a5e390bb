//! Interface set reconciliation for an existing instance.

use tracing::info;

use vmgrid_core::RequestContext;
use vmgrid_placement::PlacementDirective;
use vmgrid_state::{CatalogRead, Instance, Interface, SecurityGroup, Subnet, SubnetId};

use crate::error::{NetworkError, NetworkResult};
use crate::interface::{InterfaceManager, InterfaceSpec};
use crate::security::rules_document;

/// Interfaces touched by one reconciliation.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub attached: Vec<Interface>,
    pub detached: Vec<Interface>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Index for the next new `ethN`: never reuses a live name.
pub fn next_interface_index(current: &[Interface]) -> u32 {
    let count = u32::try_from(current.len()).unwrap_or(u32::MAX);
    let after_highest = current
        .iter()
        .filter_map(Interface::index)
        .max()
        .map_or(0, |i| i + 1);
    count.max(after_highest)
}

fn dedup(ids: &[SubnetId]) -> Vec<SubnetId> {
    let mut out: Vec<SubnetId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

impl InterfaceManager {
    /// Subnets of `desired` that `current` has no interface on, in request
    /// order without repeats.
    ///
    /// Every one must exist and span the instance's zone.
    pub fn subnets_to_attach(
        &self,
        instance: &Instance,
        current: &[Interface],
        desired: &[SubnetId],
    ) -> NetworkResult<Vec<Subnet>> {
        let missing: Vec<SubnetId> = dedup(desired)
            .into_iter()
            .filter(|id| !current.iter().any(|i| i.address.subnet_id == *id))
            .collect();
        let subnets: Vec<Subnet> = self.state.require_all(&missing)?;
        if let Some(outside) = subnets.iter().find(|s| !s.spans_zone(instance.zone_id)) {
            return Err(NetworkError::ZoneMismatch {
                subnet: outside.id,
                zone: instance.zone_id,
            });
        }
        Ok(subnets)
    }

    /// Bring the instance's interfaces in line with `desired`, one per subnet.
    ///
    /// Interfaces on subnets no longer wanted are detached from the
    /// instance's host and released first; every missing subnet then gets a
    /// new interface, attached with the flattened rules of `secgroups`.
    pub async fn reconcile_interfaces(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        desired: &[SubnetId],
        secgroups: &[SecurityGroup],
    ) -> NetworkResult<Reconciliation> {
        let current = self.state.interfaces_for_instance(instance.id)?;
        let wanted = dedup(desired);
        // Resolve before touching anything.
        let to_attach = self.subnets_to_attach(instance, &current, &wanted)?;

        let host = PlacementDirective::on_host(instance.hyper);
        let mut outcome = Reconciliation::default();

        for iface in current
            .iter()
            .filter(|i| !wanted.contains(&i.address.subnet_id))
        {
            let subnet = self.state.require::<Subnet>(iface.address.subnet_id)?;
            let command = self.scripts.detach_nic(
                instance.id,
                subnet.vlan,
                &iface.address.address,
                &iface.mac,
            );
            self.dispatcher.execute(ctx, &host, &command).await?;
            self.delete_interface(ctx, iface).await?;
            info!(instance = instance.id, interface = %iface.name, subnet = subnet.id, "interface detached");
            outcome.detached.push(iface.clone());
        }

        if to_attach.is_empty() {
            return Ok(outcome);
        }

        let rules = rules_document(secgroups)?;
        let secgroup_ids: Vec<u64> = secgroups.iter().map(|g| g.id).collect();
        let mut index = next_interface_index(&current);
        for subnet in &to_attach {
            let iface = self
                .create_interface(
                    ctx,
                    instance,
                    InterfaceSpec::auto(subnet, format!("eth{index}"), &secgroup_ids),
                )
                .await?;
            index += 1;

            let command = self.scripts.attach_nic(
                instance.id,
                subnet.vlan,
                &iface.address.address,
                &iface.mac,
                rules.clone(),
            );
            self.dispatcher.execute(ctx, &host, &command).await?;
            info!(instance = instance.id, interface = %iface.name, subnet = subnet.id, "interface attached");
            outcome.attached.push(iface);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use vmgrid_state::{SecurityRule, StateError};

    async fn attach(env: &Env, inst: &Instance, subnet: &Subnet, name: &str) -> Interface {
        env.manager
            .create_interface(
                &RequestContext::default(),
                inst,
                InterfaceSpec::auto(subnet, name.to_string(), &[]),
            )
            .await
            .unwrap()
    }

    fn group() -> SecurityGroup {
        SecurityGroup {
            id: 8,
            name: "ssh".to_string(),
            rules: vec![SecurityRule {
                remote_ip: "0.0.0.0/0".to_string(),
                remote_group: String::new(),
                direction: "ingress".to_string(),
                ip_version: "ipv4".to_string(),
                protocol: "tcp".to_string(),
                port_min: 22,
                port_max: 22,
            }],
        }
    }

    #[tokio::test]
    async fn swaps_a_for_c_and_leaves_b() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let b = env.subnet(2, 1002, &[1]);
        let c = env.subnet(3, 1003, &[1]);
        let inst = env.instance(1, Some(4));
        let on_a = attach(&env, &inst, &a, "eth0").await;
        let on_b = attach(&env, &inst, &b, "eth1").await;
        env.exec.clear();

        let out = env
            .manager
            .reconcile_interfaces(&RequestContext::default(), &inst, &[b.id, c.id], &[group()])
            .await
            .unwrap();

        assert_eq!(out.detached, vec![on_a]);
        assert_eq!(out.attached.len(), 1);
        assert_eq!(out.attached[0].address.subnet_id, c.id);
        assert_eq!(out.attached[0].name, "eth2");
        assert_eq!(out.attached[0].secgroups, vec![8]);

        let scripts: Vec<String> = env
            .exec
            .calls()
            .iter()
            .filter(|call| call.script().ends_with("_nic.sh"))
            .map(|call| call.script().to_string())
            .collect();
        assert_eq!(scripts, vec!["detach_nic.sh", "attach_nic.sh"]);

        let attach_call = &env.exec.calls_to("attach_nic.sh")[0];
        assert_eq!(attach_call.control, "inter=4");
        assert!(attach_call.command.contains("'1003'"));
        assert!(attach_call.command.contains("\"Secgroup\":8"));

        let remaining: Vec<SubnetId> = env
            .store
            .interfaces_for_instance(1)
            .unwrap()
            .iter()
            .map(|i| i.address.subnet_id)
            .collect();
        assert_eq!(remaining, vec![b.id, c.id]);
        assert!(env.store.get::<Interface>(on_b.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn same_set_dispatches_nothing() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, Some(4));
        attach(&env, &inst, &a, "eth0").await;
        env.exec.clear();

        let out = env
            .manager
            .reconcile_interfaces(&RequestContext::default(), &inst, &[a.id, a.id], &[])
            .await
            .unwrap();

        assert!(out.is_noop());
        assert!(env.exec.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_subnet_fails_before_any_detach() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, Some(4));
        attach(&env, &inst, &a, "eth0").await;
        env.exec.clear();

        let err = env
            .manager
            .reconcile_interfaces(&RequestContext::default(), &inst, &[42], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::State(StateError::NotFound { id: 42, .. })));
        assert!(env.exec.calls().is_empty());
        assert_eq!(env.store.interfaces_for_instance(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subnet_outside_the_zone_fails_before_any_detach() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let b = env.subnet(2, 1002, &[1]);
        let far = env.subnet(4, 1004, &[2]);
        let inst = env.instance(1, Some(4));
        attach(&env, &inst, &a, "eth0").await;
        attach(&env, &inst, &b, "eth1").await;
        env.exec.clear();

        let err = env
            .manager
            .reconcile_interfaces(&RequestContext::default(), &inst, &[a.id, far.id], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::ZoneMismatch { subnet: 4, zone: 1 }));
        assert!(env.exec.calls().is_empty());
        assert_eq!(env.store.interfaces_for_instance(1).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unplaced_instance_skips_nic_commands() {
        let env = Env::new();
        let a = env.subnet(1, 1001, &[1]);
        let inst = env.instance(1, None);

        let out = env
            .manager
            .reconcile_interfaces(&RequestContext::default(), &inst, &[a.id], &[])
            .await
            .unwrap();

        assert_eq!(out.attached.len(), 1);
        assert_eq!(out.attached[0].name, "eth0");
        assert!(env.exec.calls_to("attach_nic.sh").is_empty());
    }

    #[test]
    fn next_index_skips_past_gaps() {
        let mk = |name: &str| Interface {
            id: 1,
            name: name.to_string(),
            instance_id: 1,
            address: vmgrid_state::Address {
                address: "10.0.0.2/24".to_string(),
                subnet_id: 1,
            },
            mac: String::new(),
            mtu: 1450,
            secgroups: vec![],
        };

        assert_eq!(next_interface_index(&[]), 0);
        assert_eq!(next_interface_index(&[mk("eth0"), mk("eth1")]), 2);
        // eth0 was detached earlier; eth2 is still live.
        assert_eq!(next_interface_index(&[mk("eth1"), mk("eth2")]), 3);
        assert_eq!(next_interface_index(&[mk("eth0"), mk("weird")]), 2);
    }
}
