//! Accumulates typed records and emits the document once, at the end.

use vmgrid_network::SecurityRecord;
use vmgrid_state::{Interface, Subnet};

use crate::document::{
    InstanceDocument, LinkRecord, NetworkRecord, OcpRecord, RouteRecord, VlanRecord, ZvmRecord,
};

#[derive(Debug, Default)]
pub struct MetadataBuilder {
    doc: InstanceDocument,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interface: a network (`networkN` by position), its link,
    /// and its VLAN entry. Only pass `route` for the primary.
    pub fn interface(
        &mut self,
        iface: &Interface,
        subnet: &Subnet,
        route: Option<RouteRecord>,
    ) -> &mut Self {
        let address = iface.address.ip().to_string();
        let id = format!("network{}", self.doc.networks.len());
        self.doc.networks.push(NetworkRecord {
            kind: "ipv4".to_string(),
            address: address.clone(),
            netmask: subnet.netmask.clone(),
            link: iface.name.clone(),
            id,
            routes: route.into_iter().collect(),
        });
        self.doc.links.push(LinkRecord {
            mac: iface.mac.clone(),
            mtu: iface.mtu,
            id: iface.name.clone(),
            kind: "phy".to_string(),
        });
        self.doc.vlans.push(VlanRecord {
            device: iface.name.clone(),
            vlan: subnet.vlan,
            address,
            mac: iface.mac.clone(),
        });
        self
    }

    pub fn userdata(&mut self, userdata: &str) -> &mut Self {
        self.doc.userdata = userdata.to_string();
        self
    }

    pub fn virt_type(&mut self, virt_type: &str) -> &mut Self {
        self.doc.virt_type = virt_type.to_string();
        self
    }

    pub fn dns(&mut self, name_server: &str) -> &mut Self {
        self.doc.dns = name_server.to_string();
        self
    }

    pub fn keys(&mut self, keys: impl IntoIterator<Item = String>) -> &mut Self {
        self.doc.keys.extend(keys);
        self
    }

    pub fn security(&mut self, rules: Vec<SecurityRecord>) -> &mut Self {
        self.doc.security = rules;
        self
    }

    pub fn zvm(&mut self, record: ZvmRecord) -> &mut Self {
        self.doc.zvm.push(record);
        self
    }

    pub fn ocp(&mut self, record: OcpRecord) -> &mut Self {
        self.doc.ocp.push(record);
        self
    }

    pub fn build(self) -> InstanceDocument {
        self.doc
    }
}
