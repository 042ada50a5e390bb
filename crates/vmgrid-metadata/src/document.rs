//! Wire shape of the boot metadata document.
//!
//! Field names are fixed by the guest init tooling and the hypervisor-side
//! network setup scripts.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use vmgrid_network::SecurityRecord;
use vmgrid_state::VlanId;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceDocument {
    pub userdata: String,
    pub virt_type: String,
    pub dns: String,
    pub zvm: Vec<ZvmRecord>,
    pub ocp: Vec<OcpRecord>,
    pub vlans: Vec<VlanRecord>,
    pub networks: Vec<NetworkRecord>,
    pub links: Vec<LinkRecord>,
    pub keys: Vec<String>,
    pub security: Vec<SecurityRecord>,
}

impl InstanceDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// JSON, base64-encoded for the image boot command.
    pub fn to_base64(&self) -> serde_json::Result<String> {
        Ok(STANDARD.encode(self.to_json()?))
    }
}

/// Guest network: one per interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(rename = "ip_address")]
    pub address: String,
    pub netmask: String,
    /// Device name of the link carrying this network.
    pub link: String,
    /// `networkN`.
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub network: String,
    pub netmask: String,
    pub gateway: String,
}

impl RouteRecord {
    pub fn default_via(gateway: &str) -> Self {
        Self {
            network: "0.0.0.0".to_string(),
            netmask: "0.0.0.0".to_string(),
            gateway: gateway.to_string(),
        }
    }
}

/// Guest link: the physical side of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "ethernet_mac_address")]
    pub mac: String,
    pub mtu: u32,
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// VLAN map for the hypervisor-side setup script; the guest ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRecord {
    pub device: String,
    pub vlan: VlanId,
    #[serde(rename = "ip_address")]
    pub address: String,
    #[serde(rename = "mac_address")]
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZvmRecord {
    #[serde(rename = "osVersion")]
    pub os_version: String,
    #[serde(rename = "diskType")]
    pub disk_type: String,
    pub vswitch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcpRecord {
    #[serde(rename = "ocpVersion")]
    pub version: String,
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_every_top_level_field() {
        let json: serde_json::Value =
            serde_json::from_str(&InstanceDocument::default().to_json().unwrap()).unwrap();
        for field in [
            "userdata", "virt_type", "dns", "zvm", "ocp", "vlans", "networks", "links", "keys",
            "security",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn secondary_network_omits_routes() {
        let record = NetworkRecord {
            kind: "ipv4".to_string(),
            address: "10.0.2.2".to_string(),
            netmask: "255.255.255.0".to_string(),
            link: "eth1".to_string(),
            id: "network1".to_string(),
            routes: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("routes").is_none());
        assert_eq!(json["ip_address"], "10.0.2.2");
        assert_eq!(json["type"], "ipv4");
    }

    #[test]
    fn hint_records_use_camel_case_keys() {
        let zvm = serde_json::to_value(ZvmRecord {
            os_version: "rhel8".to_string(),
            disk_type: "dasd".to_string(),
            vswitch: "VSW1".to_string(),
        })
        .unwrap();
        assert_eq!(zvm["osVersion"], "rhel8");
        assert_eq!(zvm["diskType"], "dasd");

        let ocp = serde_json::to_value(OcpRecord {
            version: "4.6".to_string(),
            service: "worker".to_string(),
        })
        .unwrap();
        assert_eq!(ocp["ocpVersion"], "4.6");
    }

    #[test]
    fn base64_decodes_back_to_json() {
        let doc = InstanceDocument {
            userdata: "#cloud-config".to_string(),
            ..Default::default()
        };
        let decoded = STANDARD.decode(doc.to_base64().unwrap()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), doc.to_json().unwrap());
    }
}
