//! Address and MAC allocation within a subnet.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use rand::Rng;

use vmgrid_state::{Interface, Subnet, SubnetId};

use crate::error::{NetworkError, NetworkResult};

/// Host addresses of one subnet, minus the reserved and used ones.
#[derive(Debug)]
pub struct AddressPool {
    subnet: SubnetId,
    net: Ipv4Network,
    taken: HashSet<Ipv4Addr>,
}

impl AddressPool {
    /// Build the pool from a subnet row and the interfaces already on it.
    ///
    /// The gateway is always treated as taken.
    pub fn for_subnet(subnet: &Subnet, in_use: &[Interface]) -> NetworkResult<Self> {
        let invalid = |reason: String| NetworkError::InvalidSubnet {
            subnet: subnet.id,
            reason,
        };
        let network: Ipv4Addr = subnet
            .network
            .parse()
            .map_err(|e| invalid(format!("network {:?}: {e}", subnet.network)))?;
        let netmask: Ipv4Addr = subnet
            .netmask
            .parse()
            .map_err(|e| invalid(format!("netmask {:?}: {e}", subnet.netmask)))?;
        let net = Ipv4Network::with_netmask(network, netmask)
            .map_err(|e| invalid(e.to_string()))?;

        let mut taken: HashSet<Ipv4Addr> = in_use
            .iter()
            .filter_map(|iface| iface.address.ip().parse().ok())
            .collect();
        if let Ok(gateway) = subnet.gateway_address().parse() {
            taken.insert(gateway);
        }

        Ok(Self {
            subnet: subnet.id,
            net,
            taken,
        })
    }

    pub fn prefix(&self) -> u8 {
        self.net.prefix()
    }

    /// Claim a caller-chosen address. A `/len` suffix on the input is ignored.
    pub fn claim(&self, requested: &str) -> NetworkResult<String> {
        let bare = requested.split('/').next().unwrap_or_default();
        let ip: Ipv4Addr = bare.parse().map_err(|_| NetworkError::InvalidAddress {
            address: requested.to_string(),
            subnet: self.subnet,
        })?;
        if !self.is_host(ip) {
            return Err(NetworkError::InvalidAddress {
                address: requested.to_string(),
                subnet: self.subnet,
            });
        }
        if self.taken.contains(&ip) {
            return Err(NetworkError::AddressInUse {
                address: bare.to_string(),
                subnet: self.subnet,
            });
        }
        Ok(self.render(ip))
    }

    /// Lowest free host address.
    pub fn next_free(&self) -> NetworkResult<String> {
        self.net
            .iter()
            .find(|ip| self.is_host(*ip) && !self.taken.contains(ip))
            .map(|ip| self.render(ip))
            .ok_or(NetworkError::SubnetExhausted {
                subnet: self.subnet,
            })
    }

    fn is_host(&self, ip: Ipv4Addr) -> bool {
        if !self.net.contains(ip) {
            return false;
        }
        // Point-to-point prefixes have no network/broadcast addresses.
        self.net.prefix() >= 31 || (ip != self.net.network() && ip != self.net.broadcast())
    }

    fn render(&self, ip: Ipv4Addr) -> String {
        format!("{ip}/{}", self.net.prefix())
    }
}

/// Validate a caller-supplied MAC and return it lower-cased.
pub fn normalize_mac(mac: &str) -> NetworkResult<String> {
    let invalid = |reason| NetworkError::InvalidMac {
        mac: mac.to_string(),
        reason,
    };
    let octets: Vec<&str> = mac.split(':').collect();
    if octets.len() != 6 {
        return Err(invalid("expected six colon-separated octets"));
    }
    let mut first = 0u8;
    for (i, octet) in octets.iter().enumerate() {
        if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("octets must be two hex digits"));
        }
        let value = u8::from_str_radix(octet, 16).map_err(|_| invalid("non-hex octet"))?;
        if i == 0 {
            first = value;
        }
    }
    if first & 0x01 != 0 {
        return Err(invalid("multicast address"));
    }
    Ok(mac.to_ascii_lowercase())
}

/// Random MAC under `prefix` (the first two octets).
pub fn generate_mac(prefix: &str) -> String {
    let tail: [u8; 4] = rand::rng().random();
    format!(
        "{}:{:02x}:{:02x}:{:02x}:{:02x}",
        prefix.to_ascii_lowercase(),
        tail[0],
        tail[1],
        tail[2],
        tail[3]
    )
}
