//! Backend script commands.
//!
//! Every hypervisor carries the same set of scripts; a command is the
//! script path, single-quoted positional arguments, and optionally a
//! heredoc payload:
//!
//! ```text
//! <dir>/attach_nic.sh '12' '1001' '10.0.0.5/24' '52:54:0a:0b:0c:0d' <<EOF
//! [{"secgroup":1, ...}]
//! EOF
//! ```

use std::fmt;

use vmgrid_state::{Flavor, HostId, InstanceId, VlanId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    args: Vec<String>,
    payload: Option<String>,
}

impl Command {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            payload: None,
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// File name of the script, for logs.
    pub fn script(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn payload_text(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for arg in &self.args {
            // Close the quote, emit an escaped quote, reopen.
            write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
        }
        if let Some(payload) = &self.payload {
            write!(f, " <<EOF\n{payload}\nEOF")?;
        }
        Ok(())
    }
}

/// Builders for every backend script, rooted at one directory.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    dir: String,
}

impl ScriptSet {
    pub fn new(dir: impl Into<String>) -> Self {
        let dir: String = dir.into();
        Self {
            dir: dir.trim_end_matches('/').to_string(),
        }
    }

    fn script(&self, name: &str) -> Command {
        Command::new(format!("{}/{name}", self.dir))
    }

    /// Boot from an image; `metadata` is already base64-encoded.
    pub fn launch_vm(
        &self,
        instance: InstanceId,
        image_ref: &str,
        hostname: &str,
        flavor: &Flavor,
        metadata: String,
    ) -> Command {
        self.script("launch_vm.sh")
            .arg(instance)
            .arg(image_ref)
            .arg(hostname)
            .arg(flavor.cpu)
            .arg(flavor.memory)
            .arg(flavor.disk)
            .arg(flavor.swap)
            .arg(flavor.ephemeral)
            .payload(metadata)
    }

    /// Boot a cluster worker; `metadata` is embedded raw.
    pub fn oc_vm(
        &self,
        instance: InstanceId,
        flavor: &Flavor,
        hostname: &str,
        metadata: String,
    ) -> Command {
        self.script("oc_vm.sh")
            .arg(instance)
            .arg(flavor.cpu)
            .arg(flavor.memory)
            .arg(flavor.disk)
            .arg(hostname)
            .payload(metadata)
    }

    pub fn action_vm(&self, instance: InstanceId, action: &str) -> Command {
        self.script("action_vm.sh").arg(instance).arg(action)
    }

    pub fn migrate_vm(&self, instance: InstanceId, target: HostId) -> Command {
        self.script("migrate_vm.sh").arg(instance).arg(target)
    }

    pub fn resize_vm(&self, instance: InstanceId, flavor: &Flavor, disk_delta: u32) -> Command {
        self.script("resize_vm.sh")
            .arg(instance)
            .arg(flavor.cpu)
            .arg(flavor.memory)
            .arg(flavor.disk)
            .arg(flavor.swap)
            .arg(flavor.ephemeral)
            .arg(disk_delta)
    }

    pub fn clear_vm(&self, instance: InstanceId) -> Command {
        self.script("clear_vm.sh").arg(instance)
    }

    /// Hot-plug a NIC; `rules` is the flattened security rule document.
    pub fn attach_nic(
        &self,
        instance: InstanceId,
        vlan: VlanId,
        address: &str,
        mac: &str,
        rules: String,
    ) -> Command {
        self.script("attach_nic.sh")
            .arg(instance)
            .arg(vlan)
            .arg(address)
            .arg(mac)
            .payload(rules)
    }

    pub fn detach_nic(
        &self,
        instance: InstanceId,
        vlan: VlanId,
        address: &str,
        mac: &str,
    ) -> Command {
        self.script("detach_nic.sh")
            .arg(instance)
            .arg(vlan)
            .arg(address)
            .arg(mac)
    }

    /// Install forwarding/ARP state for a new address on the VLAN's hosts.
    pub fn set_host(
        &self,
        vlan: VlanId,
        mac: &str,
        hostname: &str,
        address: &str,
        domain: &str,
    ) -> Command {
        self.script("set_host.sh")
            .arg(vlan)
            .arg(mac)
            .arg(hostname)
            .arg(address)
            .arg(domain)
    }

    pub fn del_host(&self, vlan: VlanId, mac: &str, address: &str) -> Command {
        self.script("del_host.sh").arg(vlan).arg(mac).arg(address)
    }
}
