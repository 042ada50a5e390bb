//! vmgrid.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VmgridConfig {
    pub catalog: CatalogConfig,
    pub scripts: ScriptsConfig,
    pub network: NetworkConfig,
    pub list: ListConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Directory holding the backend scripts on every hypervisor.
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub mtu: u32,
    /// First two octets of generated MAC addresses, e.g. `52:54`.
    pub mac_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListConfig {
    pub page_size: u64,
}

impl NetworkConfig {
    /// Generated MACs are `<prefix>:xx:xx:xx:xx`, so the prefix must be
    /// two hex octets and the first one unicast.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::Invalid {
            field: "network.mac_prefix",
            reason,
        };
        let octets: Vec<&str> = self.mac_prefix.split(':').collect();
        if octets.len() != 2
            || octets
                .iter()
                .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(invalid("expected two colon-separated hex octets"));
        }
        let first = u8::from_str_radix(octets[0], 16)
            .map_err(|_| invalid("expected two colon-separated hex octets"))?;
        if first & 0x01 != 0 {
            return Err(invalid("multicast bit is set"));
        }
        if self.mtu == 0 {
            return Err(ConfigError::Invalid {
                field: "network.mtu",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/vmgrid/catalog.redb"),
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: "/opt/cloudland/scripts/backend".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mtu: 1450,
            mac_prefix: "52:54".to_string(),
        }
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self { page_size: 16 }
    }
}

impl VmgridConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.network.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmgridConfig::default();
        assert_eq!(config.network.mtu, 1450);
        assert_eq!(config.list.page_size, 16);
        assert_eq!(config.scripts.dir, "/opt/cloudland/scripts/backend");
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[network]
mtu = 9000

[scripts]
dir = "/usr/libexec/vmgrid"
"#;
        let config: VmgridConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.mtu, 9000);
        assert_eq!(config.network.mac_prefix, "52:54");
        assert_eq!(config.scripts.dir, "/usr/libexec/vmgrid");
        assert_eq!(config.list.page_size, 16);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = VmgridConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, VmgridConfig::default());
    }

    #[test]
    fn test_render_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmgrid.toml");
        let mut config = VmgridConfig::default();
        config.list.page_size = 50;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = VmgridConfig::from_file(&path).unwrap();
        assert_eq!(loaded.list.page_size, 50);
    }

    #[test]
    fn test_mac_prefix_is_validated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmgrid.toml");

        for bad in ["53:54", "52", "52:54:00", "zz:54", "052:54"] {
            std::fs::write(&path, format!("[network]\nmac_prefix = \"{bad}\"\n")).unwrap();
            let err = VmgridConfig::from_file(&path).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { field: "network.mac_prefix", .. }),
                "{bad} accepted"
            );
        }

        std::fs::write(&path, "[network]\nmac_prefix = \"02:AB\"\n").unwrap();
        let config = VmgridConfig::from_file(&path).unwrap();
        assert_eq!(config.network.mac_prefix, "02:AB");
        assert!(VmgridConfig::default().network.validate().is_ok());
    }
}
