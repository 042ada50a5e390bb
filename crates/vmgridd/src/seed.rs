//! Catalog fixtures loaded by `vmgridd seed`.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use vmgrid_state::*;

/// Fleet and catalog records, one array of tables per kind:
///
/// ```toml
/// [[hypers]]
/// host_id = 2
/// hostname = "hv-2"
/// zone_id = 1
/// hyper_type = "kvm"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub flavors: Vec<Flavor>,
    pub images: Vec<Image>,
    pub subnets: Vec<Subnet>,
    pub hypers: Vec<Hyper>,
    pub keys: Vec<Key>,
    pub secgroups: Vec<SecurityGroup>,
    pub clusters: Vec<Cluster>,
}

impl Fixtures {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixtures {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing fixtures {}", path.display()))
    }

    pub fn record_count(&self) -> usize {
        self.flavors.len()
            + self.images.len()
            + self.subnets.len()
            + self.hypers.len()
            + self.keys.len()
            + self.secgroups.len()
            + self.clusters.len()
    }

    /// Write every record in one transaction. Existing rows with the same
    /// id are replaced.
    pub fn apply(&self, store: &StateStore) -> anyhow::Result<()> {
        store.write(|txn| {
            put_all(txn, &self.flavors)?;
            put_all(txn, &self.images)?;
            put_all(txn, &self.subnets)?;
            put_all(txn, &self.hypers)?;
            put_all(txn, &self.keys)?;
            put_all(txn, &self.secgroups)?;
            put_all(txn, &self.clusters)
        })?;
        info!(
            flavors = self.flavors.len(),
            images = self.images.len(),
            subnets = self.subnets.len(),
            hypers = self.hypers.len(),
            "catalog seeded"
        );
        Ok(())
    }
}

fn put_all<R: Record>(txn: &WriteTxn, records: &[R]) -> StateResult<()> {
    records.iter().try_for_each(|r| txn.put(r))
}
