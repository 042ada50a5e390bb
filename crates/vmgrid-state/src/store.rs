//! StateStore: redb-backed catalog persistence for VmGrid.
//!
//! Provides typed CRUD over every [`Record`] type. Values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).
//!
//! Multi-step mutations that must commit or roll back together run inside
//! a [`WriteTxn`]. Dropping a `WriteTxn` without calling
//! [`WriteTxn::commit`] discards every write made through it.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A catalog row type: which table it lives in and how it is keyed.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;
    /// Human-readable kind, also the name of the table's id sequence.
    const KIND: &'static str;

    fn key(&self) -> u64;
}

macro_rules! record {
    ($ty:ty, $table:ident, $kind:literal, |$r:ident| $key:expr) => {
        impl Record for $ty {
            const TABLE: TableDefinition<'static, u64, &'static [u8]> = $table;
            const KIND: &'static str = $kind;

            fn key(&self) -> u64 {
                let $r = self;
                $key
            }
        }
    };
}

record!(Instance, INSTANCES, "instance", |r| r.id);
record!(Flavor, FLAVORS, "flavor", |r| r.id);
record!(Image, IMAGES, "image", |r| r.id);
record!(Subnet, SUBNETS, "subnet", |r| r.id);
record!(Netlink, NETLINKS, "netlink", |r| u64::from(r.vlan));
record!(Interface, INTERFACES, "interface", |r| r.id);
record!(Hyper, HYPERS, "hypervisor", |r| u64::from(r.host_id));
record!(Key, KEYS, "key", |r| r.id);
record!(SecurityGroup, SECGROUPS, "security group", |r| r.id);
record!(Cluster, CLUSTERS, "cluster", |r| r.id);
record!(FloatingIp, FLOATING_IPS, "floating ip", |r| r.id);
record!(Volume, VOLUMES, "volume", |r| r.id);

fn read_one<R: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    key: u64,
) -> StateResult<Option<R>> {
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => {
            let record: R =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn read_all<R: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> StateResult<Vec<R>> {
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let record: R = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        results.push(record);
    }
    Ok(results)
}

/// Read access shared by the store and open write transactions.
///
/// Lists come back in key order, which is the catalog's scan order.
pub trait CatalogRead {
    fn get<R: Record>(&self, key: u64) -> StateResult<Option<R>>;

    fn list<R: Record>(&self) -> StateResult<Vec<R>>;

    /// Like [`CatalogRead::get`], but a missing row is an error.
    fn require<R: Record>(&self, key: u64) -> StateResult<R> {
        self.get(key)?.ok_or(StateError::NotFound {
            kind: R::KIND,
            id: key,
        })
    }

    /// Fetch every key, preserving the order of `keys`.
    fn require_all<R: Record>(&self, keys: &[u64]) -> StateResult<Vec<R>> {
        keys.iter().map(|&key| self.require(key)).collect()
    }

    fn list_where<R: Record>(&self, pred: impl Fn(&R) -> bool) -> StateResult<Vec<R>> {
        Ok(self.list::<R>()?.into_iter().filter(|r| pred(r)).collect())
    }

    fn interfaces_for_instance(&self, id: InstanceId) -> StateResult<Vec<Interface>> {
        self.list_where(|iface: &Interface| iface.instance_id == id)
    }

    fn interfaces_on_subnet(&self, subnet_id: SubnetId) -> StateResult<Vec<Interface>> {
        self.list_where(|iface: &Interface| iface.address.subnet_id == subnet_id)
    }

    fn floating_ips_for_instance(&self, id: InstanceId) -> StateResult<Vec<FloatingIp>> {
        self.list_where(|fip: &FloatingIp| fip.instance_id == Some(id))
    }

    fn volumes_for_instance(&self, id: InstanceId) -> StateResult<Vec<Volume>> {
        self.list_where(|vol: &Volume| vol.instance_id == Some(id))
    }
}

/// Thread-safe catalog backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent catalog at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "catalog opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory catalog (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory catalog opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        for table in RECORD_TABLES {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Begin a write transaction.
    ///
    /// redb admits one writer at a time: a second `begin_write` blocks until
    /// this transaction is committed or dropped.
    pub fn begin_write(&self) -> StateResult<WriteTxn> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        Ok(WriteTxn { txn })
    }

    /// Run `f` in its own write transaction, committing on success.
    pub fn write<T>(&self, f: impl FnOnce(&WriteTxn) -> StateResult<T>) -> StateResult<T> {
        let txn = self.begin_write()?;
        let out = f(&txn)?;
        txn.commit()?;
        Ok(out)
    }

    /// Insert or update a single record.
    pub fn put<R: Record>(&self, record: &R) -> StateResult<()> {
        self.write(|txn| txn.put(record))
    }

    /// Insert a record under a freshly allocated id.
    pub fn insert<R: Record>(&self, build: impl FnOnce(u64) -> R) -> StateResult<R> {
        self.write(|txn| txn.insert(build))
    }

    /// Delete a record by key. Returns true if it existed.
    pub fn remove<R: Record>(&self, key: u64) -> StateResult<bool> {
        self.write(|txn| txn.remove::<R>(key))
    }
}

impl CatalogRead for StateStore {
    fn get<R: Record>(&self, key: u64) -> StateResult<Option<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        read_one(&table, key)
    }

    fn list<R: Record>(&self) -> StateResult<Vec<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        read_all(&table)
    }
}

/// An open write transaction over the catalog.
pub struct WriteTxn {
    txn: redb::WriteTransaction,
}

impl WriteTxn {
    /// Insert or update a record.
    pub fn put<R: Record>(&self, record: &R) -> StateResult<()> {
        let key = record.key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        table
            .insert(key, value.as_slice())
            .map_err(map_err!(Write))?;
        debug!(kind = R::KIND, key, "record stored");
        Ok(())
    }

    /// Allocate the next id for `R`'s table.
    pub fn next_id<R: Record>(&self) -> StateResult<u64> {
        let mut table = self.txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let next = table
            .get(R::KIND)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0)
            + 1;
        table.insert(R::KIND, next).map_err(map_err!(Write))?;
        Ok(next)
    }

    /// Insert a record under a freshly allocated id.
    pub fn insert<R: Record>(&self, build: impl FnOnce(u64) -> R) -> StateResult<R> {
        let record = build(self.next_id::<R>()?);
        self.put(&record)?;
        Ok(record)
    }

    /// Delete a record by key. Returns true if it existed.
    pub fn remove<R: Record>(&self, key: u64) -> StateResult<bool> {
        let mut table = self.txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        let existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        debug!(kind = R::KIND, key, existed, "record deleted");
        Ok(existed)
    }

    pub fn commit(self) -> StateResult<()> {
        self.txn.commit().map_err(map_err!(Transaction))
    }

    /// Discard every write made through this transaction.
    pub fn abort(self) -> StateResult<()> {
        self.txn.abort().map_err(map_err!(Transaction))
    }
}

impl CatalogRead for WriteTxn {
    fn get<R: Record>(&self, key: u64) -> StateResult<Option<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        read_one(&table, key)
    }

    fn list<R: Record>(&self) -> StateResult<Vec<R>> {
        let table = self.txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        read_all(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instance(id: u64, hostname: &str) -> Instance {
        Instance {
            id,
            hostname: hostname.to_string(),
            image_id: Some(1),
            flavor_id: 1,
            cluster_id: None,
            zone_id: 1,
            hyper: None,
            status: InstanceStatus::Pending,
            userdata: String::new(),
            creator: 1,
            owner: 1,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_interface(id: u64, instance_id: u64, subnet_id: u64) -> Interface {
        Interface {
            id,
            name: "eth0".to_string(),
            instance_id,
            address: Address {
                address: format!("10.0.0.{}/24", id + 1),
                subnet_id,
            },
            mac: "52:54:00:00:00:01".to_string(),
            mtu: 1450,
            secgroups: vec![],
        }
    }

    // ── Record CRUD ────────────────────────────────────────────────

    #[test]
    fn instance_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let inst = test_instance(7, "web");

        store.put(&inst).unwrap();
        let retrieved = store.get::<Instance>(7).unwrap();

        assert_eq!(retrieved, Some(inst));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get::<Flavor>(42).unwrap().is_none());
    }

    #[test]
    fn require_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.require::<Subnet>(3).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "subnet 3 not found");
    }

    #[test]
    fn require_all_preserves_requested_order() {
        let store = StateStore::open_in_memory().unwrap();
        for id in 1..=3 {
            store
                .put(&Key {
                    id,
                    name: format!("k{id}"),
                    public_key: format!("ssh-ed25519 AAAA{id}"),
                })
                .unwrap();
        }

        let keys = store.require_all::<Key>(&[3, 1]).unwrap();
        let ids: Vec<u64> = keys.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn list_is_in_key_order() {
        let store = StateStore::open_in_memory().unwrap();
        for host_id in [5u32, 1, 3] {
            store
                .put(&Hyper {
                    host_id,
                    hostname: format!("hyper-{host_id}"),
                    zone_id: 1,
                    hyper_type: "kvm".to_string(),
                })
                .unwrap();
        }

        let hosts: Vec<u32> = store
            .list::<Hyper>()
            .unwrap()
            .iter()
            .map(|h| h.host_id)
            .collect();
        assert_eq!(hosts, vec![1, 3, 5]);
    }

    #[test]
    fn remove_reports_existence() {
        let store = StateStore::open_in_memory().unwrap();
        store.put(&test_instance(1, "a")).unwrap();

        assert!(store.remove::<Instance>(1).unwrap());
        assert!(!store.remove::<Instance>(1).unwrap());
        assert!(store.get::<Instance>(1).unwrap().is_none());
    }

    // ── Sequences ──────────────────────────────────────────────────

    #[test]
    fn insert_allocates_increasing_ids_per_table() {
        let store = StateStore::open_in_memory().unwrap();

        let a = store.insert(|id| test_instance(id, "a")).unwrap();
        let b = store.insert(|id| test_instance(id, "b")).unwrap();
        let iface = store.insert(|id| test_interface(id, a.id, 1)).unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        // Interfaces have their own sequence.
        assert_eq!(iface.id, 1);
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn dropped_transaction_discards_writes() {
        let store = StateStore::open_in_memory().unwrap();
        store.put(&test_instance(1, "keep")).unwrap();

        {
            let txn = store.begin_write().unwrap();
            txn.remove::<Instance>(1).unwrap();
            txn.put(&test_instance(2, "new")).unwrap();
            // Uncommitted writes are visible inside the transaction.
            assert!(txn.get::<Instance>(1).unwrap().is_none());
            assert!(txn.get::<Instance>(2).unwrap().is_some());
        }

        assert!(store.get::<Instance>(1).unwrap().is_some());
        assert!(store.get::<Instance>(2).unwrap().is_none());
    }

    #[test]
    fn abort_discards_writes() {
        let store = StateStore::open_in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        txn.put(&test_instance(1, "gone")).unwrap();
        txn.abort().unwrap();

        assert!(store.list::<Instance>().unwrap().is_empty());
    }

    #[test]
    fn write_closure_error_rolls_back() {
        let store = StateStore::open_in_memory().unwrap();
        let res: StateResult<()> = store.write(|txn| {
            txn.put(&test_instance(1, "half"))?;
            Err(StateError::Write("boom".to_string()))
        });

        assert!(res.is_err());
        assert!(store.get::<Instance>(1).unwrap().is_none());
    }

    // ── Relationship queries ───────────────────────────────────────

    #[test]
    fn interfaces_filtered_by_instance_and_subnet() {
        let store = StateStore::open_in_memory().unwrap();
        store.put(&test_interface(1, 10, 100)).unwrap();
        store.put(&test_interface(2, 10, 200)).unwrap();
        store.put(&test_interface(3, 11, 100)).unwrap();

        assert_eq!(store.interfaces_for_instance(10).unwrap().len(), 2);
        assert_eq!(store.interfaces_on_subnet(100).unwrap().len(), 2);
        assert!(store.interfaces_for_instance(12).unwrap().is_empty());
    }

    #[test]
    fn dependents_filtered_by_instance() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put(&FloatingIp {
                id: 1,
                address: "192.0.2.10".to_string(),
                instance_id: Some(4),
            })
            .unwrap();
        store
            .put(&Volume {
                id: 1,
                name: "data".to_string(),
                size: 10,
                instance_id: None,
            })
            .unwrap();

        assert_eq!(store.floating_ips_for_instance(4).unwrap().len(), 1);
        assert!(store.volumes_for_instance(4).unwrap().is_empty());
    }

    #[test]
    fn netlink_keyed_by_vlan() {
        let store = StateStore::open_in_memory().unwrap();
        let link = Netlink {
            vlan: 1001,
            hyper: Some(3),
            peer: None,
            creator: 1,
            owner: 1,
        };
        store.put(&link).unwrap();

        assert_eq!(store.get::<Netlink>(1001).unwrap(), Some(link));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert(|id| test_instance(id, "durable")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let inst = store.get::<Instance>(1).unwrap();
        assert_eq!(inst.unwrap().hostname, "durable");
        // The sequence survives too.
        let next = store.insert(|id| test_instance(id, "next")).unwrap();
        assert_eq!(next.id, 2);
    }

    // ── Helpers on types ───────────────────────────────────────────

    #[test]
    fn gateway_and_address_strip_prefix() {
        let subnet = Subnet {
            id: 1,
            name: "s".to_string(),
            network: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1/24".to_string(),
            vlan: 5,
            name_server: String::new(),
            domain_search: String::new(),
            vswitch: String::new(),
            zones: vec![1, 2],
        };
        assert_eq!(subnet.gateway_address(), "10.0.0.1");
        assert!(subnet.spans_zone(2));
        assert!(!subnet.spans_zone(3));

        let iface = test_interface(4, 1, 1);
        assert_eq!(iface.address.ip(), "10.0.0.5");
        assert_eq!(iface.index(), Some(0));
    }

    #[test]
    fn status_parses_its_display_form() {
        for status in [
            InstanceStatus::Pending,
            InstanceStatus::ShutOff,
            InstanceStatus::Migrating,
        ] {
            assert_eq!(status.to_string().parse::<InstanceStatus>().unwrap(), status);
        }
        let err = "paused".parse::<InstanceStatus>().unwrap_err();
        assert!(matches!(err, StateError::UnknownStatus(ref s) if s == "paused"));
    }
}
