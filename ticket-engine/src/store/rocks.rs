//! RocksDB-backed ticket store
//!
//! Provides persistent storage with column families for logical data separation.
//! Uses bincode for compact binary serialization of records.
//!
//! Reads share the `RwLock`; conditional writes (versioned update, unique
//! violation insert) take it exclusively so the check and the put are one
//! step from the point of view of every other caller in this process.
//!
//! RocksDB calls and lock waits are synchronous, so every operation runs on
//! the blocking pool. The async caller only awaits the join handle, which
//! keeps the engine's store deadline enforceable.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, ALL_CFS};
use super::{StoreError, StoreResult, TicketFilter, TicketRecord, TicketStore, ViolationFilter};
use crate::types::{SlaViolation, TicketId};

/// Shared reference to RocksTicketStore
pub type SharedRocksTicketStore = Arc<RocksTicketStore>;

/// RocksDB-backed persistent ticket store
pub struct RocksTicketStore {
    db: Arc<RwLock<DB>>,
    path: PathBuf,
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::Deserialization(e.to_string()))
}

impl RocksTicketStore {
    /// Open or create a ticket store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            path,
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedRocksTicketStore {
        Arc::new(self)
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    /// Run `op` against the database on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RwLock<DB>) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn get_in<T: DeserializeOwned>(db: &DB, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_in<T: Serialize>(db: &DB, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        db.put_cf(&cf, key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Decode every value under a key prefix in a column family
    fn scan_prefix<T: DeserializeOwned>(db: &DB, cf_name: &str, prefix: &str) -> StoreResult<Vec<T>> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut values = Vec::new();
        for result in db.prefix_iterator_cf(&cf, prefix.as_bytes()) {
            let (key, value) = result?;
            if !key.starts_with(prefix.as_bytes()) {
                break; // Prefix no longer matches
            }
            values.push(decode(&value)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl TicketStore for RocksTicketStore {
    async fn create(&self, record: &TicketRecord) -> StoreResult<()> {
        let record = record.clone();
        self.blocking(move |lock| {
            let db = lock.write().map_err(|_| StoreError::LockPoisoned)?;
            let key = schema::keys::ticket(&record.id());
            if Self::get_in::<TicketRecord>(&db, schema::CF_TICKETS, &key)?.is_some() {
                return Err(StoreError::Duplicate(key));
            }
            Self::put_in(&db, schema::CF_TICKETS, &key, &record)
        })
        .await
    }

    async fn get(&self, id: TicketId) -> StoreResult<Option<TicketRecord>> {
        self.blocking(move |lock| {
            let db = lock.read().map_err(|_| StoreError::LockPoisoned)?;
            Self::get_in(&db, schema::CF_TICKETS, &schema::keys::ticket(&id))
        })
        .await
    }

    async fn update(&self, record: &TicketRecord, expected_version: u64) -> StoreResult<()> {
        let record = record.clone();
        self.blocking(move |lock| {
            let db = lock.write().map_err(|_| StoreError::LockPoisoned)?;
            let key = schema::keys::ticket(&record.id());
            let stored: TicketRecord = Self::get_in(&db, schema::CF_TICKETS, &key)?
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            if stored.version != expected_version {
                return Err(StoreError::VersionConflict {
                    key,
                    expected: expected_version,
                    found: stored.version,
                });
            }
            Self::put_in(&db, schema::CF_TICKETS, &key, &record)
        })
        .await
    }

    async fn list(&self, filter: &TicketFilter) -> StoreResult<Vec<TicketRecord>> {
        let filter = filter.clone();
        self.blocking(move |lock| {
            let db = lock.read().map_err(|_| StoreError::LockPoisoned)?;
            let records: Vec<TicketRecord> =
                Self::scan_prefix(&db, schema::CF_TICKETS, schema::keys::TICKET_PREFIX)?;
            Ok(records
                .into_iter()
                .filter(|record| filter.matches(&record.ticket))
                .collect())
        })
        .await
    }

    async fn insert_violation(&self, violation: &SlaViolation) -> StoreResult<()> {
        let violation = violation.clone();
        self.blocking(move |lock| {
            let db = lock.write().map_err(|_| StoreError::LockPoisoned)?;
            let key = schema::keys::violation(&violation.ticket_id, violation.violation_type);
            if Self::get_in::<SlaViolation>(&db, schema::CF_VIOLATIONS, &key)?.is_some() {
                return Err(StoreError::Duplicate(key));
            }
            Self::put_in(&db, schema::CF_VIOLATIONS, &key, &violation)
        })
        .await
    }

    async fn list_violations(&self, filter: &ViolationFilter) -> StoreResult<Vec<SlaViolation>> {
        let filter = filter.clone();
        self.blocking(move |lock| {
            let db = lock.read().map_err(|_| StoreError::LockPoisoned)?;
            let prefix = match filter.ticket_id {
                Some(ticket_id) => format!("{}{}:", schema::keys::VIOLATION_PREFIX, ticket_id),
                None => schema::keys::VIOLATION_PREFIX.to_string(),
            };
            let mut violations: Vec<SlaViolation> =
                Self::scan_prefix(&db, schema::CF_VIOLATIONS, &prefix)?
                    .into_iter()
                    .filter(|v| filter.matches(v))
                    .collect();
            violations.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
            Ok(violations)
        })
        .await
    }
}
