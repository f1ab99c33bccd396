//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Append-only entry log (key: entry_id)
//! - `user_entries` - Per-user index (key: len(user) || user || sequence)
//! - `orders` - EARN entry per order (key: order_id)
//! - `expiry` - Pending expiries (key: expires_at || entry_id, value: user)
//!
//! Only index rows in `expiry` are ever deleted; entries are never
//! modified once written.

use crate::{
    error::{Error, Result},
    types::{EntryType, LedgerEntry, UserId},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_USER_ENTRIES: &str = "user_entries";
const CF_ORDERS: &str = "orders";
const CF_EXPIRY: &str = "expiry";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_USER_ENTRIES, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_EXPIRY, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB loyalty store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StoreUnavailable(format!("Column family {} not found", name)))
    }

    // Writes

    /// Append sealed entries and drop retired expiry rows in one atomic write
    pub fn append_entries(
        &self,
        entries: &[LedgerEntry],
        retired: &[(DateTime<Utc>, Uuid)],
    ) -> Result<()> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_user = self.cf_handle(CF_USER_ENTRIES)?;
        let cf_orders = self.cf_handle(CF_ORDERS)?;
        let cf_expiry = self.cf_handle(CF_EXPIRY)?;

        let mut batch = WriteBatch::default();

        for entry in entries {
            let value = bincode::serialize(entry)?;
            batch.put_cf(cf_entries, entry.id.as_bytes(), &value);

            batch.put_cf(
                cf_user,
                Self::user_entry_key(&entry.user_id, entry.sequence),
                entry.id.as_bytes(),
            );

            if entry.entry_type == EntryType::Earn {
                if let Some(order_id) = &entry.order_id {
                    batch.put_cf(cf_orders, order_id.as_bytes(), entry.id.as_bytes());
                }
                if let Some(expires_at) = entry.expires_at {
                    batch.put_cf(
                        cf_expiry,
                        Self::expiry_key(expires_at, entry.id),
                        entry.user_id.as_str().as_bytes(),
                    );
                }
            }
        }

        for (expires_at, entry_id) in retired {
            batch.delete_cf(cf_expiry, Self::expiry_key(*expires_at, *entry_id));
        }

        self.db.write(batch)?;

        for entry in entries {
            tracing::debug!(
                entry_id = %entry.id,
                user_id = %entry.user_id,
                sequence = entry.sequence,
                points = entry.points,
                entry_type = %entry.entry_type,
                "Entry appended"
            );
        }

        Ok(())
    }

    // Reads

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;

        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        let entry: LedgerEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// All entries of a user, in sequence order
    pub fn get_user_entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_USER_ENTRIES)?;
        let prefix = Self::user_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let entry_id = Self::decode_uuid(&value)?;
            entries.push(self.get_entry(entry_id)?);
        }

        Ok(entries)
    }

    /// EARN entry already recorded for an order
    pub fn find_order(&self, order_id: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_ORDERS)?;

        match self.db.get_cf(cf, order_id.as_bytes())? {
            Some(value) => Ok(Some(Self::decode_uuid(&value)?)),
            None => Ok(None),
        }
    }

    /// Users owning at least one EARN entry due to expire at `now`
    pub fn due_expiry_users(&self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        let cf = self.cf_handle(CF_EXPIRY)?;
        let cutoff = Self::encode_timestamp(now);

        let mut users = BTreeSet::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            if key.len() < 8 || key[..8] > cutoff[..] {
                break;
            }

            let user = std::str::from_utf8(&value)
                .map_err(|e| Error::InvariantViolation(format!("corrupt expiry row: {}", e)))?;
            users.insert(UserId::new(user));
        }

        Ok(users.into_iter().collect())
    }

    // Key helpers

    fn user_prefix(user_id: &UserId) -> Vec<u8> {
        let bytes = user_id.as_str().as_bytes();
        let mut key = Vec::with_capacity(2 + bytes.len() + 8);
        key.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        key.extend_from_slice(bytes);
        key
    }

    fn user_entry_key(user_id: &UserId, sequence: u64) -> Vec<u8> {
        let mut key = Self::user_prefix(user_id);
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    fn expiry_key(expires_at: DateTime<Utc>, entry_id: Uuid) -> Vec<u8> {
        let mut key = Self::encode_timestamp(expires_at).to_vec();
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    // Sign bit flipped so byte order matches time order
    fn encode_timestamp(at: DateTime<Utc>) -> [u8; 8] {
        ((at.timestamp_millis() as u64) ^ (1u64 << 63)).to_be_bytes()
    }

    fn decode_uuid(bytes: &[u8]) -> Result<Uuid> {
        Uuid::from_slice(bytes)
            .map_err(|e| Error::InvariantViolation(format!("corrupt index value: {}", e)))
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_expiry = self.cf_handle(CF_EXPIRY)?;

        Ok(StorageStats {
            total_entries: self.approximate_count(cf_entries)?,
            pending_expiries: self.approximate_count(cf_expiry)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of entries
    pub total_entries: u64,
    /// Approximate number of EARN entries awaiting expiry
    pub pending_expiries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainHead;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn sealed_chain(user: &str, drafts: Vec<LedgerEntry>) -> Vec<LedgerEntry> {
        let mut head = ChainHead::GENESIS;
        drafts
            .into_iter()
            .map(|mut entry| {
                entry.user_id = UserId::new(user);
                entry.seal(head.sequence + 1, head.hash, Utc::now());
                head = ChainHead {
                    sequence: entry.sequence,
                    hash: entry.hash,
                };
                entry
            })
            .collect()
    }

    fn earn(points: i64) -> LedgerEntry {
        LedgerEntry::draft(UserId::new(""), EntryType::Earn, points, "order")
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_ENTRIES).is_some());
        assert!(storage.db.cf_handle(CF_EXPIRY).is_some());
    }

    #[test]
    fn test_append_and_get_entry() {
        let (storage, _temp) = test_storage();
        let entries = sealed_chain("u-1", vec![earn(500)]);

        storage.append_entries(&entries, &[]).unwrap();

        let retrieved = storage.get_entry(entries[0].id).unwrap();
        assert_eq!(retrieved, entries[0]);
    }

    #[test]
    fn test_missing_entry() {
        let (storage, _temp) = test_storage();
        assert!(matches!(
            storage.get_entry(Uuid::now_v7()),
            Err(Error::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_user_entries_in_sequence_order() {
        let (storage, _temp) = test_storage();

        let a = sealed_chain("u-1", (1..=12).map(|i| earn(i * 10)).collect());
        let b = sealed_chain("u-10", vec![earn(7)]);
        storage.append_entries(&a, &[]).unwrap();
        storage.append_entries(&b, &[]).unwrap();

        let read = storage.get_user_entries(&UserId::new("u-1")).unwrap();
        assert_eq!(read.len(), 12);
        assert!(read.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
        assert!(read.iter().all(|e| e.user_id.as_str() == "u-1"));

        assert_eq!(storage.get_user_entries(&UserId::new("u-10")).unwrap().len(), 1);
        assert!(storage.get_user_entries(&UserId::new("u-2")).unwrap().is_empty());
    }

    #[test]
    fn test_order_index() {
        let (storage, _temp) = test_storage();
        let entries = sealed_chain("u-1", vec![earn(100).with_order("ORD-1")]);
        storage.append_entries(&entries, &[]).unwrap();

        assert_eq!(storage.find_order("ORD-1").unwrap(), Some(entries[0].id));
        assert_eq!(storage.find_order("ORD-2").unwrap(), None);
    }

    #[test]
    fn test_expiry_index_and_retirement() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let due = sealed_chain("u-due", vec![earn(100).with_expiry(Some(now - Duration::days(1)))]);
        let later = sealed_chain("u-later", vec![earn(100).with_expiry(Some(now + Duration::days(1)))]);
        storage.append_entries(&due, &[]).unwrap();
        storage.append_entries(&later, &[]).unwrap();

        assert_eq!(
            storage.due_expiry_users(now).unwrap(),
            vec![UserId::new("u-due")]
        );

        let expires_at = due[0].expires_at.unwrap();
        storage.append_entries(&[], &[(expires_at, due[0].id)]).unwrap();
        assert!(storage.due_expiry_users(now).unwrap().is_empty());

        // Entry itself is untouched
        assert!(storage.get_entry(due[0].id).is_ok());
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = test_storage();
        let empty = storage.get_stats().unwrap();
        assert_eq!(empty.total_entries, 0);

        let entries = sealed_chain("u-1", vec![earn(100), earn(200)]);
        storage.append_entries(&entries, &[]).unwrap();
        assert!(storage.get_stats().is_ok());
    }

    #[test]
    fn test_timestamp_encoding_orders_pre_epoch() {
        let before = DateTime::<Utc>::UNIX_EPOCH - Duration::days(1);
        let after = DateTime::<Utc>::UNIX_EPOCH + Duration::days(1);
        assert!(Storage::encode_timestamp(before) < Storage::encode_timestamp(after));
    }
}
