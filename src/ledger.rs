use chrono::NaiveDate;

use crate::errors::*;
use crate::models::*;
use crate::types::*;

/// Storage operations the orchestrator needs from a ledger.
///
/// Transactions nest: a `begin` inside an open transaction starts a savepoint,
/// and the matching `commit`/`rollback` only releases or undoes that savepoint.
pub trait LedgerStore {
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Stores a draft, filling storage defaults and companion account rows.
    /// Fails with `Duplicate` when an identical record already exists.
    fn insert(&self, draft: &TransactionDraft) -> Result<TransactionRecord>;
    fn get(&self, resource: Resource, key: i32) -> Result<TransactionRecord>;
    fn list(
        &self,
        resource: Resource,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>>;
    fn update(
        &self,
        resource: Resource,
        key: i32,
        changes: &RecordChanges,
    ) -> Result<TransactionRecord>;
    fn delete(&self, resource: Resource, key: i32) -> Result<()>;

    fn find_entity(&self, table: EntityTable, name: &str) -> Result<Option<EntityRow>>;
    fn primary_device(&self) -> Result<Option<DeviceInfo>>;
    fn device_id(&self, device_key: i32) -> Result<Option<String>>;
    fn base_currency(&self) -> Result<Option<String>>;

    fn insert_sync_update(&self, update: &NewSyncUpdate) -> Result<i32>;
    fn recent_sync_updates(&self, limit: i64) -> Result<Vec<SyncUpdateRow>>;
}
