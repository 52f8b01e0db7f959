use log::{debug, info};
use uuid::Uuid;

use crate::codec::*;
use crate::constants::*;
use crate::errors::*;
use crate::ledger::*;
use crate::models::*;
use crate::payload::*;
use crate::sync_config::*;
use crate::types::*;

/// Writes SyncUpdate rows for stored records.  Callers own the surrounding
/// transaction; nothing here commits.
pub struct SyncUpdateManager<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    config: &'a SyncConfig,
}

impl<'a, S: LedgerStore + ?Sized> SyncUpdateManager<'a, S> {
    pub fn new(store: &'a S, config: &'a SyncConfig) -> SyncUpdateManager<'a, S> {
        SyncUpdateManager { store, config }
    }

    /// Builds, encodes and persists one payload.  Returns the SyncUpdate key.
    pub fn create_sync_record(&self, record: &TransactionRecord, action: Action) -> Result<i32> {
        let encoded = self.encode(record, action)?;
        self.persist(SyncOperation::new(action, record.resource()), &encoded)
    }

    /// One SyncUpdate per changed field, each carrying the final record
    /// state.  At least one row is written.
    pub fn create_updates_for_changes(
        &self,
        record: &TransactionRecord,
        changed_fields: &[ChangedField],
    ) -> Result<Vec<i32>> {
        let operation = SyncOperation::new(Action::Update, record.resource());
        let encoded = self.encode(record, Action::Update)?;
        let count = changed_fields.len().max(1);
        debug!(
            "Emitting {} {} events for {:?}",
            count, operation, changed_fields
        );
        (0..count)
            .map(|_| self.persist(operation, &encoded))
            .collect()
    }

    fn encode(&self, record: &TransactionRecord, action: Action) -> Result<String> {
        let operation = SyncOperation::new(action, record.resource());
        let payload = build_payload(self.config, self.store, record, operation)?;
        let compression = self.config.operation(operation)?.compression;
        encode_payload_with(&payload, &compression)
            .chain_err(|| format!("Failed to encode {} payload", operation))
    }

    fn persist(&self, operation: SyncOperation, encoded: &str) -> Result<i32> {
        let update = NewSyncUpdate {
            update_type: SYNC_UPDATE_TYPE.to_string(),
            uuid: Uuid::new_v4().to_string(),
            payload: encoded.to_string(),
        };
        let key = self.store.insert_sync_update(&update)?;
        info!(
            "Queued {} sync update {} ({} chars)",
            operation,
            update.uuid,
            encoded.len()
        );
        Ok(key)
    }
}
