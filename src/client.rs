use chrono::NaiveDate;
use log::{debug, error, info, warn};

use crate::batch::*;
use crate::errors::*;
use crate::exchange_rates::*;
use crate::ledger::*;
use crate::models::*;
use crate::normalizer::*;
use crate::sync::*;
use crate::sync_config::*;
use crate::types::*;

/// When a batch writes its SyncUpdate rows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmitMode {
    /// Right after each item is stored, inside that item's savepoint.
    PerItem,
    /// After every item has been attempted, for the items that succeeded.
    Consolidated,
    Disabled,
}

/// Sync rows owed for one stored record.
#[derive(Clone, Debug, PartialEq)]
enum SyncEvent {
    Single(Action),
    Changes(Vec<ChangedField>),
}

/// Mutations against a ledger, each wrapped in one transaction together with
/// the sync rows that describe it.
pub struct HomeBudgetClient<S: LedgerStore> {
    store: S,
    sync_config: Option<SyncConfig>,
    rates: Box<dyn RateProvider>,
    base_currency: Option<CurrencyCode>,
}

impl<S: LedgerStore> HomeBudgetClient<S> {
    /// A client that stores records without emitting sync rows.
    pub fn new(store: S, rates: Box<dyn RateProvider>) -> HomeBudgetClient<S> {
        HomeBudgetClient {
            store,
            sync_config: None,
            rates,
            base_currency: None,
        }
    }

    pub fn with_sync(mut self, config: SyncConfig) -> HomeBudgetClient<S> {
        self.sync_config = Some(config);
        self
    }

    /// Overrides the ledger's own base currency setting.
    pub fn with_base_currency(mut self, currency: CurrencyCode) -> HomeBudgetClient<S> {
        self.base_currency = Some(currency);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_config.is_some()
    }

    pub fn base_currency(&self) -> Result<CurrencyCode> {
        if let Some(currency) = self.base_currency {
            return Ok(currency);
        }
        match self.store.base_currency()? {
            Some(code) if !code.trim().is_empty() => CurrencyCode::from_str(&code)
                .chain_err(|| "Ledger settings hold an invalid base currency"),
            _ => bail!(validation_error(
                "No base currency configured in the ledger settings"
            )),
        }
    }

    pub fn add(&self, request: &AddRequest) -> Result<TransactionRecord> {
        let draft = self.prepare_request(request)?;
        self.add_draft(draft)
    }

    pub fn add_draft(&self, draft: TransactionDraft) -> Result<TransactionRecord> {
        let draft = self.prepare_draft(draft)?;
        self.run_transaction(|| {
            let record = self.store.insert(&draft)?;
            self.emit(&record, &SyncEvent::Single(Action::Add))?;
            Ok(record)
        })
    }

    pub fn update(
        &self,
        resource: Resource,
        key: i32,
        request: &UpdateRequest,
    ) -> Result<TransactionRecord> {
        let changes = self.prepare_changes(resource, request)?;
        self.run_transaction(|| {
            let record = self.store.update(resource, key, &changes)?;
            self.emit(&record, &SyncEvent::Changes(changes.changed_fields()))?;
            Ok(record)
        })
    }

    /// Deletes a record and returns it as it was before deletion.
    pub fn delete(&self, resource: Resource, key: i32) -> Result<TransactionRecord> {
        self.run_transaction(|| {
            let record = self.store.get(resource, key)?;
            self.store.delete(resource, key)?;
            self.emit(&record, &SyncEvent::Single(Action::Delete))?;
            Ok(record)
        })
    }

    pub fn get(&self, resource: Resource, key: i32) -> Result<TransactionRecord> {
        self.store.get(resource, key)
    }

    pub fn list(
        &self,
        resource: Resource,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>> {
        self.store.list(resource, start_date, end_date)
    }

    /// Runs mixed operations in one transaction, writing sync rows once the
    /// loop is over.
    pub fn batch(
        &self,
        operations: &[BatchOperation],
        continue_on_error: bool,
    ) -> Result<BatchResult<BatchOperation>> {
        self.batch_with_mode(operations, continue_on_error, EmitMode::Consolidated)
    }

    pub fn batch_with_mode(
        &self,
        operations: &[BatchOperation],
        continue_on_error: bool,
        mode: EmitMode,
    ) -> Result<BatchResult<BatchOperation>> {
        self.run_batch(operations, continue_on_error, mode, |operation| {
            self.apply_operation(operation)
        })
    }

    /// Inserts several drafts of any kind, with consolidated sync.
    pub fn add_batch(
        &self,
        drafts: &[TransactionDraft],
        continue_on_error: bool,
    ) -> Result<BatchResult<TransactionDraft>> {
        self.run_batch(drafts, continue_on_error, EmitMode::Consolidated, |draft| {
            let draft = self.prepare_draft(draft.clone())?;
            let record = self.store.insert(&draft)?;
            Ok((record, SyncEvent::Single(Action::Add)))
        })
    }

    fn apply_operation(&self, operation: &BatchOperation) -> Result<(TransactionRecord, SyncEvent)> {
        match decode_operation(operation)? {
            TypedOperation::Add(request) => {
                let draft = self.prepare_draft(self.prepare_request(&request)?)?;
                let record = self.store.insert(&draft)?;
                Ok((record, SyncEvent::Single(Action::Add)))
            }
            TypedOperation::Update {
                resource,
                key,
                request,
            } => {
                let changes = self.prepare_changes(resource, &request)?;
                let record = self.store.update(resource, key, &changes)?;
                Ok((record, SyncEvent::Changes(changes.changed_fields())))
            }
            TypedOperation::Delete { resource, key } => {
                let record = self.store.get(resource, key)?;
                self.store.delete(resource, key)?;
                Ok((record, SyncEvent::Single(Action::Delete)))
            }
        }
    }

    /// Every item runs inside its own savepoint, so a failed item leaves no
    /// partial writes behind even when the batch carries on.
    fn run_batch<T, F>(
        &self,
        items: &[T],
        continue_on_error: bool,
        mode: EmitMode,
        apply: F,
    ) -> Result<BatchResult<T>>
    where
        T: Clone,
        F: Fn(&T) -> Result<(TransactionRecord, SyncEvent)>,
    {
        let mode = if self.sync_enabled() {
            mode
        } else {
            EmitMode::Disabled
        };
        self.run_transaction(|| {
            let mut result = BatchResult::new();
            let mut events = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let outcome = self.run_transaction(|| {
                    let (record, event) = apply(item)?;
                    if mode == EmitMode::PerItem {
                        self.emit(&record, &event)?;
                    }
                    Ok((record, event))
                });
                match outcome {
                    Ok((record, event)) => {
                        result.successful.push(record.clone());
                        events.push((record, event));
                    }
                    Err(err) => {
                        warn!("Batch item {} failed: {}", index + 1, err);
                        if !continue_on_error {
                            return Err(err)
                                .chain_err(|| format!("Batch aborted at item {}", index + 1));
                        }
                        result.failed.push((item.clone(), err));
                    }
                }
            }
            if mode == EmitMode::Consolidated {
                for (record, event) in &events {
                    self.emit(record, event)?;
                }
            }
            info!(
                "Batch finished: {} succeeded, {} failed",
                result.successful.len(),
                result.failed.len()
            );
            Ok(result)
        })
    }

    fn normalizer(&self) -> Result<Normalizer<'_>> {
        Ok(Normalizer::new(self.base_currency()?, self.rates.as_ref()))
    }

    fn prepare_request(&self, request: &AddRequest) -> Result<TransactionDraft> {
        // The foreign amount is left for inference or storage to fill in.
        let options = NormalizeOptions {
            default_currency_amount: false,
            ..NormalizeOptions::for_add()
        };
        let normalized = self.normalizer()?.normalize(&request.money, options)?;
        let amount = normalized
            .amount
            .ok_or_else(|| monetary_error(&["amount", "currency_amount"], "amount is required"))?;
        // An explicit currency without a foreign amount is a 1:1 amount.
        let currency_amount = match (normalized.currency, normalized.currency_amount) {
            (Some(_), None) => Some(amount),
            (_, currency_amount) => currency_amount,
        };
        TransactionDraft::new(
            request.date,
            amount,
            request.notes.clone(),
            request.details.clone(),
        )?
        .with_foreign(normalized.currency, currency_amount)
    }

    fn prepare_draft(&self, draft: TransactionDraft) -> Result<TransactionDraft> {
        draft.validate()?;
        let normalizer = self.normalizer()?;
        let draft = normalizer.infer_currency(draft, |name| self.account_currency(name))?;
        if let RecordDetails::Transfer { from_account, .. } = &draft.details {
            if draft.currency.is_some() {
                normalizer.check_transfer_currency(&draft, self.account_currency(from_account)?)?;
            }
        }
        Ok(normalizer.round_draft(draft))
    }

    fn prepare_changes(&self, resource: Resource, request: &UpdateRequest) -> Result<RecordChanges> {
        ensure!(
            !request.is_empty(),
            validation_error(format!(
                "{} update requires at least one field",
                resource.title()
            ))
        );
        let normalizer = self.normalizer()?;
        let normalized = normalizer.normalize(
            &request.money,
            NormalizeOptions::for_update(request.notes.is_some()),
        )?;
        Ok(normalizer.round_changes(RecordChanges {
            amount: normalized.amount,
            notes: request.notes.clone(),
            currency: normalized.currency,
            currency_amount: normalized.currency_amount,
        }))
    }

    fn account_currency(&self, name: &str) -> Result<CurrencyCode> {
        let account = self
            .store
            .find_entity(EntityTable::Account, name)?
            .ok_or_else(|| Error::from(ErrorKind::NotFound(format!("Account '{}'", name))))?;
        match account.currency {
            Some(code) if !code.trim().is_empty() => CurrencyCode::from_str(&code),
            _ => bail!(validation_error(format!(
                "Account '{}' has no currency",
                name
            ))),
        }
    }

    fn emit(&self, record: &TransactionRecord, event: &SyncEvent) -> Result<()> {
        let config = match &self.sync_config {
            Some(config) => config,
            None => return Ok(()),
        };
        let manager = SyncUpdateManager::new(&self.store, config);
        match event {
            SyncEvent::Single(action) => {
                manager.create_sync_record(record, *action)?;
            }
            SyncEvent::Changes(fields) => {
                manager.create_updates_for_changes(record, fields)?;
            }
        }
        Ok(())
    }

    /// Commits when `action` succeeds and rolls back otherwise.  Nested calls
    /// run as savepoints.
    fn run_transaction<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.store.begin()?;
        match action() {
            Ok(value) => match self.store.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    self.rollback_after(&err);
                    Err(err)
                }
            },
            Err(err) => {
                debug!("Rolling back after error: {}", err);
                self.rollback_after(&err);
                Err(err)
            }
        }
    }

    fn rollback_after(&self, cause: &Error) {
        if let Err(rollback_err) = self.store.rollback() {
            error!(
                "Rollback failed ({}) while handling: {}",
                rollback_err, cause
            );
        }
    }
}
