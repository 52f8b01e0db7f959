use chrono::NaiveDate;
use diesel::connection::TransactionManager;
use diesel::dsl::max;
use diesel::prelude::*;
use log::debug;
use rust_decimal::Decimal;
use std::path;

use crate::constants::*;
use crate::errors::*;
use crate::ledger::*;
use crate::models::*;
use crate::schema::{
    account, accounttrans, category, deviceinfo, expense, income, settings, subcategory,
    syncupdate, transfer,
};
use crate::types::*;
use crate::utilities::*;

no_arg_sql_function!(last_insert_rowid, diesel::sql_types::Integer);

type ExpenseRow = (
    i32,
    String,
    i32,
    i32,
    f64,
    Option<String>,
    i32,
    String,
    Option<String>,
    Option<String>,
);
type IncomeRow = (
    i32,
    String,
    String,
    f64,
    Option<String>,
    i32,
    String,
    Option<String>,
    Option<String>,
);
type TransferRow = (
    i32,
    String,
    i32,
    i32,
    f64,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// A HomeBudget ledger file opened through diesel.
pub struct Database {
    connection: SqliteConnection,
}

/// Updates the monetary and notes columns shared by the three record tables.
/// A new amount without an explicit currency amount is mirrored into
/// `currencyAmount`.
macro_rules! update_record_columns {
    ($table:ident, $key:expr, $changes:expr, $connection:expr) => {{
        let changes: &RecordChanges = $changes;
        diesel::update($table::table.filter($table::key.eq($key)))
            .set((
                changes
                    .amount
                    .map(|value| $table::amount.eq(decimal_to_f64(value))),
                changes
                    .notes
                    .as_ref()
                    .map(|value| $table::notes.eq(value.as_str())),
                changes
                    .currency
                    .map(|value| $table::currency.eq(value.to_string())),
                changes
                    .currency_amount
                    .or(changes.amount)
                    .map(|value| $table::currency_amount.eq(value.to_string())),
            ))
            .execute($connection)
    }};
}

impl Database {
    /// Opens an existing ledger.  The schema is owned by the native app, so a
    /// missing file is an error rather than something to create.
    pub fn establish_connection(database_file: &str) -> Result<Database> {
        ensure!(
            path::Path::new(database_file).is_file(),
            ErrorKind::NotFound(format!("Database file {}", database_file))
        );
        debug!("Using database file: {}", database_file);
        let connection = SqliteConnection::establish(database_file)
            .chain_err(|| "Failed to establish SQLite database connection")?;
        Ok(Database::from_connection(connection))
    }

    pub fn from_connection(connection: SqliteConnection) -> Database {
        Database { connection }
    }

    fn last_insert_key(&self) -> Result<i32> {
        diesel::select(last_insert_rowid)
            .get_result::<i32>(&self.connection)
            .chain_err(|| "Failed to read key of inserted row")
    }

    fn require_entity(&self, table: EntityTable, name: &str) -> Result<EntityRow> {
        self.find_entity(table, name)?
            .ok_or_else(|| ErrorKind::NotFound(format!("{} '{}'", table, name)).into())
    }

    fn entity_name(&self, table: EntityTable, key_: i32) -> Result<String> {
        let found = match table {
            EntityTable::Account => account::table
                .select(account::name)
                .filter(account::key.eq(key_))
                .first::<String>(&self.connection)
                .optional(),
            EntityTable::Category => category::table
                .select(category::name)
                .filter(category::key.eq(key_))
                .first::<String>(&self.connection)
                .optional(),
            EntityTable::SubCategory => subcategory::table
                .select(subcategory::name)
                .filter(subcategory::key.eq(key_))
                .first::<String>(&self.connection)
                .optional(),
        }
        .chain_err(|| format!("Failed to load {} name from database", table))?;
        found.ok_or_else(|| ErrorKind::NotFound(format!("{} with key {}", table, key_)).into())
    }

    fn next_device_key(&self, resource: Resource) -> Result<i32> {
        let current = match resource {
            Resource::Expense => expense::table
                .select(max(expense::device_key))
                .first::<Option<i32>>(&self.connection),
            Resource::Income => income::table
                .select(max(income::device_key))
                .first::<Option<i32>>(&self.connection),
            Resource::Transfer => transfer::table
                .select(max(transfer::device_key))
                .first::<Option<i32>>(&self.connection),
        }
        .chain_err(|| format!("Failed to load highest {} device key", resource))?;
        Ok(current.unwrap_or(0) + 1)
    }

    fn insert_account_trans(
        &self,
        account_key: i32,
        trans_type: i32,
        trans_key: i32,
        trans_date: &str,
        amount: Decimal,
        time_stamp: &str,
    ) -> Result<()> {
        diesel::insert_into(accounttrans::table)
            .values((
                accounttrans::account_key.eq(account_key),
                accounttrans::time_stamp.eq(time_stamp),
                accounttrans::trans_type.eq(trans_type),
                accounttrans::trans_key.eq(trans_key),
                accounttrans::trans_date.eq(trans_date),
                accounttrans::trans_amount.eq(decimal_to_f64(amount)),
                accounttrans::checked.eq(FLAG_NO),
            ))
            .execute(&self.connection)
            .chain_err(|| "Failed to save account transaction row")?;
        Ok(())
    }

    fn insert_expense(
        &self,
        draft: &TransactionDraft,
        account_name: &str,
        category_name: &str,
        subcategory_name: &str,
    ) -> Result<TransactionRecord> {
        let account_row = self.require_entity(EntityTable::Account, account_name)?;
        let category_row = self.require_entity(EntityTable::Category, category_name)?;
        let subcategory_row = self.require_entity(EntityTable::SubCategory, subcategory_name)?;
        let date_text = format_iso_date(draft.date);
        let amount_value = decimal_to_f64(draft.amount);
        let notes_text = draft.notes.clone().unwrap_or_default();

        let duplicate = expense::table
            .select(expense::key)
            .filter(expense::date.eq(date_text.as_str()))
            .filter(expense::pay_from.eq(account_row.key))
            .filter(expense::amount.eq(amount_value))
            .filter(expense::cat_key.eq(category_row.key))
            .filter(expense::sub_cat_key.eq(subcategory_row.key))
            .filter(expense::notes.eq(notes_text.as_str()))
            .first::<i32>(&self.connection)
            .optional()
            .chain_err(|| "Failed to check for duplicate expense")?;
        if duplicate.is_some() {
            bail!(ErrorKind::Duplicate(
                Resource::Expense.to_string(),
                duplicate_details(&[
                    ("date", date_text.as_str()),
                    ("account", account_name),
                    ("amount", draft.amount.to_string().as_str()),
                    ("category", category_name),
                    ("subcategory", subcategory_name),
                    ("notes", notes_text.as_str()),
                ])
            ));
        }

        let foreign = storage_foreign(draft, account_row.currency.as_ref())?;
        let time_stamp = current_timestamp();
        let device_key = self.next_device_key(Resource::Expense)?;
        let device_id_key = self.primary_device()?.map(|device| device.key);
        diesel::insert_into(expense::table)
            .values((
                expense::date.eq(date_text.as_str()),
                expense::cat_key.eq(category_row.key),
                expense::sub_cat_key.eq(subcategory_row.key),
                expense::amount.eq(amount_value),
                expense::periods.eq(DEFAULT_PERIODS),
                expense::notes.eq(notes_text.as_str()),
                expense::is_detail_entry.eq(FLAG_YES),
                expense::master_key.eq(DEFAULT_MASTER_KEY),
                expense::includes_receipt.eq(FLAG_NO),
                expense::pay_from.eq(account_row.key),
                expense::payee_key.eq(DEFAULT_PAYEE_KEY),
                expense::bill_key.eq(DEFAULT_BILL_KEY),
                expense::device_id_key.eq(device_id_key),
                expense::device_key.eq(device_key),
                expense::time_stamp.eq(time_stamp.as_str()),
                expense::currency.eq(foreign.currency_text()),
                expense::currency_amount.eq(foreign.amount_text()),
                expense::recurring_key.eq(DEFAULT_RECURRING_KEY),
                expense::is_category_split.eq(FLAG_NO),
            ))
            .execute(&self.connection)
            .chain_err(|| "Failed to save new expense to database")?;
        let key = self.last_insert_key()?;
        self.insert_account_trans(
            account_row.key,
            TRANS_TYPE_EXPENSE,
            key,
            &date_text,
            draft.amount,
            &time_stamp,
        )?;
        debug!("Inserted expense {} (device key {})", key, device_key);
        Ok(new_record(key, draft, foreign.into_foreign(), time_stamp))
    }

    fn insert_income(
        &self,
        draft: &TransactionDraft,
        account_name: &str,
        income_name: &str,
    ) -> Result<TransactionRecord> {
        let account_row = self.require_entity(EntityTable::Account, account_name)?;
        let date_text = format_iso_date(draft.date);
        let amount_value = decimal_to_f64(draft.amount);
        let notes_text = draft.notes.clone().unwrap_or_default();

        let duplicate = income::table
            .select(income::key)
            .filter(income::date.eq(date_text.as_str()))
            .filter(income::add_income_to.eq(account_row.key))
            .filter(income::amount.eq(amount_value))
            .filter(income::name.eq(income_name))
            .filter(income::notes.eq(notes_text.as_str()))
            .first::<i32>(&self.connection)
            .optional()
            .chain_err(|| "Failed to check for duplicate income")?;
        if duplicate.is_some() {
            bail!(ErrorKind::Duplicate(
                Resource::Income.to_string(),
                duplicate_details(&[
                    ("date", date_text.as_str()),
                    ("account", account_name),
                    ("amount", draft.amount.to_string().as_str()),
                    ("name", income_name),
                    ("notes", notes_text.as_str()),
                ])
            ));
        }

        let foreign = storage_foreign(draft, account_row.currency.as_ref())?;
        let time_stamp = current_timestamp();
        let device_key = self.next_device_key(Resource::Income)?;
        let device_id_key = self.primary_device()?.map(|device| device.key);
        diesel::insert_into(income::table)
            .values((
                income::date.eq(date_text.as_str()),
                income::name.eq(income_name),
                income::amount.eq(amount_value),
                income::notes.eq(notes_text.as_str()),
                income::add_income_to.eq(account_row.key),
                income::device_id_key.eq(device_id_key),
                income::device_key.eq(device_key),
                income::time_stamp.eq(time_stamp.as_str()),
                income::currency.eq(foreign.currency_text()),
                income::currency_amount.eq(foreign.amount_text()),
            ))
            .execute(&self.connection)
            .chain_err(|| "Failed to save new income to database")?;
        let key = self.last_insert_key()?;
        self.insert_account_trans(
            account_row.key,
            TRANS_TYPE_INCOME,
            key,
            &date_text,
            draft.amount,
            &time_stamp,
        )?;
        debug!("Inserted income {} (device key {})", key, device_key);
        Ok(new_record(key, draft, foreign.into_foreign(), time_stamp))
    }

    fn insert_transfer(
        &self,
        draft: &TransactionDraft,
        from_account_name: &str,
        to_account_name: &str,
    ) -> Result<TransactionRecord> {
        let from_row = self.require_entity(EntityTable::Account, from_account_name)?;
        let to_row = self.require_entity(EntityTable::Account, to_account_name)?;
        let date_text = format_iso_date(draft.date);
        let amount_value = decimal_to_f64(draft.amount);
        let notes_text = draft.notes.clone().unwrap_or_default();

        let duplicate = transfer::table
            .select(transfer::key)
            .filter(transfer::date.eq(date_text.as_str()))
            .filter(transfer::from_account.eq(from_row.key))
            .filter(transfer::to_account.eq(to_row.key))
            .filter(transfer::amount.eq(amount_value))
            .filter(transfer::notes.eq(notes_text.as_str()))
            .first::<i32>(&self.connection)
            .optional()
            .chain_err(|| "Failed to check for duplicate transfer")?;
        if duplicate.is_some() {
            bail!(ErrorKind::Duplicate(
                Resource::Transfer.to_string(),
                duplicate_details(&[
                    ("date", date_text.as_str()),
                    ("from_account", from_account_name),
                    ("to_account", to_account_name),
                    ("amount", draft.amount.to_string().as_str()),
                    ("notes", notes_text.as_str()),
                ])
            ));
        }

        let foreign = storage_foreign(draft, from_row.currency.as_ref())?;
        let time_stamp = current_timestamp();
        let device_key = self.next_device_key(Resource::Transfer)?;
        let device_id_key = self.primary_device()?.map(|device| device.key);
        diesel::insert_into(transfer::table)
            .values((
                transfer::date.eq(date_text.as_str()),
                transfer::from_account.eq(from_row.key),
                transfer::to_account.eq(to_row.key),
                transfer::amount.eq(amount_value),
                transfer::notes.eq(notes_text.as_str()),
                transfer::device_id_key.eq(device_id_key),
                transfer::device_key.eq(device_key),
                transfer::currency.eq(foreign.currency_text()),
                transfer::currency_amount.eq(foreign.amount_text()),
            ))
            .execute(&self.connection)
            .chain_err(|| "Failed to save new transfer to database")?;
        let key = self.last_insert_key()?;
        self.insert_account_trans(
            from_row.key,
            TRANS_TYPE_TRANSFER_OUT,
            key,
            &date_text,
            draft.amount,
            &time_stamp,
        )?;
        self.insert_account_trans(
            to_row.key,
            TRANS_TYPE_TRANSFER_IN,
            key,
            &date_text,
            draft.amount,
            &time_stamp,
        )?;
        debug!("Inserted transfer {} (device key {})", key, device_key);
        Ok(new_record(key, draft, foreign.into_foreign(), time_stamp))
    }

    fn load_expenses(
        &self,
        key_: Option<i32>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>> {
        let mut query = expense::table
            .select((
                expense::key,
                expense::date,
                expense::cat_key,
                expense::sub_cat_key,
                expense::amount,
                expense::notes,
                expense::pay_from,
                expense::time_stamp,
                expense::currency,
                expense::currency_amount,
            ))
            .into_boxed();
        if let Some(key_) = key_ {
            query = query.filter(expense::key.eq(key_));
        }
        if let Some(start_date) = start_date {
            query = query.filter(expense::date.ge(format_iso_date(start_date)));
        }
        if let Some(end_date) = end_date {
            query = query.filter(expense::date.le(format_iso_date(end_date)));
        }
        query
            .order((expense::date.asc(), expense::key.asc()))
            .load::<ExpenseRow>(&self.connection)
            .chain_err(|| "Failed to load expenses from database")?
            .into_iter()
            .map(
                |(
                    key,
                    date_text,
                    cat_key,
                    sub_cat_key,
                    amount,
                    notes,
                    pay_from,
                    time_stamp,
                    currency,
                    currency_amount,
                )| {
                    Ok(TransactionRecord {
                        key,
                        date: parse_iso_date(&date_text)?,
                        amount: decimal_from_f64(amount)?,
                        foreign: stored_foreign(currency, currency_amount)?,
                        notes: non_empty(notes),
                        time_stamp,
                        details: RecordDetails::Expense {
                            account: self.entity_name(EntityTable::Account, pay_from)?,
                            category: self.entity_name(EntityTable::Category, cat_key)?,
                            subcategory: self
                                .entity_name(EntityTable::SubCategory, sub_cat_key)?,
                        },
                    })
                },
            )
            .collect::<Result<Vec<_>>>()
    }

    fn load_incomes(
        &self,
        key_: Option<i32>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>> {
        let mut query = income::table
            .select((
                income::key,
                income::date,
                income::name,
                income::amount,
                income::notes,
                income::add_income_to,
                income::time_stamp,
                income::currency,
                income::currency_amount,
            ))
            .into_boxed();
        if let Some(key_) = key_ {
            query = query.filter(income::key.eq(key_));
        }
        if let Some(start_date) = start_date {
            query = query.filter(income::date.ge(format_iso_date(start_date)));
        }
        if let Some(end_date) = end_date {
            query = query.filter(income::date.le(format_iso_date(end_date)));
        }
        query
            .order((income::date.asc(), income::key.asc()))
            .load::<IncomeRow>(&self.connection)
            .chain_err(|| "Failed to load incomes from database")?
            .into_iter()
            .map(
                |(key, date_text, name, amount, notes, account_key, time_stamp, currency, currency_amount)| {
                    Ok(TransactionRecord {
                        key,
                        date: parse_iso_date(&date_text)?,
                        amount: decimal_from_f64(amount)?,
                        foreign: stored_foreign(currency, currency_amount)?,
                        notes: non_empty(notes),
                        time_stamp,
                        details: RecordDetails::Income {
                            account: self.entity_name(EntityTable::Account, account_key)?,
                            name,
                        },
                    })
                },
            )
            .collect::<Result<Vec<_>>>()
    }

    fn load_transfers(
        &self,
        key_: Option<i32>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>> {
        let mut query = transfer::table
            .select((
                transfer::key,
                transfer::date,
                transfer::from_account,
                transfer::to_account,
                transfer::amount,
                transfer::notes,
                transfer::currency,
                transfer::currency_amount,
            ))
            .into_boxed();
        if let Some(key_) = key_ {
            query = query.filter(transfer::key.eq(key_));
        }
        if let Some(start_date) = start_date {
            query = query.filter(transfer::date.ge(format_iso_date(start_date)));
        }
        if let Some(end_date) = end_date {
            query = query.filter(transfer::date.le(format_iso_date(end_date)));
        }
        query
            .order((transfer::date.asc(), transfer::key.asc()))
            .load::<TransferRow>(&self.connection)
            .chain_err(|| "Failed to load transfers from database")?
            .into_iter()
            .map(
                |(key, date_text, from_key, to_key, amount, notes, currency, currency_amount)| {
                    Ok(TransactionRecord {
                        key,
                        date: parse_iso_date(&date_text)?,
                        amount: decimal_from_f64(amount)?,
                        foreign: stored_foreign(currency, currency_amount)?,
                        notes: non_empty(notes),
                        time_stamp: self.transfer_time_stamp(key)?,
                        details: RecordDetails::Transfer {
                            from_account: self.entity_name(EntityTable::Account, from_key)?,
                            to_account: self.entity_name(EntityTable::Account, to_key)?,
                        },
                    })
                },
            )
            .collect::<Result<Vec<_>>>()
    }

    /// Transfers have no timestamp column; the outgoing account row carries it.
    fn transfer_time_stamp(&self, key_: i32) -> Result<String> {
        use crate::schema::accounttrans::dsl::*;
        Ok(accounttrans
            .select(time_stamp)
            .filter(trans_type.eq(TRANS_TYPE_TRANSFER_OUT))
            .filter(trans_key.eq(key_))
            .first::<String>(&self.connection)
            .optional()
            .chain_err(|| "Failed to load transfer timestamp from database")?
            .unwrap_or_default())
    }

    fn update_account_trans_amount(
        &self,
        resource: Resource,
        key_: i32,
        amount: Decimal,
    ) -> Result<()> {
        diesel::update(
            accounttrans::table
                .filter(accounttrans::trans_key.eq(key_))
                .filter(accounttrans::trans_type.eq_any(account_trans_types(resource))),
        )
        .set(accounttrans::trans_amount.eq(decimal_to_f64(amount)))
        .execute(&self.connection)
        .chain_err(|| "Failed to update account transaction amount")?;
        Ok(())
    }
}

impl LedgerStore for Database {
    fn begin(&self) -> Result<()> {
        debug!("Beginning ledger transaction");
        self.connection
            .transaction_manager()
            .begin_transaction(&self.connection)
            .chain_err(|| "Failed to begin ledger transaction")
    }

    fn commit(&self) -> Result<()> {
        debug!("Committing ledger transaction");
        self.connection
            .transaction_manager()
            .commit_transaction(&self.connection)
            .chain_err(|| "Failed to commit ledger transaction")
    }

    fn rollback(&self) -> Result<()> {
        debug!("Rolling back ledger transaction");
        self.connection
            .transaction_manager()
            .rollback_transaction(&self.connection)
            .chain_err(|| "Failed to roll back ledger transaction")
    }

    fn insert(&self, draft: &TransactionDraft) -> Result<TransactionRecord> {
        draft.validate()?;
        match &draft.details {
            RecordDetails::Expense {
                account,
                category,
                subcategory,
            } => self.insert_expense(draft, account, category, subcategory),
            RecordDetails::Income { account, name } => self.insert_income(draft, account, name),
            RecordDetails::Transfer {
                from_account,
                to_account,
            } => self.insert_transfer(draft, from_account, to_account),
        }
    }

    fn get(&self, resource: Resource, key_: i32) -> Result<TransactionRecord> {
        let records = match resource {
            Resource::Expense => self.load_expenses(Some(key_), None, None)?,
            Resource::Income => self.load_incomes(Some(key_), None, None)?,
            Resource::Transfer => self.load_transfers(Some(key_), None, None)?,
        };
        records
            .into_iter()
            .next()
            .ok_or_else(|| ErrorKind::NotFound(format!("{} {}", resource.title(), key_)).into())
    }

    fn list(
        &self,
        resource: Resource,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<TransactionRecord>> {
        match resource {
            Resource::Expense => self.load_expenses(None, start_date, end_date),
            Resource::Income => self.load_incomes(None, start_date, end_date),
            Resource::Transfer => self.load_transfers(None, start_date, end_date),
        }
    }

    fn update(
        &self,
        resource: Resource,
        key_: i32,
        changes: &RecordChanges,
    ) -> Result<TransactionRecord> {
        ensure!(
            !changes.is_empty(),
            validation_error("At least one field must be provided to update")
        );
        let updated = match resource {
            Resource::Expense => update_record_columns!(expense, key_, changes, &self.connection),
            Resource::Income => update_record_columns!(income, key_, changes, &self.connection),
            Resource::Transfer => update_record_columns!(transfer, key_, changes, &self.connection),
        }
        .chain_err(|| format!("Failed to update {} {}", resource, key_))?;
        if updated == 0 {
            bail!(ErrorKind::NotFound(format!("{} {}", resource.title(), key_)));
        }
        if let Some(amount) = changes.amount {
            self.update_account_trans_amount(resource, key_, amount)?;
        }
        self.get(resource, key_)
    }

    fn delete(&self, resource: Resource, key_: i32) -> Result<()> {
        let deleted = match resource {
            Resource::Expense => {
                diesel::delete(expense::table.filter(expense::key.eq(key_))).execute(&self.connection)
            }
            Resource::Income => {
                diesel::delete(income::table.filter(income::key.eq(key_))).execute(&self.connection)
            }
            Resource::Transfer => diesel::delete(transfer::table.filter(transfer::key.eq(key_)))
                .execute(&self.connection),
        }
        .chain_err(|| format!("Failed to delete {} {}", resource, key_))?;
        if deleted == 0 {
            bail!(ErrorKind::NotFound(format!("{} {}", resource.title(), key_)));
        }
        diesel::delete(
            accounttrans::table
                .filter(accounttrans::trans_key.eq(key_))
                .filter(accounttrans::trans_type.eq_any(account_trans_types(resource))),
        )
        .execute(&self.connection)
        .chain_err(|| "Failed to delete account transaction rows")?;
        Ok(())
    }

    fn find_entity(&self, table: EntityTable, name_: &str) -> Result<Option<EntityRow>> {
        let row = match table {
            EntityTable::Account => account::table
                .select((
                    account::key,
                    account::device_id_key,
                    account::device_key,
                    account::currency,
                ))
                .filter(account::name.eq(name_))
                .first::<(i32, Option<i32>, Option<i32>, Option<String>)>(&self.connection)
                .optional(),
            EntityTable::Category => category::table
                .select((category::key, category::device_id_key, category::device_key))
                .filter(category::name.eq(name_))
                .first::<(i32, Option<i32>, Option<i32>)>(&self.connection)
                .optional()
                .map(|opt| opt.map(|(key, id_key, device_key)| (key, id_key, device_key, None))),
            EntityTable::SubCategory => subcategory::table
                .select((
                    subcategory::key,
                    subcategory::device_id_key,
                    subcategory::device_key,
                ))
                .filter(subcategory::name.eq(name_))
                .first::<(i32, Option<i32>, Option<i32>)>(&self.connection)
                .optional()
                .map(|opt| opt.map(|(key, id_key, device_key)| (key, id_key, device_key, None))),
        }
        .chain_err(|| format!("Failed to look up {} '{}'", table, name_))?;
        Ok(row.map(|(key, device_id_key, device_key, currency)| EntityRow {
            key,
            device_id_key,
            device_key,
            currency,
        }))
    }

    fn primary_device(&self) -> Result<Option<DeviceInfo>> {
        use crate::schema::deviceinfo::dsl::*;
        Ok(deviceinfo
            .select((key, device_id))
            .filter(is_primary.eq(FLAG_YES))
            .filter(is_active.eq(FLAG_YES))
            .order(key.asc())
            .first::<(i32, String)>(&self.connection)
            .optional()
            .chain_err(|| "Failed to load primary device from database")?
            .map(|(key_, device_id_)| DeviceInfo {
                key: key_,
                device_id: device_id_,
            }))
    }

    fn device_id(&self, device_key: i32) -> Result<Option<String>> {
        deviceinfo::table
            .select(deviceinfo::device_id)
            .filter(deviceinfo::key.eq(device_key))
            .first::<String>(&self.connection)
            .optional()
            .chain_err(|| "Failed to load device id from database")
    }

    fn base_currency(&self) -> Result<Option<String>> {
        let currency = settings::table
            .select(settings::currency)
            .first::<Option<String>>(&self.connection)
            .optional()
            .chain_err(|| "Failed to load settings currency from database")?;
        Ok(non_empty(currency.and_then(|value| value)))
    }

    fn insert_sync_update(&self, update: &NewSyncUpdate) -> Result<i32> {
        diesel::insert_into(syncupdate::table)
            .values((
                syncupdate::update_type.eq(update.update_type.as_str()),
                syncupdate::uuid.eq(update.uuid.as_str()),
                syncupdate::payload.eq(update.payload.as_str()),
            ))
            .execute(&self.connection)
            .chain_err(|| "Failed to save sync update to database")?;
        self.last_insert_key()
    }

    fn recent_sync_updates(&self, limit: i64) -> Result<Vec<SyncUpdateRow>> {
        Ok(syncupdate::table
            .select((
                syncupdate::key,
                syncupdate::update_type,
                syncupdate::uuid,
                syncupdate::payload,
            ))
            .order(syncupdate::key.desc())
            .limit(limit)
            .load::<(i32, String, String, String)>(&self.connection)
            .chain_err(|| "Failed to load sync updates from database")?
            .into_iter()
            .map(|(key, update_type, uuid, payload)| SyncUpdateRow {
                key,
                update_type,
                uuid,
                payload,
            })
            .collect())
    }
}

/// Currency columns as they will be stored, after applying account defaults.
struct StoredForeign(Option<CurrencyCode>, Decimal);

impl StoredForeign {
    fn currency_text(&self) -> Option<String> {
        self.0.map(|currency| currency.to_string())
    }

    fn amount_text(&self) -> String {
        self.1.to_string()
    }

    fn into_foreign(self) -> Option<ForeignAmount> {
        let amount = self.1;
        self.0.map(|currency| ForeignAmount { currency, amount })
    }
}

fn storage_foreign(
    draft: &TransactionDraft,
    account_currency: Option<&String>,
) -> Result<StoredForeign> {
    let currency = match draft.currency {
        Some(currency) => Some(currency),
        None => account_currency
            .filter(|code| !code.trim().is_empty())
            .map(|code| CurrencyCode::from_str(code))
            .transpose()?,
    };
    Ok(StoredForeign(
        currency,
        draft.currency_amount.unwrap_or(draft.amount),
    ))
}

fn stored_foreign(
    currency: Option<String>,
    currency_amount: Option<String>,
) -> Result<Option<ForeignAmount>> {
    match (non_empty(currency), non_empty(currency_amount)) {
        (Some(currency), Some(amount)) => Ok(Some(ForeignAmount {
            currency: CurrencyCode::from_str(&currency)?,
            amount: parse_decimal(&amount, "stored currency amount")?,
        })),
        _ => Ok(None),
    }
}

fn new_record(
    key: i32,
    draft: &TransactionDraft,
    foreign: Option<ForeignAmount>,
    time_stamp: String,
) -> TransactionRecord {
    TransactionRecord {
        key,
        date: draft.date,
        amount: draft.amount,
        foreign,
        notes: non_empty(draft.notes.clone()),
        time_stamp,
        details: draft.details.clone(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn duplicate_details(fields: &[(&str, &str)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

fn account_trans_types(resource: Resource) -> Vec<i32> {
    match resource {
        Resource::Expense => vec![TRANS_TYPE_EXPENSE],
        Resource::Income => vec![TRANS_TYPE_INCOME],
        Resource::Transfer => vec![TRANS_TYPE_TRANSFER_OUT, TRANS_TYPE_TRANSFER_IN],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::*;

    #[test]
    fn test_insert_expense_fills_storage_defaults() {
        let database = ledger();
        let record = database.insert(&expense_draft("25.50")).unwrap();
        assert_eq!(record.amount, decimal("25.50"));
        assert_eq!(
            record.foreign,
            Some(ForeignAmount {
                currency: currency("SGD"),
                amount: decimal("25.50"),
            })
        );
        let loaded = database.get(Resource::Expense, record.key).unwrap();
        assert_eq!(loaded.amount, decimal("25.5"));
        assert_eq!(loaded.currency(), Some(currency("SGD")));
        assert_eq!(loaded.time_stamp, record.time_stamp);
        assert_eq!(loaded.details, record.details);
    }

    #[test]
    fn test_insert_assigns_increasing_device_keys() {
        use crate::schema::expense::dsl::*;
        let database = ledger();
        let first = database.insert(&expense_draft("1.00")).unwrap();
        let second = database.insert(&expense_draft("2.00")).unwrap();
        let keys = expense
            .select((device_key, device_id_key))
            .filter(key.eq_any(vec![first.key, second.key]))
            .order(key.asc())
            .load::<(Option<i32>, Option<i32>)>(&database.connection)
            .unwrap();
        assert_eq!(keys, vec![(Some(1), Some(1)), (Some(2), Some(1))]);
    }

    #[test]
    fn test_insert_duplicate_expense_fails() {
        let database = ledger();
        database.insert(&expense_draft("10.00")).unwrap();
        let err = database.insert(&expense_draft("10.00")).unwrap_err();
        match err.kind() {
            ErrorKind::Duplicate(resource, details) => {
                assert_eq!(resource, "expense");
                assert!(details.contains(&("amount".to_string(), "10.00".to_string())));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_insert_unknown_account_is_not_found() {
        let database = ledger();
        let mut draft = expense_draft("10.00");
        draft.details = RecordDetails::Expense {
            account: "Nowhere".to_string(),
            category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
        };
        assert!(database.insert(&draft).unwrap_err().is_not_found());
    }

    #[test]
    fn test_insert_transfer_writes_both_account_rows() {
        let database = ledger();
        let record = database.insert(&transfer_draft("200.00")).unwrap();
        let types = accounttrans::table
            .select(accounttrans::trans_type)
            .filter(accounttrans::trans_key.eq(record.key))
            .order(accounttrans::trans_type.asc())
            .load::<i32>(&database.connection)
            .unwrap();
        assert_eq!(types, vec![TRANS_TYPE_TRANSFER_OUT, TRANS_TYPE_TRANSFER_IN]);
        let loaded = database.get(Resource::Transfer, record.key).unwrap();
        assert_eq!(loaded.time_stamp, record.time_stamp);
        assert_eq!(loaded.account(), "Cash");
    }

    #[test]
    fn test_update_amount_mirrors_currency_amount() {
        let database = ledger();
        let record = database.insert(&income_draft("100.00")).unwrap();
        let changes = RecordChanges {
            amount: Some(decimal("120.00")),
            ..RecordChanges::default()
        };
        let updated = database.update(Resource::Income, record.key, &changes).unwrap();
        assert_eq!(updated.amount, decimal("120"));
        assert_eq!(updated.currency_amount(), Some(decimal("120.00")));
        let trans_amount = accounttrans::table
            .select(accounttrans::trans_amount)
            .filter(accounttrans::trans_key.eq(record.key))
            .filter(accounttrans::trans_type.eq(TRANS_TYPE_INCOME))
            .first::<f64>(&database.connection)
            .unwrap();
        assert!((trans_amount - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_missing_record_is_not_found() {
        let database = ledger();
        let changes = RecordChanges {
            notes: Some("x".to_string()),
            ..RecordChanges::default()
        };
        assert!(database
            .update(Resource::Expense, 999, &changes)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_delete_removes_record_and_account_rows() {
        let database = ledger();
        let record = database.insert(&expense_draft("5.00")).unwrap();
        database.delete(Resource::Expense, record.key).unwrap();
        assert!(database
            .get(Resource::Expense, record.key)
            .unwrap_err()
            .is_not_found());
        let remaining: i64 = accounttrans::table
            .count()
            .get_result(&database.connection)
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(database
            .delete(Resource::Expense, record.key)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_list_filters_by_date_range() {
        let database = ledger();
        let mut early = expense_draft("1.00");
        early.date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        database.insert(&early).unwrap();
        database.insert(&expense_draft("2.00")).unwrap();
        let records = database
            .list(Resource::Expense, Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()), None)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, decimal("2"));
    }

    #[test]
    fn test_nested_rollback_only_undoes_savepoint() {
        let database = ledger();
        database.begin().unwrap();
        database.insert(&expense_draft("1.00")).unwrap();
        database.begin().unwrap();
        database.insert(&expense_draft("2.00")).unwrap();
        database.rollback().unwrap();
        database.commit().unwrap();
        let records = database.list(Resource::Expense, None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, decimal("1"));
    }

    #[test]
    fn test_device_lookups() {
        let database = ledger();
        assert_eq!(
            database.primary_device().unwrap(),
            Some(DeviceInfo {
                key: 1,
                device_id: PRIMARY_DEVICE_ID.to_string(),
            })
        );
        assert_eq!(
            database.device_id(2).unwrap(),
            Some(TABLET_DEVICE_ID.to_string())
        );
        assert_eq!(database.base_currency().unwrap(), Some("SGD".to_string()));
        let row = database
            .find_entity(EntityTable::Account, "Wallet USD")
            .unwrap()
            .unwrap();
        assert_eq!(row.currency, Some("USD".to_string()));
        assert!(database
            .find_entity(EntityTable::SubCategory, "Nothing")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sync_update_rows() {
        let database = ledger();
        for index in 0..3 {
            database
                .insert_sync_update(&NewSyncUpdate {
                    update_type: SYNC_UPDATE_TYPE.to_string(),
                    uuid: format!("uuid-{}", index),
                    payload: "payload".to_string(),
                })
                .unwrap();
        }
        let rows = database.recent_sync_updates(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uuid, "uuid-2");
        assert_eq!(rows[1].uuid, "uuid-1");
    }
}
