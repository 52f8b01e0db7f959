use log::debug;
use rust_decimal::Decimal;

use crate::constants::*;
use crate::errors::*;
use crate::exchange_rates::*;
use crate::models::*;
use crate::types::*;

/// Monetary fields as supplied by a caller, before reconciliation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MonetaryInput {
    pub amount: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub currency_amount: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
}

/// Canonical `(amount, currency, currency_amount)` triple.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedAmounts {
    pub amount: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub currency_amount: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NormalizeOptions {
    /// Accept input without any amount (updates touching only notes).
    pub allow_empty: bool,
    /// Fill `currency_amount` from `amount` when only the latter is given.
    pub default_currency_amount: bool,
}

impl NormalizeOptions {
    pub fn for_add() -> NormalizeOptions {
        NormalizeOptions {
            allow_empty: false,
            default_currency_amount: true,
        }
    }

    pub fn for_update(allow_empty: bool) -> NormalizeOptions {
        NormalizeOptions {
            allow_empty,
            default_currency_amount: false,
        }
    }
}

/// Reconciles amounts and currencies against a base currency.
pub struct Normalizer<'a> {
    base: CurrencyCode,
    rates: &'a dyn RateProvider,
}

impl<'a> Normalizer<'a> {
    pub fn new(base: CurrencyCode, rates: &'a dyn RateProvider) -> Normalizer<'a> {
        Normalizer { base, rates }
    }

    /// Rate converting `currency` into the base currency.
    pub fn rate_to_base(&self, currency: CurrencyCode) -> Result<Decimal> {
        self.rates.rate(currency, self.base)
    }

    pub fn normalize(
        &self,
        input: &MonetaryInput,
        options: NormalizeOptions,
    ) -> Result<NormalizedAmounts> {
        for (field, value) in &[
            ("amount", input.amount),
            ("currency_amount", input.currency_amount),
            ("exchange_rate", input.exchange_rate),
        ] {
            if let Some(value) = value {
                if *value <= Decimal::ZERO {
                    bail!(monetary_error(
                        &[*field],
                        &format!("{} must be greater than 0", field)
                    ));
                }
            }
        }

        let mut amount = input.amount;
        let currency = input.currency;
        let mut currency_amount = input.currency_amount;

        if let (Some(given_amount), Some(given_currency_amount)) = (amount, currency_amount) {
            if input.exchange_rate.is_some() {
                bail!(monetary_error(
                    &["amount", "currency_amount", "exchange_rate"],
                    "provide amount, or currency_amount with exchange_rate, not both"
                ));
            }
            if given_amount != given_currency_amount {
                bail!(monetary_error(
                    &["amount", "currency_amount"],
                    "amount and currency_amount differ; provide one of them"
                ));
            }
            // The same value given twice is a single foreign amount.
            amount = None;
        }

        if let Some(given_currency_amount) = currency_amount {
            let currency = currency.ok_or_else(|| {
                monetary_error(&["currency"], "currency is required with currency_amount")
            })?;
            let rate = match input.exchange_rate {
                Some(rate) => rate,
                None => self.rate_to_base(currency)?,
            };
            debug!(
                "Converting {} {} to {} at {}",
                given_currency_amount, currency, self.base, rate
            );
            amount = Some(multiply(given_currency_amount, rate, &["currency_amount", "exchange_rate"])?);
        }

        if amount.is_none() {
            if currency.is_some() || input.exchange_rate.is_some() {
                bail!(monetary_error(
                    &["amount", "currency_amount"],
                    "amount or currency_amount is required when setting currency fields"
                ));
            }
            if !options.allow_empty {
                bail!(monetary_error(
                    &["amount", "currency_amount"],
                    "amount or currency_amount is required"
                ));
            }
        }

        if options.default_currency_amount && currency_amount.is_none() {
            currency_amount = amount;
        }

        Ok(NormalizedAmounts {
            amount,
            currency,
            currency_amount,
        })
    }

    /// Whole units for currencies where one reference unit buys more than
    /// the threshold, cents otherwise.  Rate lookup failures default to cents.
    pub fn decimal_places(&self, currency: CurrencyCode) -> DecimalPlaces {
        match self.rates.rate(CurrencyCode::reference(), currency) {
            Ok(rate) if rate > Decimal::from(HIGH_VALUE_RATE_THRESHOLD) => DecimalPlaces::Zero,
            Ok(_) => DecimalPlaces::Two,
            Err(err) => {
                debug!("No rounding rate for {}: {}", currency, err);
                DecimalPlaces::Two
            }
        }
    }

    pub fn rounding_policy(&self, currency: Option<CurrencyCode>) -> RoundingPolicy {
        let amount_places = self.decimal_places(self.base);
        let foreign_places = match currency {
            Some(currency) => self.decimal_places(currency),
            None => amount_places,
        };
        RoundingPolicy::new(amount_places, foreign_places)
    }

    pub fn round_draft(&self, mut draft: TransactionDraft) -> TransactionDraft {
        let policy = self.rounding_policy(draft.currency);
        draft.amount = policy.amount.quantize(draft.amount);
        draft.currency_amount = draft
            .currency_amount
            .map(|value| policy.foreign_amount.quantize(value));
        draft
    }

    pub fn round_changes(&self, mut changes: RecordChanges) -> RecordChanges {
        if changes.amount.is_none() && changes.currency_amount.is_none() {
            return changes;
        }
        let policy = self.rounding_policy(changes.currency);
        changes.amount = changes.amount.map(|value| policy.amount.quantize(value));
        changes.currency_amount = changes
            .currency_amount
            .map(|value| policy.foreign_amount.quantize(value));
        changes
    }

    /// Fills currency fields for a draft given only a base amount on an
    /// account held in another currency.
    pub fn infer_currency<F>(&self, draft: TransactionDraft, account_currency: F) -> Result<TransactionDraft>
    where
        F: Fn(&str) -> Result<CurrencyCode>,
    {
        if draft.currency.is_some() || draft.currency_amount.is_some() {
            return Ok(draft);
        }
        if let RecordDetails::Transfer {
            from_account,
            to_account,
        } = &draft.details
        {
            let from_currency = account_currency(from_account)?;
            let to_currency = account_currency(to_account)?;
            return self.infer_transfer_currency(draft, from_currency, to_currency);
        }
        let account = draft.details.account().to_string();
        let currency = account_currency(&account)?;
        if currency == self.base {
            return Ok(draft);
        }
        let rate = self.rate_to_base(currency)?;
        let user_amount = draft.amount;
        debug!("Inferred {} for account {} at rate {}", currency, account, rate);
        TransactionDraft {
            amount: multiply(user_amount, rate, &["amount"])?,
            ..draft
        }
        .with_foreign(Some(currency), Some(user_amount))
    }

    /// A transfer's currency fields describe the from-account side, and its
    /// amount the to-account side.
    fn infer_transfer_currency(
        &self,
        draft: TransactionDraft,
        from_currency: CurrencyCode,
        to_currency: CurrencyCode,
    ) -> Result<TransactionDraft> {
        if from_currency == to_currency {
            return Ok(draft);
        }
        let user_amount = draft.amount;
        let (amount, currency_amount) = if from_currency == self.base {
            (divide(user_amount, self.rate_to_base(to_currency)?)?, user_amount)
        } else if to_currency == self.base {
            (user_amount, divide(user_amount, self.rate_to_base(from_currency)?)?)
        } else {
            let from_rate = self.rate_to_base(from_currency)?;
            let to_rate = self.rate_to_base(to_currency)?;
            (multiply(user_amount, divide(from_rate, to_rate)?, &["amount"])?, user_amount)
        };
        TransactionDraft { amount, ..draft }.with_foreign(Some(from_currency), Some(currency_amount))
    }

    pub fn check_transfer_currency(
        &self,
        draft: &TransactionDraft,
        from_account_currency: CurrencyCode,
    ) -> Result<()> {
        if let (RecordDetails::Transfer { from_account, .. }, Some(currency)) =
            (&draft.details, draft.currency)
        {
            if currency != from_account_currency {
                bail!(validation_error(format!(
                    "Transfer currency must match from_account currency: {} uses {}, but transfer specifies {}",
                    from_account, from_account_currency, currency
                )));
            }
        }
        Ok(())
    }
}

fn multiply(value: Decimal, rate: Decimal, fields: &[&str]) -> Result<Decimal> {
    value
        .checked_mul(rate)
        .ok_or_else(|| monetary_error(fields, &format!("{} x {} is out of range", value, rate)))
}

fn divide(value: Decimal, rate: Decimal) -> Result<Decimal> {
    value
        .checked_div(rate)
        .ok_or_else(|| monetary_error(&["amount"], &format!("{} / {} is out of range", value, rate)))
}
