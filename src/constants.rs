pub const DEFAULT_DATABASE_FILENAME: &str = "homebudget.db";
pub const DEFAULT_CONFIG_FILENAME: &str = "hb-config.json";
pub const DEFAULT_FOREX_CACHE_FILENAME: &str = "forex-rates.json";

pub const SYNC_UPDATE_TYPE: &str = "Any";
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 9;
pub const DEFAULT_PAYLOAD_MIN_SIZE: usize = 512;

pub const REFERENCE_CURRENCY: &str = "USD";
// Currencies strictly above this many units per USD round to whole units.
pub const HIGH_VALUE_RATE_THRESHOLD: i64 = 100;
pub const EXCHANGE_RATE_API_URL: &str = "https://api.exchangerate-api.com/v4/latest";
pub const DEFAULT_FOREX_CACHE_TTL_HOURS: u64 = 1;
pub const DEFAULT_FOREX_TIMEOUT_SECONDS: u64 = 5;

pub const FLAG_YES: &str = "Y";
pub const FLAG_NO: &str = "N";
pub const DEFAULT_PERIODS: i32 = 1;
pub const DEFAULT_MASTER_KEY: i32 = -1;
pub const DEFAULT_PAYEE_KEY: i32 = 0;
pub const DEFAULT_BILL_KEY: i32 = 0;
pub const DEFAULT_RECURRING_KEY: i32 = 0;

pub const TRANS_TYPE_EXPENSE: i32 = 1;
pub const TRANS_TYPE_INCOME: i32 = 2;
pub const TRANS_TYPE_TRANSFER_OUT: i32 = 3;
pub const TRANS_TYPE_TRANSFER_IN: i32 = 4;

pub const DATABASE_FILE_ARG: &str = "database-file";
pub const DATABASE_FILE_ENV: &str = "HB_DATABASE_FILE";
pub const CONFIG_FILE_ARG: &str = "config-file";
pub const CONFIG_FILE_ENV: &str = "HB_CONFIG_FILE";
pub const SYNC_CONFIG_ARG: &str = "sync-config";
pub const SYNC_CONFIG_ENV: &str = "HB_SYNC_CONFIG";
pub const NO_SYNC_ARG: &str = "no-sync";
pub const NO_FOREX_ARG: &str = "no-forex";
pub const UI_CONTROL_ARG: &str = "ui-control";

pub const KEY_ARG: &str = "key";
pub const DATE_ARG: &str = "date";
pub const AMOUNT_ARG: &str = "amount";
pub const CURRENCY_ARG: &str = "currency";
pub const CURRENCY_AMOUNT_ARG: &str = "currency-amount";
pub const EXCHANGE_RATE_ARG: &str = "exchange-rate";
pub const NOTES_ARG: &str = "notes";
pub const ACCOUNT_ARG: &str = "account";
pub const CATEGORY_ARG: &str = "category";
pub const SUBCATEGORY_ARG: &str = "subcategory";
pub const ERROR_REPORT_ARG: &str = "error-report";
pub const NAME_ARG: &str = "name";
pub const FROM_ACCOUNT_ARG: &str = "from-account";
pub const TO_ACCOUNT_ARG: &str = "to-account";
pub const START_DATE_ARG: &str = "start-date";
pub const END_DATE_ARG: &str = "end-date";
pub const FILE_ARG: &str = "file";
pub const STOP_ON_ERROR_ARG: &str = "stop-on-error";
pub const PAYLOAD_ARG: &str = "payload";
pub const LIMIT_ARG: &str = "limit";
