use log::{info, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::*;
use crate::client::*;
use crate::codec::*;
use crate::constants::*;
use crate::database::*;
use crate::errors::*;
use crate::exchange_rates::*;
use crate::forex_client::*;
use crate::ledger::*;
use crate::models::*;
use crate::normalizer::MonetaryInput;
use crate::settings::*;
use crate::sync_config::*;
use crate::types::*;
use crate::ui_control::*;
use crate::utilities::*;

/// Per-user locations that depend on the platform.
struct UserPaths {
    default_database_file: PathBuf,
    forex_cache_file: PathBuf,
}

pub fn run() -> Result<()> {
    let paths = initialize()?;
    run_clap_matches(&get_clap_matches(), &paths)
}

fn initialize() -> Result<UserPaths> {
    openssl_probe::init_ssl_cert_env_vars();
    dotenv::dotenv().ok();
    env_logger::init();

    let proj_dirs = directories::ProjectDirs::from("io", "homebudget", clap::crate_name!())
        .chain_err(|| "Failed to determine user data directory")?;
    let mut default_config_file = proj_dirs.config_dir().to_path_buf();
    default_config_file.push(DEFAULT_CONFIG_FILENAME);
    default_env(CONFIG_FILE_ENV, default_config_file);

    Ok(UserPaths {
        default_database_file: proj_dirs.data_dir().join(DEFAULT_DATABASE_FILENAME),
        forex_cache_file: proj_dirs.cache_dir().join(DEFAULT_FOREX_CACHE_FILENAME),
    })
}

fn get_clap_matches() -> clap::ArgMatches<'static> {
    clap::App::new(clap::crate_name!())
        .version(option_env!("CI_BUILD_VERSION").unwrap_or(clap::crate_version!()))
        .author(clap::crate_authors!())
        .about(clap::crate_description!())
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::with_name(DATABASE_FILE_ARG)
                .env(DATABASE_FILE_ENV)
                .long(DATABASE_FILE_ARG)
                .value_name("PATH")
                .help("HomeBudget database file (defaults to db_path from the config file)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name(CONFIG_FILE_ARG)
                .env(CONFIG_FILE_ENV)
                .long(CONFIG_FILE_ARG)
                .value_name("PATH")
                .help("Configuration file (hb-config.json)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name(SYNC_CONFIG_ARG)
                .env(SYNC_CONFIG_ENV)
                .long(SYNC_CONFIG_ARG)
                .value_name("PATH")
                .help("Sync payload field configuration (defaults to the built-in one)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name(NO_SYNC_ARG)
                .long(NO_SYNC_ARG)
                .help("Do not write SyncUpdate rows for changes"),
        )
        .arg(
            clap::Arg::with_name(NO_FOREX_ARG)
                .long(NO_FOREX_ARG)
                .help("Do not look up exchange rates (every rate is 1.0)"),
        )
        .arg(
            clap::Arg::with_name(UI_CONTROL_ARG)
                .long(UI_CONTROL_ARG)
                .help("Close the HomeBudget app during changes, using the commands in the config file"),
        )
        .subcommand(resource_subcommand(Resource::Expense))
        .subcommand(resource_subcommand(Resource::Income))
        .subcommand(resource_subcommand(Resource::Transfer))
        .subcommand(
            clap::SubCommand::with_name("batch")
                .about("Run mixed add/update/delete operations in one transaction")
                .setting(clap::AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    clap::SubCommand::with_name("run")
                        .about("Run the operations in a JSON batch file")
                        .arg(
                            clap::Arg::with_name(FILE_ARG)
                                .long(FILE_ARG)
                                .value_name("PATH")
                                .help("JSON array of {resource, operation, parameters} objects")
                                .takes_value(true)
                                .required(true),
                        )
                        .arg(
                            clap::Arg::with_name(STOP_ON_ERROR_ARG)
                                .long(STOP_ON_ERROR_ARG)
                                .help("Abort and roll back everything on the first failure"),
                        )
                        .arg(
                            clap::Arg::with_name(ERROR_REPORT_ARG)
                                .long(ERROR_REPORT_ARG)
                                .value_name("PATH")
                                .help("Write failure details to this file")
                                .takes_value(true),
                        ),
                ),
        )
        .subcommand(
            clap::SubCommand::with_name("sync")
                .about("Inspect sync payloads")
                .setting(clap::AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    clap::SubCommand::with_name("decode")
                        .about("Decode a SyncUpdate payload and print its fields")
                        .arg(
                            clap::Arg::with_name(PAYLOAD_ARG)
                                .value_name("PAYLOAD")
                                .required(true)
                                .index(1),
                        ),
                )
                .subcommand(
                    clap::SubCommand::with_name("inspect")
                        .about("List the most recent SyncUpdate rows")
                        .arg(
                            clap::Arg::with_name(LIMIT_ARG)
                                .long(LIMIT_ARG)
                                .value_name("COUNT")
                                .takes_value(true)
                                .default_value("10")
                                .validator(|value| {
                                    value
                                        .parse::<i64>()
                                        .map(|_| ())
                                        .map_err(|err| err.to_string())
                                }),
                        ),
                ),
        )
        .get_matches()
}

fn resource_subcommand(resource: Resource) -> clap::App<'static, 'static> {
    let (about, add_about) = match resource {
        Resource::Expense => ("Manage expenses", "Add an expense"),
        Resource::Income => ("Manage income", "Add an income"),
        Resource::Transfer => ("Manage transfers", "Add a transfer"),
    };
    let detail_args = match resource {
        Resource::Expense => vec![
            required_text_arg(ACCOUNT_ARG, "Account paid from"),
            required_text_arg(CATEGORY_ARG, "Category name"),
            required_text_arg(SUBCATEGORY_ARG, "Subcategory name"),
        ],
        Resource::Income => vec![
            required_text_arg(ACCOUNT_ARG, "Account paid into"),
            required_text_arg(NAME_ARG, "Income name"),
        ],
        Resource::Transfer => vec![
            required_text_arg(FROM_ACCOUNT_ARG, "Account to transfer from"),
            required_text_arg(TO_ACCOUNT_ARG, "Account to transfer to"),
        ],
    };
    clap::SubCommand::with_name(resource.name())
        .about(about)
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            clap::SubCommand::with_name("add")
                .about(add_about)
                .arg(date_arg(DATE_ARG, "Transaction date").required(true))
                .args(&detail_args)
                .args(&monetary_args())
                .arg(text_arg(NOTES_ARG, "Notes")),
        )
        .subcommand(
            clap::SubCommand::with_name("update")
                .about("Update amounts or notes of a stored record")
                .arg(key_arg())
                .args(&monetary_args())
                .arg(text_arg(NOTES_ARG, "Notes")),
        )
        .subcommand(
            clap::SubCommand::with_name("delete")
                .about("Delete a stored record")
                .arg(key_arg()),
        )
        .subcommand(
            clap::SubCommand::with_name("get")
                .about("Show a stored record")
                .arg(key_arg()),
        )
        .subcommand(
            clap::SubCommand::with_name("list")
                .about("List stored records")
                .arg(date_arg(START_DATE_ARG, "Earliest date to include"))
                .arg(date_arg(END_DATE_ARG, "Latest date to include")),
        )
}

fn text_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(name)
        .long(name)
        .value_name("TEXT")
        .help(help)
        .takes_value(true)
}

fn required_text_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    text_arg(name, help).required(true)
}

fn date_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(name)
        .long(name)
        .value_name("YYYY-MM-DD")
        .help(help)
        .takes_value(true)
        .validator(|value| {
            parse_iso_date(&value)
                .map(|_| ())
                .map_err(|err| err.to_string())
        })
}

fn decimal_arg(name: &'static str, help: &'static str) -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(name)
        .long(name)
        .value_name("DECIMAL")
        .help(help)
        .takes_value(true)
        .validator(|value| {
            parse_decimal(&value, "number")
                .map(|_| ())
                .map_err(|err| err.to_string())
        })
}

fn key_arg() -> clap::Arg<'static, 'static> {
    clap::Arg::with_name(KEY_ARG)
        .long(KEY_ARG)
        .value_name("KEY")
        .help("Record key")
        .takes_value(true)
        .required(true)
        .validator(|value| {
            value
                .parse::<i32>()
                .map(|_| ())
                .map_err(|err| err.to_string())
        })
}

fn monetary_args() -> Vec<clap::Arg<'static, 'static>> {
    vec![
        decimal_arg(AMOUNT_ARG, "Amount in the base currency"),
        clap::Arg::with_name(CURRENCY_ARG)
            .long(CURRENCY_ARG)
            .value_name("CODE")
            .help("Foreign currency code, e.g. USD")
            .takes_value(true),
        decimal_arg(CURRENCY_AMOUNT_ARG, "Amount in the foreign currency"),
        decimal_arg(
            EXCHANGE_RATE_ARG,
            "Base currency units per foreign unit (looked up when omitted)",
        ),
    ]
}

fn run_clap_matches(matches: &clap::ArgMatches, paths: &UserPaths) -> Result<()> {
    let config_file = matches
        .value_of(CONFIG_FILE_ARG)
        .chain_err(|| "CLAP matches should have CONFIG_FILE_ARG")?;
    let settings = Settings::load(Path::new(config_file))?;
    match matches.subcommand() {
        ("sync", Some(sync_matches)) => run_sync_command(matches, sync_matches, &settings, paths),
        ("batch", Some(batch_matches)) => {
            run_batch_command(matches, batch_matches, &settings, paths)
        }
        (name, Some(resource_matches)) => run_resource_command(
            matches,
            Resource::from_str(name)?,
            resource_matches,
            &settings,
            paths,
        ),
        _ => bail!(validation_error("No command given")),
    }
}

fn run_resource_command(
    matches: &clap::ArgMatches,
    resource: Resource,
    resource_matches: &clap::ArgMatches,
    settings: &Settings,
    paths: &UserPaths,
) -> Result<()> {
    let client = build_client(matches, settings, paths)?;
    let ui_control = load_ui_control(matches, settings)?;
    let ui_control = ui_control.as_ref().map(|control| control as &dyn UiControl);
    match resource_matches.subcommand() {
        ("add", Some(args)) => {
            let request = add_request(resource, args)?;
            let record = around(ui_control, || client.add(&request))?;
            info!("Added {} {}", resource, record.key);
            print_json(&record_json(&record))
        }
        ("update", Some(args)) => {
            let key = key_value(args)?;
            let request = UpdateRequest {
                money: monetary_input(args)?,
                notes: args.value_of(NOTES_ARG).map(str::to_string),
            };
            let record = around(ui_control, || client.update(resource, key, &request))?;
            info!("Updated {} {}", resource, record.key);
            print_json(&record_json(&record))
        }
        ("delete", Some(args)) => {
            let key = key_value(args)?;
            let record = around(ui_control, || client.delete(resource, key))?;
            info!("Deleted {} {}", resource, record.key);
            print_json(&record_json(&record))
        }
        ("get", Some(args)) => print_json(&record_json(&client.get(resource, key_value(args)?)?)),
        ("list", Some(args)) => {
            let start_date = args.value_of(START_DATE_ARG).map(parse_iso_date).transpose()?;
            let end_date = args.value_of(END_DATE_ARG).map(parse_iso_date).transpose()?;
            let records = client.list(resource, start_date, end_date)?;
            print_json(&Value::Array(records.iter().map(record_json).collect()))
        }
        _ => bail!(validation_error(format!("No {} command given", resource))),
    }
}

fn run_batch_command(
    matches: &clap::ArgMatches,
    batch_matches: &clap::ArgMatches,
    settings: &Settings,
    paths: &UserPaths,
) -> Result<()> {
    let args = match batch_matches.subcommand() {
        ("run", Some(args)) => args,
        _ => bail!(validation_error("No batch command given")),
    };
    let file = args
        .value_of(FILE_ARG)
        .chain_err(|| "CLAP matches should have FILE_ARG")?;
    let stop_on_error = args.is_present(STOP_ON_ERROR_ARG);
    let loaded = load_batch_file(Path::new(file), stop_on_error)?;
    let mut report: Vec<String> = loaded.errors.clone();
    if loaded.operations.is_empty() {
        write_error_report(args, &report)?;
        bail!(validation_error("No valid operations found in batch file"));
    }

    let client = build_client(matches, settings, paths)?;
    let ui_control = load_ui_control(matches, settings)?;
    let ui_control = ui_control.as_ref().map(|control| control as &dyn UiControl);
    let result = around(ui_control, || client.batch(&loaded.operations, !stop_on_error))?;

    let mut failed = Vec::new();
    for (operation, err) in &result.failed {
        report.push(format!(
            "Failed operation: {} {} - {}",
            operation.resource, operation.operation, err
        ));
        let operation = serde_json::to_value(operation)?;
        failed.push(json!({"operation": operation, "error": err.to_string()}));
    }
    info!("Batch outcome: {:?}", result.outcome());
    print_json(&json!({
        "successful": result.successful.iter().map(record_json).collect::<Vec<_>>(),
        "failed": failed,
    }))?;
    write_error_report(args, &report)
}

fn write_error_report(args: &clap::ArgMatches, report: &[String]) -> Result<()> {
    if let Some(path) = args.value_of(ERROR_REPORT_ARG) {
        if !report.is_empty() {
            fs::write(path, report.join("\n"))
                .chain_err(|| format!("Failed to write error report: {}", path))?;
            warn!("Error details written to {}", path);
        }
    }
    Ok(())
}

fn run_sync_command(
    matches: &clap::ArgMatches,
    sync_matches: &clap::ArgMatches,
    settings: &Settings,
    paths: &UserPaths,
) -> Result<()> {
    match sync_matches.subcommand() {
        ("decode", Some(args)) => {
            let encoded = args
                .value_of(PAYLOAD_ARG)
                .chain_err(|| "CLAP matches should have PAYLOAD_ARG")?;
            print_json(&Value::Object(decode_payload(encoded)?))
        }
        ("inspect", Some(args)) => {
            let limit = clap::value_t!(args.value_of(LIMIT_ARG), i64)
                .chain_err(|| "CLAP matches should have valid LIMIT_ARG")?;
            let database = open_database(matches, settings, paths)?;
            let rows = database
                .recent_sync_updates(limit)?
                .into_iter()
                .map(|row| {
                    let operation = match decode_payload(&row.payload) {
                        Ok(payload) => payload.get("Operation").cloned().unwrap_or(Value::Null),
                        Err(err) => Value::from(format!("<undecodable: {}>", err)),
                    };
                    json!({
                        "key": row.key,
                        "update_type": row.update_type,
                        "uuid": row.uuid,
                        "payload_length": row.payload.len(),
                        "operation": operation,
                    })
                })
                .collect();
            print_json(&Value::Array(rows))
        }
        _ => bail!(validation_error("No sync command given")),
    }
}

fn open_database(
    matches: &clap::ArgMatches,
    settings: &Settings,
    paths: &UserPaths,
) -> Result<Database> {
    let database_file = match matches.value_of(DATABASE_FILE_ARG) {
        Some(path) => PathBuf::from(path),
        None => settings
            .db_path
            .clone()
            .unwrap_or_else(|| paths.default_database_file.clone()),
    };
    let database_file = database_file
        .to_str()
        .chain_err(|| format!("Database path is not valid UTF-8: {}", database_file.display()))?;
    Database::establish_connection(database_file)
}

fn build_client(
    matches: &clap::ArgMatches,
    settings: &Settings,
    paths: &UserPaths,
) -> Result<HomeBudgetClient<Database>> {
    let database = open_database(matches, settings, paths)?;
    let rates: Box<dyn RateProvider> = if matches.is_present(NO_FOREX_ARG) {
        Box::new(UnitRates)
    } else {
        Box::new(ForexRates::new(
            ForexClient::new(EXCHANGE_RATE_API_URL, settings.forex.timeout()),
            paths.forex_cache_file.clone(),
            settings.forex.cache_ttl_hours,
        ))
    };
    let mut client = HomeBudgetClient::new(database, rates);
    if !matches.is_present(NO_SYNC_ARG) {
        let sync_config = match matches
            .value_of(SYNC_CONFIG_ARG)
            .map(PathBuf::from)
            .or_else(|| settings.sync_config.clone())
        {
            Some(path) => SyncConfig::from_file(&path)?,
            None => SyncConfig::embedded()?,
        };
        client = client.with_sync(sync_config);
    }
    if let Some(currency) = settings.base_currency()? {
        client = client.with_base_currency(currency);
    }
    Ok(client)
}

fn load_ui_control(matches: &clap::ArgMatches, settings: &Settings) -> Result<Option<CommandUiControl>> {
    if !matches.is_present(UI_CONTROL_ARG) {
        return Ok(None);
    }
    match (&settings.ui.close_command, &settings.ui.open_command) {
        (Some(close_command), Some(open_command)) => {
            Ok(Some(CommandUiControl::new(close_command, open_command)))
        }
        _ => bail!(validation_error(
            "--ui-control needs ui.close_command and ui.open_command in the config file"
        )),
    }
}

fn add_request(resource: Resource, args: &clap::ArgMatches) -> Result<AddRequest> {
    let text = |name: &str| -> Result<String> {
        args.value_of(name)
            .map(str::to_string)
            .chain_err(|| format!("Missing --{}", name))
    };
    let details = match resource {
        Resource::Expense => RecordDetails::Expense {
            account: text(ACCOUNT_ARG)?,
            category: text(CATEGORY_ARG)?,
            subcategory: text(SUBCATEGORY_ARG)?,
        },
        Resource::Income => RecordDetails::Income {
            account: text(ACCOUNT_ARG)?,
            name: text(NAME_ARG)?,
        },
        Resource::Transfer => RecordDetails::Transfer {
            from_account: text(FROM_ACCOUNT_ARG)?,
            to_account: text(TO_ACCOUNT_ARG)?,
        },
    };
    Ok(AddRequest {
        date: parse_iso_date(&text(DATE_ARG)?)?,
        money: monetary_input(args)?,
        notes: args.value_of(NOTES_ARG).map(str::to_string),
        details,
    })
}

fn monetary_input(args: &clap::ArgMatches) -> Result<MonetaryInput> {
    let decimal = |name: &str| -> Result<Option<Decimal>> {
        args.value_of(name)
            .map(|value| parse_decimal(value, name))
            .transpose()
    };
    Ok(MonetaryInput {
        amount: decimal(AMOUNT_ARG)?,
        currency: args.value_of(CURRENCY_ARG).map(CurrencyCode::from_str).transpose()?,
        currency_amount: decimal(CURRENCY_AMOUNT_ARG)?,
        exchange_rate: decimal(EXCHANGE_RATE_ARG)?,
    })
}

fn key_value(args: &clap::ArgMatches) -> Result<i32> {
    clap::value_t!(args.value_of(KEY_ARG), i32).chain_err(|| "CLAP matches should have valid KEY_ARG")
}

fn record_json(record: &TransactionRecord) -> Value {
    let mut value = json!({
        "key": record.key,
        "resource": record.resource().name(),
        "date": format_iso_date(record.date),
        "amount": record.amount.to_string(),
        "currency": record.currency().map(|currency| currency.to_string()),
        "currency_amount": record.currency_amount().map(|amount| amount.to_string()),
        "notes": record.notes,
        "time_stamp": record.time_stamp,
    });
    let details = match &record.details {
        RecordDetails::Expense {
            account,
            category,
            subcategory,
        } => json!({"account": account, "category": category, "subcategory": subcategory}),
        RecordDetails::Income { account, name } => json!({"account": account, "name": name}),
        RecordDetails::Transfer {
            from_account,
            to_account,
        } => json!({"from_account": from_account, "to_account": to_account}),
    };
    if let (Value::Object(fields), Value::Object(extra)) = (&mut value, details) {
        fields.extend(extra);
    }
    value
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn default_env<V: AsRef<OsStr>>(var_name: &str, default_value: V) {
    if let Err(env::VarError::NotPresent) = env::var(var_name) {
        env::set_var(var_name, default_value);
    }
}
