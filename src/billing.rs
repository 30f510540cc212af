use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::config::{Config, Context};
use crate::error::{BillingError, ProcessError};
use crate::templates::tex_escape;

/// Row layout of the time tracking export.
#[derive(Deserialize, Debug)]
struct Row {
    #[serde(rename = "Account Key")]
    account_key: String,
    #[serde(rename = "Account Name")]
    account_name: String,
    #[serde(rename = "Issue Key")]
    issue_key: String,
    #[serde(rename = "Issue summary")]
    issue_summary: String,
    #[serde(rename = "Billed Hours")]
    billed_hours: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BillingEntry {
    pub account_key: String,
    pub account_name: String,
    pub issue_key: String,
    pub issue_summary: String,
    pub billed_hours: f64,
}

impl BillingEntry {
    fn from_row(row: Row, line: u64) -> Result<Self, BillingError> {
        let billed_hours = row.billed_hours.trim().parse().map_err(|_| {
            BillingError::InvalidHours {
                row: line,
                value: row.billed_hours.clone(),
            }
        })?;
        Ok(Self {
            account_key: row.account_key,
            account_name: row.account_name,
            issue_key: row.issue_key,
            issue_summary: row.issue_summary,
            billed_hours,
        })
    }
}

#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct Issue {
    pub key: String,
    /// Escaped for LaTeX
    pub summary: String,
    pub hours: f64,
    pub amount: f64,
}

#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct Account {
    pub key: String,
    pub name: String,
    pub total: f64,
    pub issues: Vec<Issue>,
}

#[derive(Display, EnumString, Debug, PartialEq, Clone, Copy)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DataFormat {
    Csv,
    Xls,
    Xlsx,
    Ods,
}

impl DataFormat {
    /// Format by file extension, anything unrecognised is read as CSV.
    pub fn of(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(DataFormat::Csv)
    }
}

/// Parse billing entries. Every row must be complete, the first bad row
/// fails the whole read.
pub fn read_entries<R: io::Read>(
    reader: R,
) -> Result<Vec<BillingEntry>, BillingError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut entries = Vec::new();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |pos| pos.line());
        let row: Row = record.deserialize(Some(&headers))?;
        entries.push(BillingEntry::from_row(row, line)?);
    }
    Ok(entries)
}

pub fn read_data(
    path: &Path,
    converter: &str,
) -> Result<Vec<BillingEntry>, BillingError> {
    let csv_path = match DataFormat::of(path) {
        DataFormat::Csv => path.to_path_buf(),
        format => convert(path, format, converter)?,
    };
    let file = File::open(&csv_path)?;
    read_entries(BufReader::new(file))
}

fn convert(
    path: &Path,
    format: DataFormat,
    converter: &str,
) -> Result<PathBuf, BillingError> {
    let csv_path = path.with_extension("csv");
    info!(
        "Converting {} sheet {} to {}",
        format,
        path.display(),
        csv_path.display()
    );
    let status = Command::new(converter)
        .arg(path)
        .arg(&csv_path)
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(BillingError::Conversion {
            program: converter.to_string(),
            status,
        });
    }
    Ok(csv_path)
}

struct AccountTally {
    name: String,
    total: f64,
    issues: BTreeMap<String, Issue>,
}

/// Roll entries up into accounts and issues, returning accounts ordered by
/// name with their issues ordered by key, and the grand total.
///
/// Amounts are accumulated per entry, not multiplied out from the summed
/// hours, and nothing is rounded.
pub fn aggregate(
    entries: &[BillingEntry],
    hourly_rate: f64,
) -> (Vec<Account>, f64) {
    let mut tallies: BTreeMap<&str, AccountTally> = BTreeMap::new();
    let mut total = 0.0;

    for entry in entries {
        let account = tallies
            .entry(entry.account_key.as_str())
            .or_insert_with(|| AccountTally {
                name: entry.account_name.clone(),
                total: 0.0,
                issues: BTreeMap::new(),
            });
        let issue = account
            .issues
            .entry(entry.issue_key.clone())
            .or_insert_with(|| Issue {
                key: entry.issue_key.clone(),
                summary: tex_escape(&entry.issue_summary),
                hours: 0.0,
                amount: 0.0,
            });

        let amount = entry.billed_hours * hourly_rate;
        issue.hours += entry.billed_hours;
        issue.amount += amount;
        account.total += amount;
        total += amount;
    }

    let mut accounts: Vec<Account> = tallies
        .into_iter()
        .map(|(key, tally)| Account {
            key: key.to_string(),
            name: tally.name,
            total: tally.total,
            issues: tally.issues.into_values().collect(),
        })
        .collect();
    // stable, so equal names stay in key order
    accounts.sort_by(|a, b| a.name.cmp(&b.name));

    (accounts, total)
}

fn data_file(config: &Config, context: &Context) -> Result<PathBuf, BillingError> {
    match context.get("data_file") {
        Some(serde_yaml::Value::String(path)) => Ok(PathBuf::from(path)),
        Some(other) => Err(invalid_setting("data_file", other)),
        None => config
            .data_file
            .clone()
            .ok_or(BillingError::MissingSetting { name: "data_file" }),
    }
}

fn hourly_rate(config: &Config, context: &Context) -> Result<f64, BillingError> {
    match context.get("hourly_rate") {
        Some(serde_yaml::Value::Number(rate)) => {
            rate.as_f64().ok_or_else(|| BillingError::InvalidSetting {
                name: "hourly_rate",
                value: rate.to_string(),
            })
        }
        Some(serde_yaml::Value::String(rate)) => rate
            .trim()
            .parse()
            .map_err(|_| BillingError::InvalidSetting {
                name: "hourly_rate",
                value: rate.clone(),
            }),
        Some(other) => Err(invalid_setting("hourly_rate", other)),
        None => config
            .hourly_rate
            .ok_or(BillingError::MissingSetting { name: "hourly_rate" }),
    }
}

fn invalid_setting(name: &'static str, value: &serde_yaml::Value) -> BillingError {
    BillingError::InvalidSetting {
        name,
        value: serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Adds `accounts` and `total` to the context, aggregated from the data file
/// at the hourly rate.
pub fn context_processor(
    config: &Config,
    context: &mut Context,
) -> Result<(), ProcessError> {
    let path = data_file(config, context)?;
    let rate = hourly_rate(config, context)?;
    let entries = read_data(&path, &config.converter)?;
    debug!("Read {} billing entries from {}", entries.len(), path.display());

    let (accounts, total) = aggregate(&entries, rate);
    info!(
        "Billed {} account(s) at {} per hour, total {:.2}",
        accounts.len(),
        rate,
        total
    );

    context.insert("accounts".to_string(), serde_yaml::to_value(&accounts)?);
    context.insert("total".to_string(), total.into());
    Ok(())
}
