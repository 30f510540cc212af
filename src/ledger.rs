use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use fs2::FileExt;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<year>\d+)-(?P<sequence>\d+)$")
        .expect("invoice number pattern is valid")
});

/// An invoice number: the year and the position of the invoice within it.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct InvoiceNumber {
    pub year: i32,
    pub sequence: u32,
}

impl InvoiceNumber {
    pub fn new(year: i32, sequence: u32) -> Self {
        Self { year, sequence }
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.year, self.sequence)
    }
}

impl FromStr for InvoiceNumber {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LedgerError::MalformedNumber {
            number: s.to_string(),
        };
        let caps = NUMBER_PATTERN.captures(s).ok_or_else(malformed)?;
        let year = caps["year"].parse().map_err(|_| malformed())?;
        let sequence = caps["sequence"].parse().map_err(|_| malformed())?;
        Ok(Self { year, sequence })
    }
}

/// One issued invoice as stored in the ledger. Fields other than the number
/// and date are whatever the invoice was created with and are written back
/// untouched.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct InvoiceRecord {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

impl InvoiceRecord {
    pub fn new(
        number: InvoiceNumber,
        date: String,
        mut fields: BTreeMap<String, serde_yaml::Value>,
    ) -> Self {
        // would otherwise serialize as duplicate keys
        fields.remove("number");
        fields.remove("date");
        Self {
            number: number.to_string(),
            date: Some(date),
            fields,
        }
    }
}

/// Next free number for `year`: one past the highest sequence recorded in
/// that year, starting at 1.
pub fn next_number(
    records: &[InvoiceRecord],
    year: i32,
) -> Result<InvoiceNumber, LedgerError> {
    let mut max_sequence = 0;
    for record in records {
        let number: InvoiceNumber = record.number.parse()?;
        if number.year == year {
            max_sequence = max_sequence.max(number.sequence);
        }
    }
    let sequence = max_sequence
        .checked_add(1)
        .ok_or(LedgerError::SequenceExhausted { year })?;
    Ok(InvoiceNumber::new(year, sequence))
}

/// The ledger file, loaded in full and held under an exclusive lock until
/// dropped.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    records: Vec<InvoiceRecord>,
    _lock: File,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let lock = acquire_lock(path)?;

        let records: Vec<InvoiceRecord> = if path.exists() {
            let raw = fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str(&raw)?
            }
        } else {
            info!("No ledger at {}, starting a new one", path.display());
            Vec::new()
        };
        debug!("Loaded {} invoice(s) from {}", records.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            records,
            _lock: lock,
        })
    }

    pub fn records(&self) -> &[InvoiceRecord] {
        &self.records
    }

    pub fn next_number(&self, year: i32) -> Result<InvoiceNumber, LedgerError> {
        next_number(&self.records, year)
    }

    pub fn append(&mut self, record: InvoiceRecord) {
        self.records.push(record);
    }

    /// Replace the ledger file with the current records.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let updated_path = self.path.with_extension("updated");
        let mut writer = BufWriter::new(File::create(&updated_path)?);

        serde_yaml::to_writer(&mut writer, &self.records)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(updated_path, &self.path)?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn acquire_lock(path: &Path) -> io::Result<File> {
    let lock_path = lock_path(path);
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;

    if let Err(error) = lock.try_lock_exclusive() {
        if error.kind() != fs2::lock_contended_error().kind() {
            return Err(error);
        }
        info!("Waiting for {} to be released", lock_path.display());
        lock.lock_exclusive()?;
    }
    Ok(lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use const_format::formatcp;

    fn record(number: &str) -> InvoiceRecord {
        InvoiceRecord {
            number: number.to_string(),
            date: None,
            fields: BTreeMap::new(),
        }
    }

    fn records(numbers: &[&str]) -> Vec<InvoiceRecord> {
        numbers.iter().map(|n| record(n)).collect()
    }

    #[test]
    fn first_number_of_the_year() -> Result<(), LedgerError> {
        assert_eq!(next_number(&[], 2024)?.to_string(), "2024-0001");
        Ok(())
    }

    #[test]
    fn follows_highest_number_in_year() -> Result<(), LedgerError> {
        let ledger = records(&["2024-0002", "2024-0007", "2024-0003"]);
        assert_eq!(next_number(&ledger, 2024)?.to_string(), "2024-0008");
        Ok(())
    }

    #[test]
    fn new_year_starts_over() -> Result<(), LedgerError> {
        let ledger = records(&["2023-0004"]);
        assert_eq!(next_number(&ledger, 2024)?.to_string(), "2024-0001");
        Ok(())
    }

    #[test]
    fn sequence_is_padded_not_truncated() -> Result<(), LedgerError> {
        let ledger = records(&["2024-9999"]);
        assert_eq!(next_number(&ledger, 2024)?.to_string(), "2024-10000");
        assert_eq!(InvoiceNumber::new(987, 5).to_string(), "0987-0005");
        Ok(())
    }

    #[test]
    fn malformed_number_fails() {
        let ledger = records(&["2024-0001", "abc"]);
        match next_number(&ledger, 2024) {
            Err(LedgerError::MalformedNumber { number }) => {
                assert_eq!(number, "abc")
            }
            other => panic!("expected a malformed number, got {:?}", other),
        }
    }

    #[test]
    fn malformed_number_in_other_year_fails() {
        let ledger = records(&["2023-01x"]);
        assert!(next_number(&ledger, 2024).is_err());
    }

    #[test]
    fn exhausted_sequence_fails() {
        let ledger = records(&[format!("2024-{}", u32::MAX).as_str()]);
        assert!(matches!(
            next_number(&ledger, 2024),
            Err(LedgerError::SequenceExhausted { year: 2024 })
        ));
    }

    #[test]
    fn missing_ledger_is_empty() -> Result<(), LedgerError> {
        let dir = tempfile::tempdir()?;
        let ledger = Ledger::open(&dir.path().join("invoices.yaml"))?;
        assert!(ledger.records().is_empty());
        assert_eq!(ledger.next_number(2024)?.to_string(), "2024-0001");
        Ok(())
    }

    const LEDGER_YAML: &str = formatcp!(
        "- number: 2023-0004\n  date: '2023-12-30'\n  client: Innotech\n  \
         amount: 1200\n\
         - number: {}\n",
        "2024-0001"
    );

    #[test]
    fn persist_keeps_existing_records_intact() -> Result<(), LedgerError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("invoices.yaml");
        fs::write(&path, LEDGER_YAML)?;

        let mut ledger = Ledger::open(&path)?;
        let number = ledger.next_number(2024)?;
        assert_eq!(number.to_string(), "2024-0002");

        let mut fields = BTreeMap::new();
        fields.insert("client".to_string(), "Acme".into());
        ledger.append(InvoiceRecord::new(
            number,
            "2024-02-01".to_string(),
            fields,
        ));
        ledger.persist()?;
        let before = ledger.records().to_vec();
        drop(ledger);

        let reloaded = Ledger::open(&path)?;
        assert_eq!(reloaded.records(), &before[..]);
        assert_eq!(reloaded.records()[0].date.as_deref(), Some("2023-12-30"));
        assert_eq!(
            reloaded.records()[0].fields.get("amount"),
            Some(&serde_yaml::Value::from(1200))
        );
        assert_eq!(reloaded.records()[1].date, None);
        assert!(!path.with_extension("updated").exists());
        Ok(())
    }

    #[test]
    fn numbering_is_gapless() -> Result<(), LedgerError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("invoices.yaml");

        for expected in 1..=12 {
            let mut ledger = Ledger::open(&path)?;
            let number = ledger.next_number(2025)?;
            assert_eq!(number, InvoiceNumber::new(2025, expected));
            ledger.append(InvoiceRecord::new(
                number,
                "2025-03-01".to_string(),
                BTreeMap::new(),
            ));
            ledger.persist()?;
        }

        let ledger = Ledger::open(&path)?;
        let numbers: Vec<&str> =
            ledger.records().iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers.first(), Some(&"2025-0001"));
        assert_eq!(numbers.last(), Some(&"2025-0012"));
        Ok(())
    }

    #[test]
    fn lock_file_sits_next_to_ledger() {
        assert_eq!(
            lock_path(Path::new("books/invoices.yaml")),
            PathBuf::from("books/invoices.yaml.lock")
        );
    }

    #[test]
    fn open_ledger_holds_the_lock() -> Result<(), LedgerError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("invoices.yaml");

        let ledger = Ledger::open(&path)?;
        let other = OpenOptions::new().write(true).open(lock_path(&path))?;
        let contended = other.try_lock_exclusive().unwrap_err();
        assert_eq!(contended.kind(), fs2::lock_contended_error().kind());

        drop(ledger);
        other.try_lock_exclusive()?;
        Ok(())
    }

    #[test]
    fn record_fields_cannot_shadow_number_or_date() -> Result<(), LedgerError> {
        let mut fields = BTreeMap::new();
        fields.insert("number".to_string(), "PO-77".into());
        fields.insert("date".to_string(), "someday".into());
        fields.insert("client".to_string(), "Acme".into());
        let record = InvoiceRecord::new(
            InvoiceNumber::new(2024, 1),
            "2024-03-01".to_string(),
            fields,
        );

        let yaml = serde_yaml::to_string(&record)?;
        let reloaded: InvoiceRecord = serde_yaml::from_str(&yaml)?;
        assert_eq!(reloaded.number, "2024-0001");
        assert_eq!(reloaded.date.as_deref(), Some("2024-03-01"));
        assert_eq!(
            reloaded.fields.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["client"]
        );
        Ok(())
    }
}
