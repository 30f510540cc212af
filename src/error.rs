use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Error decoding config {}: {source}", path.display())]
    Format {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No context processor registered as '{name}'")]
    UnknownProcessor { name: String },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO Error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("Error decoding ledger: {source}")]
    Format {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Malformed invoice number in ledger: '{number}'")]
    MalformedNumber { number: String },

    #[error("No invoice numbers left for {year}")]
    SequenceExhausted { year: i32 },
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("IO Error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("Error reading billing data: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("Row {row}: billed hours '{value}' is not a number")]
    InvalidHours { row: u64, value: String },

    #[error("No '{name}' set in the context or config")]
    MissingSetting { name: &'static str },

    #[error("Unusable value for '{name}': {value}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("Converting the data file with {program} failed ({status})")]
    Conversion { program: String, status: ExitStatus },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{source}")]
    Billing {
        #[from]
        source: BillingError,
    },

    #[error("Error building context: {source}")]
    Value {
        #[from]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
#[error("Cannot make sense of the date '{input}'")]
pub struct DateError {
    pub input: String,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("IO Error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{program} failed -- please resolve the errors above.")]
    Failed { program: String, status: ExitStatus },

    #[error("{program} did not produce {}", path.display())]
    MissingOutput { program: String, path: PathBuf },
}
