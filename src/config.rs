use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Variables handed to the template at render time.
pub type Context = BTreeMap<String, serde_yaml::Value>;

/// Settings for one invocation, read from the YAML config file.
///
/// Every key is optional; anything missing falls back to `Config::default()`.
#[derive(Deserialize, Debug, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Template variables shared by every invoice
    pub context: Context,
    pub template_dir: PathBuf,
    pub invoice_dir: PathBuf,
    /// The ledger of issued invoices
    pub invoices_file: PathBuf,
    pub template_name: String,
    /// Registered name of the processor run on the context before rendering
    pub context_processor: Option<String>,
    pub hourly_rate: Option<f64>,
    pub data_file: Option<PathBuf>,
    /// Program turning spreadsheets into CSV
    pub converter: String,
    pub syntax: Syntax,
    pub compiler: Compiler,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: Context::new(),
            template_dir: PathBuf::from("."),
            invoice_dir: PathBuf::from("."),
            invoices_file: PathBuf::from("invoices.yaml"),
            template_name: "invoice.tex".to_string(),
            context_processor: None,
            hourly_rate: None,
            data_file: None,
            converter: "ssconvert".to_string(),
            syntax: Syntax::default(),
            compiler: Compiler::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document is a config with nothing overridden
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Template delimiters. The defaults stay clear of the braces and percent
/// signs LaTeX uses itself.
#[derive(Deserialize, Debug, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Syntax {
    pub block_start: String,
    pub block_end: String,
    pub variable_start: String,
    pub variable_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            block_start: "<%".to_string(),
            block_end: "%>".to_string(),
            variable_start: "<<".to_string(),
            variable_end: ">>".to_string(),
            comment_start: "<#".to_string(),
            comment_end: "#>".to_string(),
        }
    }
}

/// The external typesetting tool.
#[derive(Deserialize, Debug, PartialEq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Compiler {
    pub program: String,
    pub args: Vec<String>,
    /// Flag naming the output directory, followed by the scratch directory.
    /// `None` leaves it to the working directory.
    pub output_directory_flag: Option<String>,
    pub source_extension: String,
    pub output_extension: String,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            program: "pdflatex".to_string(),
            args: vec!["-halt-on-error".to_string()],
            output_directory_flag: Some("-output-directory".to_string()),
            source_extension: "tex".to_string(),
            output_extension: "pdf".to_string(),
        }
    }
}
