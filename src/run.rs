use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};
use log::{debug, info, warn};
use thiserror::Error;

use crate::cli::Command;
use crate::compile::{self, CompiledDocument};
use crate::config::{Config, Context};
use crate::dates;
use crate::error::{
    CompileError, ConfigError, DateError, LedgerError, ProcessError,
};
use crate::input;
use crate::ledger::{InvoiceNumber, InvoiceRecord, Ledger};
use crate::processors::Registry;
use crate::templates;

pub fn run_cmd_with_path(
    cmd: Command,
    config_path: &Path,
) -> Result<(), RunError> {
    let config = Config::load(config_path)?;
    let today = Local::now().date_naive();

    match cmd {
        Command::New { confirm, params } => {
            if let Some(path) =
                new_invoice(&config, &Registry::builtin(), params, today, confirm)?
            {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

/// Record and compile the next invoice. Returns where the document was
/// written, or `None` when the invoice was not confirmed.
pub fn new_invoice(
    config: &Config,
    registry: &Registry,
    params: Vec<(String, String)>,
    today: NaiveDate,
    confirm: bool,
) -> Result<Option<PathBuf>, RunError> {
    let mut fields: BTreeMap<String, serde_yaml::Value> = params
        .into_iter()
        .map(|(key, value)| (key, value.into()))
        .collect();
    let date = match fields.remove("date") {
        Some(serde_yaml::Value::String(raw)) => dates::parse_date(&raw, today)?,
        _ => today,
    };
    if let Some(number) = fields.remove("number") {
        warn!("Ignoring number={:?}, invoices are numbered from the ledger", number);
    }
    let processor = config
        .context_processor
        .as_deref()
        .map(|name| registry.get(name))
        .transpose()?;

    let mut ledger = Ledger::open(&config.invoices_file)?;
    let number = ledger.next_number(date.year())?;
    info!(
        "Next invoice is {} ({} on record)",
        number,
        ledger.records().len()
    );

    let mut context = config.context.clone();
    context.extend(fields.clone());
    context.insert("date".to_string(), date.to_string().into());
    context.insert("number".to_string(), number.to_string().into());
    if let Some(processor) = processor {
        processor(config, &mut context)?;
    }

    if confirm {
        show_invoice(number, date, &fields);
        if !input::confirm()? {
            info!("Invoice {} not recorded", number);
            return Ok(None);
        }
    }

    let document = render_and_compile(config, number, &context)?;

    ledger.append(InvoiceRecord::new(number, date.to_string(), fields));
    ledger.persist()?;

    let destination = config.invoice_dir.join(
        Path::new(&document_name(number))
            .with_extension(&config.compiler.output_extension),
    );
    document.publish(&destination)?;
    Ok(Some(destination))
}

fn document_name(number: InvoiceNumber) -> String {
    format!("invoice-{}", number)
}

fn render_and_compile(
    config: &Config,
    number: InvoiceNumber,
    context: &Context,
) -> Result<CompiledDocument, RunError> {
    let source = templates::render(config, context)?;
    info!("Compiling with {}", config.compiler.program);
    let document = compile::compile(
        &config.compiler,
        &config.invoice_dir,
        &document_name(number),
        &source,
    )?;
    debug!("Compiled {}", document.path().display());
    Ok(document)
}

fn show_invoice(
    number: InvoiceNumber,
    date: NaiveDate,
    fields: &BTreeMap<String, serde_yaml::Value>,
) {
    println!("Invoice: #{}\nDate: {}\n", number, date);
    for (key, value) in fields {
        let value = match value {
            serde_yaml::Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        };
        println!("{}: {}", key, value);
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("{source}")]
    Ledger {
        #[from]
        source: LedgerError,
    },

    #[error("{source}")]
    Date {
        #[from]
        source: DateError,
    },

    #[error("{source}")]
    Process {
        #[from]
        source: ProcessError,
    },

    #[error("Template Error: {source}")]
    Template {
        #[from]
        source: minijinja::Error,
    },

    #[error("{source}")]
    Compile {
        #[from]
        source: CompileError,
    },

    #[error("Input Error: {source}")]
    Input {
        #[from]
        source: inquire::error::InquireError,
    },
}
