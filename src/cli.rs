use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/* Argument structure
 *
 * [--config <file>] new [--confirm] KEY=VALUE...
 */

#[derive(Parser)]
#[command(about = "Generate invoices from LaTeX templates")]
pub struct Opts {
    /// path of the YAML config file
    #[arg(long, value_name = "FILE", default_value = "config.yaml",
        value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub subcommand: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new invoice
    New {
        /// Ask for confirmation before recording the invoice
        #[arg(long)]
        confirm: bool,

        /// Invoice parameters merged into the template context
        #[arg(value_name = "PARAM=VALUE", required = true, num_args = 1..,
            value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(param: &str) -> Result<(String, String), String> {
    match param.split_once('=') {
        Some((key, _)) if key.is_empty() => {
            Err(format!("missing key in '{}'", param))
        }
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, found '{}'", param)),
    }
}
