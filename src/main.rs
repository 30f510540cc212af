/*
 * Generate numbered invoices from a LaTeX template.
 *
 * A new invoice:
 *  - Takes KEY=VALUE parameters, and optionally a date, from the command line
 *  - Gets the next number for the invoice's year from the ledger
 *  - Merges the parameters into the context from the config file
 *  - Runs the configured context processor, e.g. rolling up billed hours
 *  - Renders the template and compiles it with pdflatex
 *  - Records the invoice in the ledger and moves the PDF into place
 *
 * The ledger is locked from reading the last number until the new invoice
 * is recorded, so concurrent runs cannot hand out the same number.
 */

mod billing;
mod cli;
mod compile;
mod config;
mod dates;
mod error;
mod input;
mod ledger;
mod processors;
mod run;
mod templates;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use crate::cli::Opts;

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let opts = Opts::parse();
    let Some(subcommand) = opts.subcommand else {
        println!("{}", Opts::command().render_usage());
        return ExitCode::SUCCESS;
    };

    if let Err(error) = run::run_cmd_with_path(subcommand, &opts.config) {
        eprintln!("{}", error);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
