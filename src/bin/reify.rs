#![allow(clippy::print_stderr)]

use clap::Parser;
use colored::Colorize;
use std::io::IsTerminal;
use std::process::ExitCode;

use reify::cli::args::CliArgs;
use reify::cli::driver;

fn main() -> ExitCode {
    // Initialize tracing if REIFY_LOG or RUST_LOG is set.
    reify::tracing_config::init_tracing();

    let args = CliArgs::parse();
    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    match driver::run(&args) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}: {error:#}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
