use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the reify binary.
#[derive(Parser, Debug)]
#[command(
    name = "reify",
    version,
    about = "Inspect reified generic parameters of a declaration schema"
)]
pub struct CliArgs {
    /// Declaration schema (JSON).
    pub schema: PathBuf,

    /// Options file (JSON, camelCase keys).
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Use parameter bounds when a bare declaration has no default.
    #[arg(long = "fallback-bound", alias = "fallbackToBound")]
    pub fallback_bound: bool,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Disable colored output.
    #[arg(long = "no-color")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every declaration with its signature.
    List,

    /// Print a declaration's parameter graph.
    Graph { decl: String },

    /// Print a declaration's member-resolution order.
    Mro { decl: String },

    /// Resolve an ancestor's parameters from a declaration, or from its
    /// specialization when `--args` is given.
    Resolve {
        decl: String,
        ancestor: String,
        /// Arguments, e.g. `int, List[str]`.
        #[arg(long)]
        args: Option<String>,
    },

    /// Apply arguments to a declaration and call one of its members.
    Call {
        decl: String,
        member: String,
        /// Arguments, e.g. `int, List[str]`.
        #[arg(long)]
        args: Option<String>,
    },
}
