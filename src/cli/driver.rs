//! Runs one CLI command against a loaded schema.

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::cli::args::{CliArgs, Command};
use crate::schema::{self, LoadedSchema, Schema};
use reify_common::ReifyOptions;
use reify_solver::{Applied, DeclId, Receiver, ReifyError, TypeSystem, Value};

#[derive(Serialize)]
struct ResolveReport {
    root: String,
    ancestor: String,
    args: Vec<Option<String>>,
}

#[derive(Serialize)]
struct CallReport {
    receiver: String,
    member: String,
    intercepted: bool,
    result: String,
}

#[derive(Serialize)]
struct DeclReport {
    name: String,
    signature: String,
    mro: Vec<String>,
}

/// Options from `--config`, with command line flags applied on top.
pub fn load_options(args: &CliArgs) -> Result<ReifyOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read options file {}", path.display()))?;
            ReifyOptions::from_json_str(&text)
                .with_context(|| format!("invalid options file {}", path.display()))?
        }
        None => ReifyOptions::default(),
    };
    if args.fallback_bound {
        options.fallback_to_bound = true;
    }
    Ok(options)
}

pub fn load_schema(sys: &TypeSystem, path: &Path) -> Result<LoadedSchema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    let parsed = Schema::from_json_str(&text)
        .with_context(|| format!("failed to parse schema {}", path.display()))?;
    let loaded = schema::load(sys, &parsed)
        .with_context(|| format!("failed to load schema {}", path.display()))?;
    debug!(declarations = loaded.len(), "schema loaded");
    Ok(loaded)
}

/// Load everything named by `args` and run its command.
pub fn run(args: &CliArgs) -> Result<String> {
    let sys = TypeSystem::with_options(load_options(args)?);
    let loaded = load_schema(&sys, &args.schema)?;
    let color = !args.no_color;
    let output = execute(&sys, &loaded, &args.command, args.json, color)?;
    debug!(stats = ?sys.registry().stats(), "registry after command");
    Ok(output)
}

pub fn execute(
    sys: &TypeSystem,
    loaded: &LoadedSchema,
    command: &Command,
    json: bool,
    color: bool,
) -> Result<String> {
    let fmt = sys.formatter();
    let describe = |error: ReifyError| anyhow!(fmt.describe_error(&error));
    let header = |text: String| {
        if color {
            text.bold().to_string()
        } else {
            text
        }
    };

    match command {
        Command::List => {
            let reports: Vec<DeclReport> = loaded
                .declarations()
                .iter()
                .map(|&decl| -> Result<DeclReport> {
                    Ok(DeclReport {
                        name: fmt.decl(decl),
                        signature: fmt.signature(decl),
                        mro: sys
                            .mro(decl)
                            .map_err(describe)?
                            .iter()
                            .map(|&d| fmt.decl(d))
                            .collect(),
                    })
                })
                .collect::<Result<_>>()?;
            if json {
                return Ok(serde_json::to_string_pretty(&reports)?);
            }
            Ok(reports
                .iter()
                .map(|r| r.signature.clone())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Graph { decl } => {
            let decl = loaded.require(decl)?;
            let graph = sys.graph(decl).map_err(describe)?;
            if json {
                let edges: Vec<(String, String)> = graph
                    .substitution_edges()
                    .map(|(from, to)| (fmt.param(from), fmt.param(to)))
                    .collect();
                return Ok(serde_json::to_string_pretty(&edges)?);
            }
            let text = fmt.graph(&graph);
            let (first, rest) = text.split_once('\n').unwrap_or((text.as_str(), ""));
            if rest.is_empty() {
                return Ok(header(first.to_string()));
            }
            Ok(format!("{}\n{rest}", header(first.to_string())))
        }
        Command::Mro { decl } => {
            let decl = loaded.require(decl)?;
            let mro = sys.mro(decl).map_err(describe)?;
            if json {
                let names: Vec<String> = mro.iter().map(|&d| fmt.decl(d)).collect();
                return Ok(serde_json::to_string_pretty(&names)?);
            }
            Ok(fmt.mro(&mro))
        }
        Command::Resolve {
            decl,
            ancestor,
            args,
        } => {
            let decl = loaded.require(decl)?;
            let ancestor = loaded.require(ancestor)?;
            let receiver = receiver(sys, loaded, decl, args.as_deref())?;
            let resolved = sys.resolve(&receiver, ancestor).map_err(describe)?;
            if json {
                let report = ResolveReport {
                    root: fmt.value(&receiver.to_value()),
                    ancestor: fmt.decl(ancestor),
                    args: resolved
                        .iter()
                        .map(|v| v.as_ref().map(|v| fmt.value(v)))
                        .collect(),
                };
                return Ok(serde_json::to_string_pretty(&report)?);
            }
            Ok(fmt.resolved(&resolved))
        }
        Command::Call {
            decl,
            member,
            args,
        } => {
            let decl = loaded.require(decl)?;
            let values = parse_args(sys, loaded, args.as_deref())?;
            let (receiver, result) = match sys.apply(decl, &values).map_err(describe)? {
                Applied::Proxy(proxy) => {
                    let result = proxy.call(member, &[]).map_err(describe)?;
                    (Some(proxy.into_specialization().as_value()), result)
                }
                Applied::Plain(_) => {
                    let result = sys
                        .invoke(Receiver::Declaration(decl), member, &[])
                        .map_err(describe)?;
                    (None, result)
                }
            };
            if json {
                let report = CallReport {
                    receiver: fmt.value(receiver.as_ref().unwrap_or(&Value::Decl(decl))),
                    member: member.clone(),
                    intercepted: receiver.is_some(),
                    result: fmt.value(&result),
                };
                return Ok(serde_json::to_string_pretty(&report)?);
            }
            Ok(fmt.value(&result))
        }
    }
}

fn parse_args(sys: &TypeSystem, loaded: &LoadedSchema, args: Option<&str>) -> Result<Vec<Value>> {
    match args {
        Some(text) => Ok(loaded.parse_args(sys, text)?),
        None => Ok(Vec::new()),
    }
}

fn receiver(
    sys: &TypeSystem,
    loaded: &LoadedSchema,
    decl: DeclId,
    args: Option<&str>,
) -> Result<Receiver> {
    if args.is_none() {
        return Ok(Receiver::Declaration(decl));
    }
    let values = parse_args(sys, loaded, args)?;
    let spec = sys
        .specialize(decl, &values)
        .map_err(|e| anyhow!(sys.formatter().describe_error(&e)))?;
    Ok(Receiver::Specialization(spec))
}
