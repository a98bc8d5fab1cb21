//! Command-line interface for the FACET compiler
//!
//! Two subcommands over the core compile function:
//!
//!     facet canon <path|-> [--resolve host|all] [--var k=v ...]
//!                 [--import-root DIR ...] [--strict-merge]
//!     facet lint  <path|-> [--import-root DIR ...]
//!
//! `canon` prints the canonical tree as pretty JSON; `lint` prints `OK`.
//! Exit codes: 0 on success, 1 on a compile (or read) error, 2 on argument
//! misuse. Errors render as `CODE at L:C: message` on stderr.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use facet::facet::limits::MAX_FILE_BYTES;
use facet::{compile, CompileOptions, ResolveMode, Value};
use indexmap::IndexMap;

fn cli() -> Command {
    Command::new("facet")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compile FACET documents to canonical JSON")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("canon")
                .about("Compile a document and print pretty JSON")
                .arg(
                    Arg::new("input")
                        .help(".facet file path or - for stdin")
                        .required(true),
                )
                .arg(
                    Arg::new("resolve")
                        .long("resolve")
                        .value_parser(["host", "all"])
                        .default_value("host")
                        .help("Variable visibility during evaluation"),
                )
                .arg(
                    Arg::new("var")
                        .long("var")
                        .action(ArgAction::Append)
                        .help("Host variable as k=v (repeatable)"),
                )
                .arg(
                    Arg::new("import-root")
                        .long("import-root")
                        .action(ArgAction::Append)
                        .help("Allowed import root directory (repeatable)"),
                )
                .arg(
                    Arg::new("strict-merge")
                        .long("strict-merge")
                        .action(ArgAction::SetTrue)
                        .help("Treat import body-shape mismatches as errors"),
                ),
        )
        .subcommand(
            Command::new("lint")
                .about("Compile a document and report OK or the error")
                .arg(
                    Arg::new("input")
                        .help(".facet file path or - for stdin")
                        .required(true),
                )
                .arg(
                    Arg::new("import-root")
                        .long("import-root")
                        .action(ArgAction::Append)
                        .help("Allowed import root directory (repeatable)"),
                ),
        )
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(text);
    }
    let meta =
        std::fs::metadata(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    if meta.len() > MAX_FILE_BYTES {
        return Err(format!(
            "F998: '{}' exceeds the maximum file size of {} bytes",
            input, MAX_FILE_BYTES
        ));
    }
    std::fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input, e))
}

fn parse_host_vars(matches: &clap::ArgMatches) -> Result<IndexMap<String, Value>, String> {
    let mut host_vars = IndexMap::new();
    if let Some(values) = matches.get_many::<String>("var") {
        for kv in values {
            let Some((k, v)) = kv.split_once('=') else {
                return Err(format!("--var expects k=v, got: {}", kv));
            };
            host_vars.insert(k.to_string(), Value::Str(v.to_string()));
        }
    }
    Ok(host_vars)
}

fn import_roots(matches: &clap::ArgMatches) -> Vec<PathBuf> {
    matches
        .get_many::<String>("import-root")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default()
}

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Warn).ok();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("canon", sub)) => {
            let input = sub.get_one::<String>("input").expect("required arg");
            let host_vars = match parse_host_vars(sub) {
                Ok(vars) => vars,
                Err(msg) => {
                    eprintln!("{}", msg);
                    return ExitCode::from(2);
                }
            };
            let resolve_mode = sub
                .get_one::<String>("resolve")
                .and_then(|s| s.parse::<ResolveMode>().ok())
                .unwrap_or_default();
            let opts = CompileOptions {
                host_vars,
                resolve_mode,
                import_roots: import_roots(sub),
                strict_merge: sub.get_flag("strict-merge"),
                current_file: (input != "-").then(|| PathBuf::from(input)),
            };
            run(input, &opts, true)
        }
        Some(("lint", sub)) => {
            let input = sub.get_one::<String>("input").expect("required arg");
            let opts = CompileOptions {
                import_roots: import_roots(sub),
                current_file: (input != "-").then(|| PathBuf::from(input)),
                ..Default::default()
            };
            run(input, &opts, false)
        }
        _ => ExitCode::from(2),
    }
}

fn run(input: &str, opts: &CompileOptions, print_tree: bool) -> ExitCode {
    let text = match read_input(input) {
        Ok(text) => text,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(1);
        }
    };
    match compile(&text, opts) {
        Ok(tree) => {
            if print_tree {
                match serde_json::to_string_pretty(&tree) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize output: {}", e);
                        return ExitCode::from(1);
                    }
                }
            } else {
                println!("OK");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}
