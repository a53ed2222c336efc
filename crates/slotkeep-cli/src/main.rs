use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use slotkeep::{Binding, JsonFileStore, Namespace, RegistryConfig, SlotIndex, SlotRegistry};

const DEFAULT_STORE_DIR: &str = ".slotkeep";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Assign(String),
    Lookup(String),
    Show(Option<Namespace>),
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    store: PathBuf,
    capacity: Option<usize>,
    command: Command,
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: slotkeep [--store <dir>] [--capacity <n>] <command>");
            eprintln!();
            eprintln!("Commands:");
            eprintln!("  assign <owner>      Assign a slot to <owner> and print it");
            eprintln!("  lookup <owner>      Print the slot held by <owner>");
            eprintln!("  show [namespace]    Print bindings, least recently used first");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --store <dir>       Store directory [default: {DEFAULT_STORE_DIR}]");
            eprintln!("  --capacity <n>      Slots per namespace [default: $SLOTKEEP_CAPACITY or 10]");
            process::exit(2);
        }
    };

    let mut stdout = io::stdout().lock();
    let result = run(&args, &mut stdout);
    let _ = stdout.flush();
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

/// Initialize tracing with SLOTKEEP_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("SLOTKEEP_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("info") => "info",
            Ok("error") => "error",
            Ok("trace") => "trace",
            _ => "warn",
        };
        EnvFilter::new(format!("slotkeep={level},slotkeep_cli={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut store = PathBuf::from(DEFAULT_STORE_DIR);
    let mut capacity = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--store" => {
                i += 1;
                store = PathBuf::from(args.get(i).ok_or("--store requires a value")?);
            }
            "--capacity" => {
                i += 1;
                let raw = args.get(i).ok_or("--capacity requires a value")?;
                capacity = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("invalid capacity '{raw}'"))?,
                );
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with("--") => return Err(format!("unknown flag: {arg}")),
            arg => positional.push(arg),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        ["assign", owner] => Command::Assign(owner.to_string()),
        ["lookup", owner] => Command::Lookup(owner.to_string()),
        ["assign" | "lookup"] => return Err(format!("{} requires <owner>", positional[0])),
        ["show"] => Command::Show(None),
        ["show", ns] => Command::Show(Some(ns.parse()?)),
        [] => return Err("missing command".to_string()),
        [cmd, ..] if matches!(*cmd, "assign" | "lookup" | "show") => {
            return Err(format!("too many arguments for {cmd}"));
        }
        [cmd, ..] => return Err(format!("unknown command: {cmd}")),
    };

    Ok(Args {
        store,
        capacity,
        command,
    })
}

#[derive(Serialize)]
struct AssignOutput<'a> {
    namespace: Namespace,
    slot: SlotIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    evicted: Option<&'a str>,
}

/// Execute a command, writing results to `out`. Returns the process exit code.
fn run(args: &Args, out: &mut dyn Write) -> anyhow::Result<i32> {
    let store = JsonFileStore::open(&args.store)
        .with_context(|| format!("failed to open store at {}", args.store.display()))?;
    let config = match args.capacity {
        Some(capacity) => RegistryConfig::uniform(capacity),
        None => RegistryConfig::default(),
    };
    let registry = SlotRegistry::new(Arc::new(store), config);
    tracing::debug!(
        store = %args.store.display(),
        capacity = args.capacity,
        command = ?args.command,
        "Running command"
    );

    match &args.command {
        Command::Assign(owner) => {
            let assignment = registry.assign(owner)?;
            assignment
                .persist
                .context("slot assigned but the store write failed")?;
            let output = AssignOutput {
                namespace: Namespace::for_owner(owner),
                slot: assignment.slot,
                evicted: assignment.evicted.as_ref().map(|o| o.as_str()),
            };
            writeln!(out, "{}", serde_json::to_string(&output)?)?;
            Ok(0)
        }
        Command::Lookup(owner) => match registry.lookup(owner)? {
            Some(slot) => {
                writeln!(out, "{slot}")?;
                Ok(0)
            }
            None => {
                eprintln!("not assigned: {owner}");
                Ok(1)
            }
        },
        Command::Show(namespace) => {
            let namespaces = match namespace {
                Some(ns) => vec![*ns],
                None => Namespace::ALL.to_vec(),
            };
            let mut shown: BTreeMap<Namespace, Vec<Binding>> = BTreeMap::new();
            for ns in namespaces {
                shown.insert(ns, registry.bindings(ns)?);
            }
            writeln!(out, "{}", serde_json::to_string_pretty(&shown)?)?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("slotkeep")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    fn run_in(dir: &std::path::Path, args: &[&str]) -> (i32, String) {
        let mut full = vec!["--store", dir.to_str().unwrap(), "--capacity", "2"];
        full.extend_from_slice(args);
        let args = parse_args(&argv(&full)).unwrap();
        let mut out = Vec::new();
        let code = run(&args, &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_commands_and_flags() {
        let args = parse_args(&argv(&["--store", "/tmp/s", "--capacity", "4", "assign", "a"]))
            .unwrap();
        assert_eq!(
            args,
            Args {
                store: PathBuf::from("/tmp/s"),
                capacity: Some(4),
                command: Command::Assign("a".to_string()),
            }
        );

        let args = parse_args(&argv(&["show", "webapk"])).unwrap();
        assert_eq!(args.store, PathBuf::from(DEFAULT_STORE_DIR));
        assert_eq!(args.capacity, None);
        assert_eq!(args.command, Command::Show(Some(Namespace::WebApk)));

        assert_eq!(
            parse_args(&argv(&["lookup", "webapk:x"])).unwrap().command,
            Command::Lookup("webapk:x".to_string())
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&argv(&[])).is_err());
        assert!(parse_args(&argv(&["assign"])).is_err());
        assert!(parse_args(&argv(&["assign", "a", "b"])).is_err());
        assert!(parse_args(&argv(&["show", "nope"])).is_err());
        assert!(parse_args(&argv(&["frobnicate"])).is_err());
        assert!(parse_args(&argv(&["--capacity", "many", "show"])).is_err());
        assert!(parse_args(&argv(&["--store"])).is_err());
        assert!(parse_args(&argv(&["--verbose", "show"])).is_err());
        assert_eq!(parse_args(&argv(&["--help"])), Err(String::new()));
    }

    #[test]
    fn assign_then_lookup_across_runs() {
        let dir = tempfile::tempdir().unwrap();

        let (code, out) = run_in(dir.path(), &["assign", "a"]);
        assert_eq!(code, 0);
        assert_eq!(out.trim(), r#"{"namespace":"webapp","slot":0}"#);

        let (code, out) = run_in(dir.path(), &["lookup", "a"]);
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "0");

        let (code, out) = run_in(dir.path(), &["lookup", "webapk:a"]);
        assert_eq!(code, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn assign_reports_eviction() {
        let dir = tempfile::tempdir().unwrap();
        run_in(dir.path(), &["assign", "a"]);
        run_in(dir.path(), &["assign", "b"]);

        let (_, out) = run_in(dir.path(), &["assign", "c"]);
        assert_eq!(
            out.trim(),
            r#"{"namespace":"webapp","slot":0,"evicted":"a"}"#
        );
    }

    #[test]
    fn show_lists_bindings_by_namespace() {
        let dir = tempfile::tempdir().unwrap();
        run_in(dir.path(), &["assign", "webapk:x"]);

        let (code, out) = run_in(dir.path(), &["show"]);
        assert_eq!(code, 0);
        let shown: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            shown,
            serde_json::json!({
                "webapp": [{"slot": 0}, {"slot": 1}],
                "webapk": [{"slot": 1}, {"slot": 0, "owner": "webapk:x"}],
            })
        );
    }

    #[test]
    fn empty_owner_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse_args(&argv(&[
            "--store",
            dir.path().to_str().unwrap(),
            "assign",
            "",
        ]))
        .unwrap();
        let mut out = Vec::new();
        assert!(run(&args, &mut out).is_err());
    }
}
