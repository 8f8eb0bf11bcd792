//! `bfx` - maintenance CLI for a ButterflyFx substrate store

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use bfx_store::stress::{self, StressConfig};
use bfx_store::{BackendKind, CentralStore, LocalStore, Srl, StoreConfig};

fn cli() -> Command {
    Command::new("bfx")
        .version(bfx_store::VERSION)
        .about("ButterflyFx substrate store maintenance")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .long("path")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Root directory of a file-backed store"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Use an ephemeral in-memory store"),
        )
        .subcommand(
            Command::new("put")
                .about("Store a value")
                .arg(Arg::new("srl").required(true).help("Target SRL"))
                .arg(
                    Arg::new("json")
                        .required(true)
                        .help("JSON payload, or @file to read it from disk"),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Print the record an SRL refers to")
                .arg(Arg::new("srl").required(true).help("SRL, optionally pinned with @N"))
                .arg(
                    Arg::new("raw")
                        .long("raw")
                        .action(ArgAction::SetTrue)
                        .help("Print the payload bytes only"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("List a lineage's versions and its Merkle root")
                .arg(Arg::new("srl").required(true).help("Target SRL")),
        )
        .subcommand(
            Command::new("list")
                .about("List keys under a realm")
                .arg(Arg::new("realm").required(true).help("Realm to list"))
                .arg(Arg::new("prefix").default_value("").help("Path prefix filter")),
        )
        .subcommand(Command::new("verify").about("Recompute every record's identity"))
        .subcommand(Command::new("compact").about("Run compaction and print the report"))
        .subcommand(Command::new("stats").about("Print store statistics"))
        .subcommand(
            Command::new("stress")
                .about("Run a seeded multi-writer workload")
                .arg(
                    Arg::new("keys")
                        .long("keys")
                        .default_value("16")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("commits")
                        .long("commits")
                        .default_value("1000")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("writers")
                        .long("writers")
                        .default_value("4")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .default_value("last-writer-wins")
                        .help("Conflict resolution strategy for the run"),
                ),
        )
}

fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<StoreConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => StoreConfig::default(),
    };
    if let Some(path) = matches.get_one::<PathBuf>("path") {
        config.backend = BackendKind::File;
        config.root = path.clone();
    }
    if matches.get_flag("memory") {
        config.backend = BackendKind::Memory;
    }
    Ok(config)
}

fn parse_srl(raw: &str) -> anyhow::Result<Srl> {
    raw.parse::<Srl>()
        .with_context(|| format!("parsing srl '{raw}'"))
}

fn read_payload(arg: &str) -> anyhow::Result<serde_json::Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading payload {path}"))?
        }
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("payload is not valid JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("put", args)) => {
            let srl = parse_srl(args.get_one::<String>("srl").unwrap())?;
            let value = read_payload(args.get_one::<String>("json").unwrap())?;
            let store = LocalStore::open(config).await?;
            let version = store.put(&srl, &value).await?;
            store.flush().await?;
            println!("{} {version}", srl.canonical_key());
        }
        Some(("get", args)) => {
            let srl = parse_srl(args.get_one::<String>("srl").unwrap())?;
            let store = LocalStore::open(config).await?;
            match store.get(&srl).await? {
                Some(record) if args.get_flag("raw") => {
                    use std::io::Write;
                    std::io::stdout().write_all(&record.payload)?;
                }
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => bail!("{srl} not found"),
            }
        }
        Some(("history", args)) => {
            let srl = parse_srl(args.get_one::<String>("srl").unwrap())?;
            let store = LocalStore::open(config).await?;
            let history = store.history(&srl).await?;
            if history.is_empty() {
                bail!("{srl} has no retained versions");
            }
            for summary in &history {
                println!(
                    "{} {} {} {}{}",
                    summary.version,
                    summary.identity,
                    summary.created_at.to_rfc3339(),
                    summary.payload_len,
                    if summary.tombstone { " tombstone" } else { "" },
                );
            }
            println!("root {}", store.history_root(&srl).await?);
        }
        Some(("list", args)) => {
            let realm = args.get_one::<String>("realm").unwrap();
            let prefix = args.get_one::<String>("prefix").unwrap();
            let store = LocalStore::open(config).await?;
            for key in store.list(realm, prefix) {
                println!("{key}");
            }
        }
        Some(("verify", _)) => {
            let store = LocalStore::open(config).await?;
            let report = store.verify().await?;
            println!(
                "checked {} records, {} mismatches",
                report.records_checked,
                report.mismatches.len()
            );
            for (key, version) in &report.mismatches {
                eprintln!("MISMATCH {key} {version}");
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Some(("compact", _)) => {
            let store = LocalStore::open(config).await?;
            let report = store.compact().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(("stats", _)) => {
            let store = LocalStore::open(config).await?;
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Some(("stress", args)) => {
            let stress_config = StressConfig {
                keys: *args.get_one::<usize>("keys").unwrap(),
                commits: *args.get_one::<u64>("commits").unwrap(),
                writers: *args.get_one::<usize>("writers").unwrap(),
                seed: *args.get_one::<u64>("seed").unwrap(),
            };
            let strategy = args.get_one::<String>("strategy").unwrap();
            let store = CentralStore::open(
                config
                    .with_strategy(strategy.clone())
                    .with_max_commit_attempts(16),
            )
            .await?;
            let report = stress::run(store, stress_config).await?;
            println!("{}", report.summary());
            if !report.passed() {
                std::process::exit(1);
            }
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}
