mod config;
mod interrupt;
mod registry;
mod reporting;
mod swarm;
mod telemetry;
mod tracecontext;

use crate::config::{Config, ConfigError};
use crate::registry::TargetRegistry;
use crate::reporting::{Progress, Summary};
use crate::swarm::Swarm;
use crate::telemetry::{Telemetry, TelemetryConfig};
use anyhow::Error;
use apmbench_client::Client;
use apmbench_metrics::sinks::{EmissionQueue, Fanout};
use apmbench_metrics::Aggregator;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use slog::{o, Drain, Level};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn root_logger(level: Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().stdout().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let async_drain = slog_async::Async::new(drain).build().fuse();
    let level_filter = slog::LevelFilter(async_drain, level).fuse();
    slog::Logger::root(level_filter, o!())
}

fn cli() -> Command {
    Command::new("apmbench")
        .version("0.1.0")
        .author("Benn Sundsrud <benn.sundsrud@gmail.com>")
        .about("Load instrumented web app variants and report their mean response times")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to config file")
                .required(true),
        )
        .arg(
            Arg::new("C")
                .short('C')
                .help("Continuous mode, run until Ctrl+C")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["n", "run-time"]),
        )
        .arg(
            Arg::new("n")
                .short('n')
                .long("requests")
                .value_name("COUNT")
                .help("Stop after this many requests across all users")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("users")
                .short('u')
                .long("users")
                .value_name("COUNT")
                .help("Number of concurrent virtual users")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("run-time")
                .short('t')
                .long("run-time")
                .value_name("SECONDS")
                .help("Stop after this many seconds")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("variant")
                .long("variant")
                .value_name("NAME")
                .help("Only load this variant (repeatable), overrides `enabled` in the config")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(ArgAction::Count)
                .help("Sets verbosity level"),
        )
        .subcommand(Command::new("targets").about("list declared variants and exit"))
}

fn level(matches: &ArgMatches) -> Level {
    match matches.get_count("v") {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        3 => Level::Trace,
        _ => {
            eprintln!("WARNING: more than -vvv is ignored");
            Level::Trace
        }
    }
}

/// Fold command line overrides into the loaded config.
fn apply_overrides(matches: &ArgMatches, config: &mut Config) -> Result<(), ConfigError> {
    let load = &mut config.load;
    if matches.get_flag("C") {
        load.run_time = None;
        load.requests = None;
    }
    if let Some(n) = matches.get_one::<u64>("n") {
        load.requests = Some(*n);
    }
    if let Some(secs) = matches.get_one::<u64>("run-time") {
        load.run_time = Some(Duration::from_secs(*secs));
    }
    if let Some(users) = matches.get_one::<usize>("users") {
        if *users == 0 {
            return Err(ConfigError::NoUsers);
        }
        load.users = *users;
    }
    Ok(())
}

fn build_registry(matches: &ArgMatches, config: &mut Config) -> Result<TargetRegistry, ConfigError> {
    let mut registry = TargetRegistry::new(std::mem::take(&mut config.variants))?;
    if let Some(names) = matches.get_many::<String>("variant") {
        registry.enable_only(names)?;
    }
    Ok(registry)
}

fn list_targets(registry: &TargetRegistry) {
    for t in registry.all() {
        println!(
            "{} {} {} {} (weight {}{})",
            if t.enabled { "+" } else { "-" },
            t.name,
            t.method,
            t.url,
            t.weight,
            if t.trace_options.is_some() {
                ", trace context"
            } else {
                ""
            }
        );
    }
}

/// Returns true when every observation was accepted.
fn run(logger: slog::Logger, config: Config, registry: TargetRegistry) -> Result<bool, Error> {
    // The OTLP exporter blocks, so it has to be set up outside the runtime.
    let telemetry = Telemetry::init(&TelemetryConfig::from_env(), &logger)?;

    let queue = EmissionQueue::new();
    let sink = Fanout::new().with(telemetry.sink()).with(queue.sink());
    let aggregator = Arc::new(Aggregator::new(registry.variant_ids(), sink));
    let progress = Progress::spawn(queue.receiver(), logger.new(o!("task" => "progress")))?;
    drop(queue);

    let client = Client::builder()
        .keep_alive(config.load.keep_alive)
        .timeout(config.load.request_timeout)
        .build()?;
    let swarm = Swarm::new(
        &registry,
        config.load,
        client,
        aggregator.clone(),
        logger.new(o!("task" => "swarm")),
    )?;
    let interrupted = interrupt::register(logger.clone())?;

    let stats = Runtime::new()?.block_on(swarm.run(interrupted));

    let summary = Summary::new(&registry, aggregator.snapshot_all(), &stats);
    println!("{}", summary);
    drop(aggregator);
    let emissions = progress.join();
    slog::debug!(logger, "Emissions per variant: {:?}", emissions);
    telemetry.shutdown(&logger);
    Ok(stats.rejected == 0)
}

fn main() {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or_default();
    let mut config = match Config::load(config_path) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("Could not load config: {:#}", e);
            std::process::exit(1);
        }
    };
    let registry = match apply_overrides(&matches, &mut config)
        .and_then(|_| build_registry(&matches, &mut config))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if matches.subcommand_matches("targets").is_some() {
        list_targets(&registry);
        return;
    }
    let logger = root_logger(level(&matches));
    match run(logger.clone(), config, registry) {
        Ok(true) => {}
        Ok(false) => {
            slog::error!(logger, "Some observations were rejected");
            drop(logger);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error running benchmark: {:#}", e);
            drop(logger);
            std::process::exit(1);
        }
    }
}
