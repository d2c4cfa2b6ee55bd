use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches};
use kpiboard::config::LogLevel;
use kpiboard::Config;
use tracing_subscriber::filter::LevelFilter;

use std::path::{Path, PathBuf};

pub mod chart;
pub mod templates;
pub mod watch;

pub fn config_arg() -> Arg {
    Arg::new("CONFIG")
        .help("kpiboard configuration file")
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .required(true)
        .index(1)
}

pub fn verbose_arg() -> Arg {
    Arg::new("VERBOSE")
        .long("verbose")
        .short('v')
        .help("Increase the verbosity")
        .action(ArgAction::Count)
}

pub fn config_path(args: &ArgMatches) -> Result<PathBuf, String> {
    args.get_one::<PathBuf>("CONFIG")
        .cloned()
        .ok_or_else(|| "missing config file".to_string())
}

pub fn verbosity(args: &ArgMatches) -> u8 {
    args.get_one::<u8>("VERBOSE").copied().unwrap_or(0)
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(&path).with_context(|| format!("error loading config file: {}", path.display()))
}

/// Log to stderr. Each `-v` raises the level above the configured one.
pub fn init_logging(verbose: u8, configured: LogLevel) {
    let level = match verbose {
        0 => configured.into(),
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("kpiboard")
        .build()
        .context("failed to launch async runtime")
}
