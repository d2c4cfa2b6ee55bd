use super::*;

use anyhow::{anyhow, Context};
use clap::Command;
use kpiboard::Dashboard;
use tokio::sync::Notify;

use std::sync::Arc;

pub struct Config {
    config: PathBuf,
    verbose: u8,
    template: Option<String>,
}

impl TryFrom<ArgMatches> for Config {
    type Error = String;

    fn try_from(args: ArgMatches) -> Result<Self, Self::Error> {
        Ok(Config {
            config: config_path(&args)?,
            verbose: verbosity(&args),
            template: args.get_one::<String>("TEMPLATE").cloned(),
        })
    }
}

pub fn command() -> Command {
    Command::new("watch")
        .about("Load every chart of a template and keep them refreshed")
        .arg(config_arg())
        .arg(verbose_arg())
        .arg(
            Arg::new("TEMPLATE")
                .long("template")
                .short('t')
                .help("Template id, defaults to the user's default template")
                .action(ArgAction::Set),
        )
}

/// Runs until interrupted, printing the state of every chart after each
/// refresh interval.
pub fn run(config: Config) -> anyhow::Result<()> {
    let settings = load_config(&config.config)?;
    init_logging(config.verbose, settings.log().level());

    let dashboard = Dashboard::create(&settings)?;
    let rt = runtime()?;

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        signal.notify_one();
    })
    .context("failed to set ctrl-c handler")?;

    rt.block_on(async {
        let catalog = dashboard.catalog();
        catalog.refresh_templates().await?;

        if let Some(id) = &config.template {
            catalog.select(id)?;
        }
        let template = catalog
            .selected()
            .ok_or_else(|| anyhow!("no templates for user {}", catalog.user_id()))?;

        dashboard.auto_refresh().set_enabled(true);

        let outcomes = dashboard.load_template(&template.id).await?;
        tracing::info!(
            "watching {} charts of template {}",
            outcomes.len(),
            template.name
        );

        let period = dashboard.auto_refresh().interval();
        let mut status = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = status.tick() => print_status(&dashboard),
            }
        }

        Ok::<_, anyhow::Error>(())
    })?;

    tracing::info!("shutting down");
    dashboard.dispose();
    Ok(())
}

fn print_status(dashboard: &Dashboard) {
    let store = dashboard.store();
    let stats = dashboard.cache_stats();

    println!(
        "cache: {} active, {} expired, {} hits, {} misses",
        stats.active, stats.expired, stats.hits, stats.misses
    );

    for chart_id in store.chart_ids() {
        let Some(record) = store.record(&chart_id) else {
            continue;
        };

        let state = if store.is_loading(&chart_id) {
            "loading".to_string()
        } else if let Some(error) = store.error(&chart_id) {
            format!("error: {error}")
        } else if record.data.is_empty() {
            "no data".to_string()
        } else {
            format!("{} points", record.data.len())
        };

        let stale = if record.is_stale { " (stale)" } else { "" };
        let updated = record
            .last_updated
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());

        println!("  {chart_id}\t{updated}\t{state}{stale}");
    }
}
