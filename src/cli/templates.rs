use super::*;

use clap::Command;
use kpiboard::Dashboard;

pub struct Config {
    config: PathBuf,
    verbose: u8,
    detail: bool,
}

impl TryFrom<ArgMatches> for Config {
    type Error = String;

    fn try_from(args: ArgMatches) -> Result<Self, Self::Error> {
        Ok(Config {
            config: config_path(&args)?,
            verbose: verbosity(&args),
            detail: args.get_flag("DETAIL"),
        })
    }
}

pub fn command() -> Command {
    Command::new("templates")
        .about("List the dashboard templates saved for the configured user")
        .arg(config_arg())
        .arg(verbose_arg())
        .arg(
            Arg::new("DETAIL")
                .long("detail")
                .short('d')
                .help("Also show each template's graphs")
                .action(ArgAction::SetTrue),
        )
}

pub fn run(config: Config) -> anyhow::Result<()> {
    let settings = load_config(&config.config)?;
    init_logging(config.verbose, settings.log().level());

    let dashboard = Dashboard::create(&settings)?;
    let rt = runtime()?;

    rt.block_on(async {
        let catalog = dashboard.catalog();
        let templates = catalog.refresh_templates().await?;
        if templates.is_empty() {
            println!("no templates for user {}", catalog.user_id());
            return Ok(());
        }

        let selected = catalog.selected().map(|t| t.id);

        for template in &templates {
            let marker = if selected.as_ref() == Some(&template.id) {
                "*"
            } else {
                " "
            };
            let favorite = if template.is_favorite { " (favorite)" } else { "" };
            println!("{marker} {}\t{}{favorite}", template.id, template.name);

            if !config.detail {
                continue;
            }

            let detail = catalog.detail(&template.id).await?;
            let stats = catalog.stats(&template.id).await?;
            println!(
                "    {} graphs, {} systems, frequency {}, resolution {}",
                stats.graphs,
                stats.systems,
                or_dash(&stats.frequency),
                or_dash(&stats.resolution),
            );
            for graph in &detail.graphs {
                println!(
                    "    {}\t{}\t{:?}\t{}",
                    graph.graph_id,
                    graph.graph_name,
                    graph.graph_type,
                    graph.kpi_ids().join(",")
                );
            }
        }

        Ok::<_, anyhow::Error>(())
    })
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
