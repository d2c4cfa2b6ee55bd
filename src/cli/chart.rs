use super::*;

use anyhow::bail;
use clap::Command;
use kpiboard::{Dashboard, FetchOutcome, FetchRequest, RequestedRange};

pub struct Config {
    config: PathBuf,
    verbose: u8,
    kpis: Vec<String>,
    chart_id: String,
    from: Option<String>,
    to: Option<String>,
    aggregation: Option<String>,
    json: bool,
}

impl TryFrom<ArgMatches> for Config {
    type Error = String;

    fn try_from(args: ArgMatches) -> Result<Self, Self::Error> {
        let kpis: Vec<String> = args
            .get_many::<String>("KPI")
            .map(|v| v.cloned().collect())
            .unwrap_or_default();
        if kpis.is_empty() {
            return Err("at least one kpi is required".into());
        }

        Ok(Config {
            config: config_path(&args)?,
            verbose: verbosity(&args),
            kpis,
            chart_id: args
                .get_one::<String>("CHART_ID")
                .cloned()
                .unwrap_or_else(|| "chart".into()),
            from: args.get_one::<String>("FROM").cloned(),
            to: args.get_one::<String>("TO").cloned(),
            aggregation: args.get_one::<String>("AGGREGATION").cloned(),
            json: args.get_flag("JSON"),
        })
    }
}

pub fn command() -> Command {
    Command::new("chart")
        .about("Fetch the combined series of one or more KPIs")
        .arg(config_arg())
        .arg(
            Arg::new("KPI")
                .help("KPI ids, in the order their series are combined")
                .action(ArgAction::Append)
                .num_args(1..)
                .required(true)
                .index(2),
        )
        .arg(verbose_arg())
        .arg(
            Arg::new("CHART_ID")
                .long("chart-id")
                .help("Identifier of the chart")
                .action(ArgAction::Set)
                .default_value("chart"),
        )
        .arg(
            Arg::new("FROM")
                .long("from")
                .help("Start of the range, defaults to seven days ago")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("TO")
                .long("to")
                .help("End of the range, defaults to now")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("AGGREGATION")
                .long("aggregation")
                .short('a')
                .help("Aggregation bucket, defaults to the KPI group's")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("JSON")
                .long("json")
                .help("Print the chart record as JSON")
                .action(ArgAction::SetTrue),
        )
}

pub fn run(config: Config) -> anyhow::Result<()> {
    let settings = load_config(&config.config)?;
    init_logging(config.verbose, settings.log().level());

    let dashboard = Dashboard::create(&settings)?;
    let rt = runtime()?;

    let range = match (&config.from, &config.to) {
        (None, None) => None,
        (from, to) => Some(RequestedRange {
            from: from.clone(),
            to: to.clone(),
        }),
    };

    let request = FetchRequest::new(config.chart_id.clone(), config.kpis.clone())
        .range(range)
        .aggregation(config.aggregation.clone());

    let outcome = rt.block_on(dashboard.fetch_chart_data(request));
    dashboard.auto_refresh().shutdown();

    match outcome {
        FetchOutcome::Failed(e) => bail!("failed to fetch chart {}: {e}", config.chart_id),
        FetchOutcome::Discarded => bail!("chart {} was cleared", config.chart_id),
        FetchOutcome::Empty if !config.json => {
            println!("no data");
            return Ok(());
        }
        _ => {}
    }

    let Some(record) = dashboard.store().record(&config.chart_id) else {
        bail!("chart {} has no data", config.chart_id);
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        for point in record.data.iter() {
            println!("{}\t{}\t{}", point.date, point.category, point.value);
        }
    }

    Ok(())
}
