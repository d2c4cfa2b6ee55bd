use backtrace::Backtrace;
use clap::Command;

mod cli;

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about("kpiboard fetches, caches and refreshes KPI chart data from a dashboard API.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(cli::templates::command())
        .subcommand(cli::chart::command())
        .subcommand(cli::watch::command())
        .get_matches();

    let result = match matches.subcommand() {
        Some(("templates", args)) => cli::templates::Config::try_from(args.clone())
            .map_err(anyhow::Error::msg)
            .and_then(cli::templates::run),
        Some(("chart", args)) => cli::chart::Config::try_from(args.clone())
            .map_err(anyhow::Error::msg)
            .and_then(cli::chart::run),
        Some(("watch", args)) => cli::watch::Config::try_from(args.clone())
            .map_err(anyhow::Error::msg)
            .and_then(cli::watch::run),
        _ => unreachable!("a subcommand is required"),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
