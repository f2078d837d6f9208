use std::path::PathBuf;
use std::process;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

use mt_sim::mt_config::parse_seed_hex;
use mt_sim::{
    run_scenario, station_count, AggregateReport, DelayReduction, ReportOptions, ScenarioConfig, ScenarioError,
    ThroughputReduction, TrafficPattern,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DelayArg {
    SumOfFlowMeans,
    WeightedMean,
}

/// Wireless stations behind an access point, a wired server, one traffic pattern
#[derive(Debug, Parser)]
#[command(name = "mixed_topology", version)]
struct Cli {
    /// Random-walk mobility for the wireless stations (0/1/true/false)
    #[arg(long, action = ArgAction::Set, value_parser = BoolishValueParser::new(), default_value_t = false)]
    mobility: bool,

    /// Number of wireless stations
    #[arg(long = "numNodes", default_value_t = 5, allow_negative_numbers = true)]
    num_nodes: i64,

    /// Traffic pattern: CBR, Burst or CBR_Burst
    #[arg(long, default_value = "CBR")]
    traffic: String,

    /// Walk speed of mobile stations, in units per second
    #[arg(long = "mobilitySpeed", default_value_t = 2.0)]
    mobility_speed: f64,

    /// 32-byte engine seed as hex (default: fixed seed)
    #[arg(long)]
    seed: Option<String>,

    /// Where to write the flow monitor records
    #[arg(long, default_value = "flowmonitor-results.yaml")]
    artifact: PathBuf,

    /// Also print the per-flow breakdown
    #[arg(long)]
    per_flow: bool,

    /// How per-flow delays are combined into the reported delay
    #[arg(long, value_enum, default_value_t = DelayArg::SumOfFlowMeans)]
    delay_reduction: DelayArg,

    /// Report throughput as rx bits over this many seconds
    #[arg(long)]
    throughput_window: Option<f64>,

    /// -v for info, -vv for debug logging
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Failed to initialise logging: {}", e);
    }

    match run(&cli) {
        Ok(report) => {
            print!("{}", report);
            if cli.per_flow {
                print!("\n{}", report.breakdown());
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<AggregateReport, ScenarioError> {
    let pattern: TrafficPattern = cli.traffic.parse()?;
    let mut config = ScenarioConfig::new(station_count(cli.num_nodes)?, cli.mobility, pattern);
    config.mobility_speed = cli.mobility_speed;
    if let Some(hex) = &cli.seed {
        config.seed = Some(parse_seed_hex(hex)?);
    }

    let options = ReportOptions {
        throughput: match cli.throughput_window {
            Some(seconds) if seconds > 0.0 => ThroughputReduction::OverWindow { seconds },
            Some(seconds) => {
                return Err(ScenarioError::InvalidConfiguration(format!(
                    "throughput window must be positive, got {}",
                    seconds
                )))
            }
            None => ThroughputReduction::AsRecorded,
        },
        delay: match cli.delay_reduction {
            DelayArg::SumOfFlowMeans => DelayReduction::SumOfFlowMeans,
            DelayArg::WeightedMean => DelayReduction::WeightedMean,
        },
    };

    info!(
        "numNodes={} mobility={} traffic={} artifact={}",
        config.num_wireless_stations,
        config.mobility,
        pattern,
        cli.artifact.display()
    );
    let outcome = run_scenario(&config, &options, Some(&cli.artifact))?;
    Ok(outcome.report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("mixed_topology").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();
        assert!(!cli.mobility);
        assert_eq!(cli.num_nodes, 5);
        assert_eq!(cli.traffic, "CBR");
        assert_eq!(cli.mobility_speed, 2.0);
        assert_eq!(cli.artifact, PathBuf::from("flowmonitor-results.yaml"));
        assert!(!cli.per_flow);
    }

    #[test]
    fn test_mobility_accepts_numeric_and_word_flags() {
        assert!(parse(&["--mobility", "1"]).unwrap().mobility);
        assert!(!parse(&["--mobility", "0"]).unwrap().mobility);
        assert!(parse(&["--mobility", "true"]).unwrap().mobility);
        assert!(!parse(&["--mobility=false"]).unwrap().mobility);
        assert!(parse(&["--mobility", "sometimes"]).is_err());
    }

    #[test]
    fn test_negative_node_count_parses_then_fails_validation() {
        let cli = parse(&["--numNodes", "-3"]).unwrap();
        assert_eq!(cli.num_nodes, -3);
        assert!(matches!(run(&cli), Err(ScenarioError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_bad_inputs_fail_before_running() {
        let cli = parse(&["--traffic", "Foo"]).unwrap();
        match run(&cli) {
            Err(ScenarioError::UnknownTrafficType(name)) => assert_eq!(name, "Foo"),
            other => panic!("expected UnknownTrafficType, got {:?}", other),
        }

        let cli = parse(&["--traffic", "Burst", "--numNodes", "1"]).unwrap();
        assert!(matches!(run(&cli), Err(ScenarioError::InsufficientNodes { .. })));

        let cli = parse(&["--throughput-window", "0"]).unwrap();
        assert!(matches!(run(&cli), Err(ScenarioError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_report_flags() {
        let cli = parse(&[
            "--delay-reduction",
            "weighted-mean",
            "--throughput-window",
            "8",
            "--per-flow",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.delay_reduction, DelayArg::WeightedMean));
        assert_eq!(cli.throughput_window, Some(8.0));
        assert!(cli.per_flow);
        assert_eq!(cli.verbose, 2);
    }
}
