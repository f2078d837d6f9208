// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/cbr_static.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/cbr_static.yaml --seed 0x1234...

use mt_sim::mt_config::parse_seed_hex;
use mt_sim::{run_scenario, ReportOptions, ScenarioConfig};
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    /// Scenario metadata
    #[serde(default)]
    meta: ScenarioMeta,

    /// Scenario configuration; omitted keys take their defaults
    #[serde(default)]
    config: ScenarioConfig,

    /// Report reductions
    #[serde(default)]
    report: ReportOptions,

    /// Write the flow records next to the scenario file
    #[serde(default)]
    artifact: bool,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/cbr_static.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/cbr_static.yaml --seed 0x123456...", args[0]);
        std::process::exit(1);
    }

    if let Err(e) = SimpleLogger::new().with_level(log::LevelFilter::Warn).env().init() {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let path = Path::new(&args[1]);

    // Parse optional seed
    let seed: Option<[u8; 32]> = if args.len() >= 4 && args[2] == "--seed" {
        Some(parse_seed_hex(&args[3]).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }))
    } else {
        None
    };

    if path.is_file() {
        run_scenario_file(path, seed);
    } else if path.is_dir() {
        run_scenario_directory(path, seed);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, seed: Option<[u8; 32]>) {
    let mut scenarios: Vec<PathBuf> = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let extension = path.extension().and_then(|s| s.to_str());
            if extension == Some("yaml") || extension == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        run_scenario_file(scenario_path, seed);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
}

fn run_scenario_file(path: &Path, seed: Option<[u8; 32]>) {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let title = scenario
        .meta
        .name
        .clone()
        .unwrap_or_else(|| format!("Scenario: {}", path.file_stem().and_then(|s| s.to_str()).unwrap_or("?")));
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!(
        "║  {}{}║",
        title,
        " ".repeat(54_usize.saturating_sub(title.chars().count()))
    );
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc.trim_end());
    }

    let mut config = scenario.config;
    config.seed = seed;

    println!("Configuration:");
    println!("  Wireless stations: {}", config.num_wireless_stations);
    println!("  Traffic pattern: {}", config.traffic_pattern);
    if config.mobility {
        println!("  Mobility: random walk at {} units/s", config.mobility_speed);
    } else {
        println!("  Mobility: fixed grid");
    }
    println!("  Report: {:?}", scenario.report);
    println!("\nStarting simulation...\n");

    let artifact = scenario.artifact.then(|| path.with_extension("flows.yaml"));
    let outcome = run_scenario(&config, &scenario.report, artifact.as_deref()).unwrap_or_else(|e| {
        eprintln!("Scenario {} failed: {}", path.display(), e);
        std::process::exit(1);
    });

    print!("{}", outcome.report);
    println!();
    print!("{}", outcome.report.breakdown());
    println!(
        "\nEvents executed: {}, discarded at stop: {}",
        outcome.snapshot.run.events_executed, outcome.snapshot.run.events_discarded
    );
    if let Some(artifact) = artifact {
        println!("Flow records: {}", artifact.display());
    }

    println!("\n✓ Scenario complete!\n");
}
