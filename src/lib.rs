//! # mt_sim - Mixed wireless/wired scenario harness
//!
//! Builds a single network scenario with a wireless access segment (stations
//! plus an access point) bridged onto a wired backbone (access point plus a
//! server), drives synthetic UDP traffic under a selectable pattern and reduces
//! the per-flow telemetry into aggregate throughput, loss and delay.
//!
//! ## Core Components
//!
//! - **TopologyBuilder**: node, link and device arenas with station placement
//! - **AddressPlanner**: two disjoint IPv4 blocks, one per segment
//! - **TrafficScheduler**: CBR, Burst or CBR_Burst on/off sources
//! - **FlowStatsCollector**: global flow probe, run to the stop time, read back
//! - **ReportAggregator**: the five aggregate metrics and an optional per-flow breakdown
//!
//! The harness reaches the simulation kernel only through the
//! [`SimulationEngine`] trait. [`MemoryEngine`] is the bundled in-memory kernel.
//!
//! ```no_run
//! use mt_sim::{run_scenario, ReportOptions, ScenarioConfig, TrafficPattern};
//!
//! let config = ScenarioConfig::new(5, false, TrafficPattern::CbrBurst);
//! let outcome = run_scenario(&config, &ReportOptions::default(), None).unwrap();
//! print!("{}", outcome.report);
//! ```

// Shared types and configuration
pub mod mt_config;
pub mod mt_error;
pub mod mt_interface;

// Scenario construction
pub mod mt_address;
pub mod mt_topology;
pub mod mt_traffic;

// Engine capability and the in-memory kernel
pub mod mt_engine;
pub mod mt_flow_monitor;
pub mod mt_memory_engine;
pub mod mt_mobility;
pub mod mt_onoff;

// Execution and reduction
pub mod mt_flow_stats;
pub mod mt_report;
pub mod mt_scenario;

pub use mt_config::{
    station_count, DelayReduction, MobilityPolicy, ReportOptions, ScenarioConfig, ThroughputReduction, TrafficPattern,
};
pub use mt_engine::{RunSummary, SimEvent, SimulationEngine};
pub use mt_error::{EngineError, ScenarioError};
pub use mt_interface::{FlowRecord, FlowStats, SimTime, TrafficDescriptor};
pub use mt_memory_engine::MemoryEngine;
pub use mt_report::{AggregateReport, ReportAggregator};
pub use mt_scenario::{prepare, run_scenario, PreparedScenario, ScenarioOutcome};
