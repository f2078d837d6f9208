//! End-to-end scenario pipeline
//!
//! `prepare` builds topology, addressing and traffic without touching an
//! engine, so every configuration fault surfaces before anything runs.
//! `execute` then drives a `SimulationEngine` through attach, install, run
//! and readback, and reduces the result into the aggregate report.

use log::info;
use std::path::Path;

use crate::mt_address::{AddressPlan, AddressPlanner};
use crate::mt_config::{ReportOptions, ScenarioConfig};
use crate::mt_engine::SimulationEngine;
use crate::mt_error::ScenarioError;
use crate::mt_flow_stats::{write_artifact, FlowStatsCollector, FlowStatsSnapshot};
use crate::mt_interface::{TrafficDescriptor, SIMULATION_STOP};
use crate::mt_memory_engine::MemoryEngine;
use crate::mt_report::{AggregateReport, ReportAggregator};
use crate::mt_topology::{Topology, TopologyBuilder};
use crate::mt_traffic::TrafficScheduler;

/// Everything built ahead of execution; immutable from here on
#[derive(Debug, Clone)]
pub struct PreparedScenario {
    pub config: ScenarioConfig,
    pub topology: Topology,
    pub addresses: AddressPlan,
    pub descriptors: Vec<TrafficDescriptor>,
}

/// Result of one executed scenario
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub snapshot: FlowStatsSnapshot,
    pub report: AggregateReport,
}

pub fn prepare(config: &ScenarioConfig) -> Result<PreparedScenario, ScenarioError> {
    let topology = TopologyBuilder::new(config).build()?;
    let addresses = AddressPlanner::default().plan(&topology)?;
    let descriptors = TrafficScheduler::plan(config.traffic_pattern, &topology, &addresses)?;

    Ok(PreparedScenario {
        config: config.clone(),
        topology,
        addresses,
        descriptors,
    })
}

impl PreparedScenario {
    pub fn execute<E: SimulationEngine + ?Sized>(
        &self,
        engine: &mut E,
        options: &ReportOptions,
    ) -> Result<ScenarioOutcome, ScenarioError> {
        info!(
            "Starting simulation: {} station(s), pattern {}, mobility {}",
            self.config.num_wireless_stations, self.config.traffic_pattern, self.config.mobility
        );

        engine.attach_network(&self.topology, &self.addresses)?;
        TrafficScheduler::install(&self.descriptors, engine)?;

        let snapshot = FlowStatsCollector::new(SIMULATION_STOP).collect(engine)?;
        let report = ReportAggregator::new(*options).aggregate(&snapshot);
        Ok(ScenarioOutcome { snapshot, report })
    }
}

/// Prepare and execute on a fresh `MemoryEngine`, optionally dumping the flow records
pub fn run_scenario(
    config: &ScenarioConfig,
    options: &ReportOptions,
    artifact: Option<&Path>,
) -> Result<ScenarioOutcome, ScenarioError> {
    let prepared = prepare(config)?;
    let mut engine = MemoryEngine::new(config.resolve_seed());
    let outcome = prepared.execute(&mut engine, options)?;
    if let Some(path) = artifact {
        write_artifact(&engine, path)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mt_config::TrafficPattern;
    use crate::mt_engine::{RunSummary, SimEvent};
    use crate::mt_error::EngineError;
    use crate::mt_interface::{AppId, FlowRecord, NodeId, SimTime};
    use std::io::Write;

    /// Engine double that only records the calls it receives
    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<String>,
        now: SimTime,
        apps: usize,
    }

    impl SimulationEngine for RecordingEngine {
        fn now(&self) -> SimTime {
            self.now
        }

        fn schedule(&mut self, at: SimTime, event: SimEvent) -> Result<(), EngineError> {
            self.calls.push(format!("schedule {:?} at {}", event, at));
            Ok(())
        }

        fn stop(&mut self, at: SimTime) {
            self.calls.push(format!("stop at {}", at));
        }

        fn run(&mut self) -> Result<RunSummary, EngineError> {
            self.calls.push("run".into());
            self.now = SIMULATION_STOP;
            Ok(RunSummary {
                stopped_at: self.now,
                ..Default::default()
            })
        }

        fn attach_network(&mut self, topology: &Topology, _addresses: &AddressPlan) -> Result<(), EngineError> {
            self.calls.push(format!("attach {} nodes", topology.nodes().len()));
            Ok(())
        }

        fn install_application(&mut self, descriptor: &TrafficDescriptor) -> Result<AppId, EngineError> {
            self.calls.push(format!("install {:?}", descriptor.kind));
            self.apps += 1;
            Ok(AppId(self.apps - 1))
        }

        fn install_flow_probe(&mut self) -> Result<(), EngineError> {
            self.calls.push("probe".into());
            Ok(())
        }

        fn flow_records(&self) -> Result<Vec<FlowRecord>, EngineError> {
            Ok(Vec::new())
        }

        fn write_flow_records(&self, _out: &mut dyn Write) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[test]
    fn test_call_order() {
        let config = ScenarioConfig::new(5, false, TrafficPattern::Cbr);
        let mut engine = RecordingEngine::default();
        let outcome = prepare(&config)
            .unwrap()
            .execute(&mut engine, &ReportOptions::default())
            .unwrap();

        assert_eq!(
            engine.calls,
            vec![
                "attach 7 nodes",
                "install Cbr",
                "schedule StartApplication(AppId(0)) at 2.000000s",
                "schedule StopApplication(AppId(0)) at 10.000000s",
                "probe",
                "stop at 10.000000s",
                "run",
            ]
        );
        assert!(outcome.snapshot.is_empty());
        assert_eq!(outcome.report.total_tx, 0);
    }

    #[test]
    fn test_burst_with_one_station_fails_before_engine() {
        let config = ScenarioConfig::new(1, false, TrafficPattern::Burst);
        let mut engine = RecordingEngine::default();
        let result = prepare(&config).and_then(|p| p.execute(&mut engine, &ReportOptions::default()));

        match result {
            Err(ScenarioError::InsufficientNodes {
                pattern,
                required,
                available,
            }) => {
                assert_eq!(pattern, "Burst");
                assert_eq!((required, available), (1, 1));
            }
            other => panic!("expected InsufficientNodes, got {:?}", other.map(|o| o.report)),
        }
        assert!(engine.calls.is_empty(), "engine touched: {:?}", engine.calls);
    }

    #[test]
    fn test_fixed_cbr_scenario_end_to_end() {
        let config = ScenarioConfig::new(5, false, TrafficPattern::Cbr);
        let outcome = run_scenario(&config, &ReportOptions::default(), None).unwrap();
        let report = &outcome.report;

        assert_eq!(report.flows.len(), 1);
        assert!(report.total_tx > 0);
        assert!(report.total_rx > 0);
        assert!(report.total_rx <= report.total_tx);
        assert_eq!(report.total_lost, report.total_tx as i64 - report.total_rx as i64);
        assert!(report.total_throughput_mbps > 0.0);
        assert!(report.total_delay_seconds > 0.0);

        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Total Tx Packets: "));
        assert!(lines[3].ends_with(" Mbps"));
        assert!(lines[4].starts_with("Average Delay: "));
    }

    #[test]
    fn test_mobile_cbr_burst_keeps_stations_in_bounds() {
        let config = ScenarioConfig::new(5, true, TrafficPattern::CbrBurst);
        let prepared = prepare(&config).unwrap();
        assert_eq!(prepared.descriptors.len(), 2);

        let mut engine = MemoryEngine::new(config.resolve_seed());
        let outcome = prepared.execute(&mut engine, &ReportOptions::default()).unwrap();
        assert!(outcome.snapshot.flows.len() <= 2);

        assert!(!engine.course_changes().is_empty());
        for change in engine.course_changes() {
            assert!(config.walk_bounds.contains(&change.position));
        }
        for k in 0..5 {
            let position = engine.position_of(NodeId(k)).unwrap();
            assert!(config.walk_bounds.contains(&position));
        }
    }

    #[test]
    fn test_fixed_runs_are_deterministic() {
        for pattern in TrafficPattern::ALL {
            let config = ScenarioConfig::new(5, false, pattern);
            let a = run_scenario(&config, &ReportOptions::default(), None).unwrap();
            let b = run_scenario(&config, &ReportOptions::default(), None).unwrap();
            assert_eq!(a.report, b.report, "{} differs between runs", pattern);
            assert_eq!(a.snapshot, b.snapshot);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ScenarioConfig::new(3, true, TrafficPattern::Cbr);
        config.mobility_speed = -1.0;
        assert!(matches!(prepare(&config), Err(ScenarioError::InvalidConfiguration(_))));
    }
}
