//! Run the engine to the horizon and read back per-flow statistics

use log::{info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::mt_engine::{RunSummary, SimulationEngine};
use crate::mt_error::{EngineError, ScenarioError};
use crate::mt_interface::{FlowId, FlowRecord, SimTime, SIMULATION_STOP};

/// Per-flow records as read back after the run, no reduction applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowStatsSnapshot {
    pub flows: BTreeMap<FlowId, FlowRecord>,
    pub run: RunSummary,
    /// Length of the simulated run
    pub horizon: SimTime,
}

impl FlowStatsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &FlowRecord> {
        self.flows.values()
    }
}

pub struct FlowStatsCollector {
    stop_at: SimTime,
}

impl Default for FlowStatsCollector {
    fn default() -> Self {
        Self::new(SIMULATION_STOP)
    }
}

impl FlowStatsCollector {
    pub fn new(stop_at: SimTime) -> Self {
        Self { stop_at }
    }

    /// Install the global probe, run until `stop_at` and collect every flow
    pub fn collect<E: SimulationEngine + ?Sized>(&self, engine: &mut E) -> Result<FlowStatsSnapshot, ScenarioError> {
        engine.install_flow_probe()?;
        engine.stop(self.stop_at);
        let run = engine.run()?;

        let flows: BTreeMap<FlowId, FlowRecord> = engine
            .flow_records()?
            .into_iter()
            .map(|record| (record.flow_id, record))
            .collect();

        if flows.is_empty() {
            warn!("No flows detected by the flow probe");
        }
        info!(
            "Collected {} flow(s) at {} ({} events, {} discarded)",
            flows.len(),
            run.stopped_at,
            run.events_executed,
            run.events_discarded
        );

        Ok(FlowStatsSnapshot {
            flows,
            run,
            horizon: self.stop_at,
        })
    }
}

/// Write the engine's serialized record set to `path` as-is
pub fn write_artifact<E: SimulationEngine + ?Sized>(engine: &E, path: &Path) -> Result<(), EngineError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    engine.write_flow_records(&mut out)?;
    info!("Flow records written to {}", path.display());
    Ok(())
}
