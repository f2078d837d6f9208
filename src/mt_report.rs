//! Reduction of per-flow records into the aggregate report

use log::{debug, warn};
use std::fmt;
use std::net::Ipv4Addr;

use crate::mt_config::{DelayReduction, ReportOptions, ThroughputReduction};
use crate::mt_flow_stats::FlowStatsSnapshot;
use crate::mt_interface::{FlowId, FlowRecord, SimTime};

/// One flow's line in the breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSummary {
    pub flow_id: FlowId,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub tx_packets: u64,
    pub rx_packets: u64,
    /// rx bits over the horizon, in Mbps
    pub throughput_mbps: f64,
    /// None when nothing was received
    pub mean_delay_seconds: Option<f64>,
    pub lost_packets: u64,
}

impl FlowSummary {
    fn from_record(record: &FlowRecord, horizon: SimTime) -> Self {
        let stats = &record.stats;
        let seconds = horizon.as_secs_f64();
        let throughput_mbps = if stats.rx_packets > 0 && seconds > 0.0 {
            stats.rx_bytes as f64 * 8.0 / seconds / 1e6
        } else {
            0.0
        };
        Self {
            flow_id: record.flow_id,
            source: record.five_tuple.source,
            destination: record.five_tuple.destination,
            tx_packets: stats.tx_packets,
            rx_packets: stats.rx_packets,
            throughput_mbps,
            mean_delay_seconds: mean_delay(record),
            lost_packets: stats.lost_packets,
        }
    }
}

impl fmt::Display for FlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flow {} ({} -> {})", self.flow_id, self.source, self.destination)?;
        writeln!(f, "  Tx Packets: {}", self.tx_packets)?;
        writeln!(f, "  Rx Packets: {}", self.rx_packets)?;
        writeln!(f, "  Throughput: {} Mbps", self.throughput_mbps)?;
        match self.mean_delay_seconds {
            Some(delay) => writeln!(f, "  Mean Delay: {} s", delay)?,
            None => writeln!(f, "  Mean Delay: N/A (no packets received)")?,
        }
        writeln!(f, "  Lost Packets: {}", self.lost_packets)
    }
}

/// Aggregate metrics over every flow the probe saw
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateReport {
    pub total_tx: u64,
    pub total_rx: u64,
    /// Σ (tx - rx); negative if a flow reports more receptions than transmissions
    pub total_lost: i64,
    pub total_throughput_mbps: f64,
    pub total_delay_seconds: f64,
    pub flows: Vec<FlowSummary>,
}

impl AggregateReport {
    /// Per-flow breakdown, one block per flow
    pub fn breakdown(&self) -> String {
        let mut out = format!("Flows Monitored: {}\n", self.flows.len());
        for flow in &self.flows {
            out.push_str(&flow.to_string());
        }
        out
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Tx Packets: {}", self.total_tx)?;
        writeln!(f, "Total Rx Packets: {}", self.total_rx)?;
        writeln!(f, "Total Packet Loss: {}", self.total_lost)?;
        writeln!(f, "Total Throughput: {} Mbps", self.total_throughput_mbps)?;
        writeln!(f, "Average Delay: {} s", self.total_delay_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator {
    options: ReportOptions,
}

impl ReportAggregator {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn aggregate(&self, snapshot: &FlowStatsSnapshot) -> AggregateReport {
        if snapshot.is_empty() {
            warn!("No flows to aggregate; every total is zero");
        }

        let mut report = AggregateReport::default();
        let mut rx_bytes = 0u64;
        let mut delay_sum = 0.0f64;

        for record in snapshot.records() {
            let stats = &record.stats;
            report.total_tx += stats.tx_packets;
            report.total_rx += stats.rx_packets;
            report.total_lost += stats.tx_packets as i64 - stats.rx_packets as i64;
            rx_bytes += stats.rx_bytes;
            delay_sum += stats.delay_sum.as_secs_f64();

            if let DelayReduction::SumOfFlowMeans = self.options.delay {
                if let Some(mean) = mean_delay(record) {
                    report.total_delay_seconds += mean;
                }
            }
            report.flows.push(FlowSummary::from_record(record, snapshot.horizon));
        }

        report.total_throughput_mbps = match self.options.throughput {
            // bits, then the fixed 8e6 divisor
            ThroughputReduction::AsRecorded => rx_bytes as f64 * 8.0 / (8.0 * 1e6),
            ThroughputReduction::OverWindow { seconds } if seconds > 0.0 => rx_bytes as f64 * 8.0 / seconds / 1e6,
            ThroughputReduction::OverWindow { .. } => 0.0,
        };

        if let DelayReduction::WeightedMean = self.options.delay {
            if report.total_rx > 0 {
                report.total_delay_seconds = delay_sum / report.total_rx as f64;
            }
        }

        debug!(
            "Aggregated {} flow(s) with {:?}: {:?}",
            report.flows.len(),
            self.options,
            (report.total_tx, report.total_rx, report.total_lost)
        );
        report
    }
}

fn mean_delay(record: &FlowRecord) -> Option<f64> {
    let stats = &record.stats;
    (stats.rx_packets > 0).then(|| stats.delay_sum.as_secs_f64() / stats.rx_packets as f64)
}
