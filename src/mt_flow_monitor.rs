//! Global flow probe
//!
//! Classifies every IPv4 packet the kernel carries into a five-tuple flow and
//! accumulates per-flow counters. Flow ids are handed out in first-seen order
//! starting at 1 and stay stable for the whole run.

use hashbrown::HashMap;
use indexmap::IndexMap;
use log::trace;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::mt_error::EngineError;
use crate::mt_interface::{FiveTuple, FlowId, FlowRecord, FlowStats, SimTime};

/// Why the kernel discarded a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DropReason {
    QueueFull,
    OutOfRange,
    NoRoute,
}

/// Maps five-tuples to flow ids
#[derive(Debug, Default)]
pub struct FlowClassifier {
    flows: IndexMap<FiveTuple, FlowId>,
}

impl FlowClassifier {
    /// Returns the flow id and whether the flow was seen for the first time
    pub fn classify(&mut self, tuple: FiveTuple) -> (FlowId, bool) {
        let next = self.flows.len() as FlowId + 1;
        match self.flows.get(&tuple) {
            Some(&id) => (id, false),
            None => {
                self.flows.insert(tuple, next);
                (next, true)
            }
        }
    }

    pub fn find_flow(&self, id: FlowId) -> Option<FiveTuple> {
        // ids follow insertion order
        self.flows
            .get_index(id.checked_sub(1)? as usize)
            .map(|(tuple, _)| *tuple)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

/// A packet between its first transmission and its delivery or drop
#[derive(Debug, Clone, Copy)]
struct TrackedPacket {
    flow: FlowId,
    sent_at: SimTime,
}

#[derive(Debug, Default)]
pub struct FlowMonitor {
    classifier: FlowClassifier,
    stats: BTreeMap<FlowId, FlowStats>,
    drops: BTreeMap<FlowId, BTreeMap<DropReason, u64>>,
    last_delay: HashMap<FlowId, SimTime>,
    tracked: HashMap<u64, TrackedPacket>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packet `uid` leaves its originating IP layer
    pub fn report_tx(&mut self, now: SimTime, uid: u64, tuple: FiveTuple, bytes: u32) {
        let (flow, new) = self.classifier.classify(tuple);
        if new {
            trace!("flow {} first seen: {}", flow, tuple);
        }

        let stats = self.stats.entry(flow).or_default();
        stats.tx_packets += 1;
        stats.tx_bytes += bytes as u64;
        stats.time_first_tx.get_or_insert(now);
        stats.time_last_tx = Some(now);

        self.tracked.insert(uid, TrackedPacket { flow, sent_at: now });
    }

    /// Packet `uid` was forwarded by an intermediate node
    pub fn report_forward(&mut self, uid: u64) {
        if let Some(tracked) = self.tracked.get(&uid) {
            if let Some(stats) = self.stats.get_mut(&tracked.flow) {
                stats.times_forwarded += 1;
            }
        }
    }

    /// Packet `uid` reached its destination IP layer
    pub fn report_rx(&mut self, now: SimTime, uid: u64, bytes: u32) {
        let Some(tracked) = self.tracked.remove(&uid) else {
            return;
        };
        let Some(stats) = self.stats.get_mut(&tracked.flow) else {
            return;
        };

        let delay = now - tracked.sent_at;
        stats.rx_packets += 1;
        stats.rx_bytes += bytes as u64;
        stats.delay_sum = stats.delay_sum + delay;
        stats.time_first_rx.get_or_insert(now);
        stats.time_last_rx = Some(now);

        if let Some(previous) = self.last_delay.insert(tracked.flow, delay) {
            let variation = if delay > previous { delay - previous } else { previous - delay };
            stats.jitter_sum = stats.jitter_sum + variation;
        }
    }

    /// Packet `uid` was discarded inside the network
    pub fn report_drop(&mut self, uid: u64, reason: DropReason) {
        let Some(tracked) = self.tracked.remove(&uid) else {
            return;
        };
        if let Some(stats) = self.stats.get_mut(&tracked.flow) {
            stats.lost_packets += 1;
        }
        *self
            .drops
            .entry(tracked.flow)
            .or_default()
            .entry(reason)
            .or_insert(0) += 1;
    }

    /// Packets sent but neither delivered nor dropped yet
    pub fn in_flight(&self) -> usize {
        self.tracked.len()
    }

    pub fn drops(&self, flow: FlowId) -> Option<&BTreeMap<DropReason, u64>> {
        self.drops.get(&flow)
    }

    pub fn records(&self) -> Vec<FlowRecord> {
        self.stats
            .iter()
            .filter_map(|(&flow_id, stats)| {
                Some(FlowRecord {
                    flow_id,
                    five_tuple: self.classifier.find_flow(flow_id)?,
                    stats: stats.clone(),
                })
            })
            .collect()
    }

    /// Dump the full record set, drop breakdown included, as YAML
    pub fn write_yaml(&self, out: &mut dyn Write) -> Result<(), EngineError> {
        let records = self.records();
        let dump = FlowMonitorDump {
            flows: records
                .iter()
                .map(|record| FlowDump {
                    record,
                    packets_dropped: self.drops.get(&record.flow_id).cloned().unwrap_or_default(),
                })
                .collect(),
            packets_in_flight: self.in_flight(),
        };
        serde_yaml::to_writer(&mut *out, &dump)?;
        out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct FlowMonitorDump<'a> {
    flows: Vec<FlowDump<'a>>,
    packets_in_flight: usize,
}

#[derive(Serialize)]
struct FlowDump<'a> {
    #[serde(flatten)]
    record: &'a FlowRecord,
    packets_dropped: BTreeMap<DropReason, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tuple(src_last: u8, port: u16) -> FiveTuple {
        FiveTuple {
            protocol: 17,
            source: Ipv4Addr::new(192, 168, 0, src_last),
            source_port: port,
            destination: Ipv4Addr::new(10, 1, 1, 2),
            destination_port: 9,
        }
    }

    #[test]
    fn test_classifier_ids_stable_and_ordered() {
        let mut classifier = FlowClassifier::default();
        assert_eq!(classifier.classify(tuple(1, 49153)), (1, true));
        assert_eq!(classifier.classify(tuple(2, 49154)), (2, true));
        assert_eq!(classifier.classify(tuple(1, 49153)), (1, false));
        assert_eq!(classifier.find_flow(2), Some(tuple(2, 49154)));
        assert_eq!(classifier.find_flow(0), None);
        assert_eq!(classifier.find_flow(3), None);
    }

    #[test]
    fn test_counters_delay_and_jitter() {
        let mut monitor = FlowMonitor::new();
        let t = tuple(1, 49153);

        monitor.report_tx(SimTime::from_millis(0), 1, t, 100);
        monitor.report_tx(SimTime::from_millis(10), 2, t, 100);
        monitor.report_tx(SimTime::from_millis(20), 3, t, 100);
        monitor.report_forward(1);
        monitor.report_rx(SimTime::from_millis(3), 1, 100);
        monitor.report_rx(SimTime::from_millis(15), 2, 100);
        monitor.report_drop(3, DropReason::QueueFull);

        let records = monitor.records();
        assert_eq!(records.len(), 1);
        let stats = &records[0].stats;
        assert_eq!(stats.tx_packets, 3);
        assert_eq!(stats.tx_bytes, 300);
        assert_eq!(stats.rx_packets, 2);
        assert_eq!(stats.rx_bytes, 200);
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.times_forwarded, 1);
        assert_eq!(stats.delay_sum, SimTime::from_millis(8));
        assert_eq!(stats.jitter_sum, SimTime::from_millis(2));
        assert_eq!(stats.time_first_rx, Some(SimTime::from_millis(3)));
        assert_eq!(monitor.in_flight(), 0);
        assert_eq!(monitor.drops(1).unwrap()[&DropReason::QueueFull], 1);
    }

    #[test]
    fn test_unknown_uid_ignored() {
        let mut monitor = FlowMonitor::new();
        monitor.report_rx(SimTime::from_secs(1), 42, 100);
        monitor.report_drop(42, DropReason::NoRoute);
        assert!(monitor.records().is_empty());
    }

    #[test]
    fn test_yaml_dump_contains_flows() {
        let mut monitor = FlowMonitor::new();
        monitor.report_tx(SimTime::ZERO, 1, tuple(1, 49153), 4124);
        monitor.report_rx(SimTime::from_millis(4), 1, 4124);
        monitor.report_tx(SimTime::from_millis(5), 2, tuple(1, 49153), 4124);

        let mut out = Vec::new();
        monitor.write_yaml(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("flow_id: 1"));
        assert!(text.contains("rx_packets: 1"));
        assert!(text.contains("packets_in_flight: 1"));
    }
}
