//! Simulation engine capability
//!
//! The harness drives the kernel only through `SimulationEngine`, so a real
//! kernel, the in-memory kernel or a test double can be injected.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::Write;

use crate::mt_address::AddressPlan;
use crate::mt_error::EngineError;
use crate::mt_interface::{AppId, FlowRecord, SimTime, TrafficDescriptor};
use crate::mt_topology::Topology;

/// Events the harness may place on the engine's timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    StartApplication(AppId),
    StopApplication(AppId),
}

/// What happened during `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub events_executed: u64,
    /// Events still queued when the stop time was reached; never delivered
    pub events_discarded: usize,
    pub stopped_at: SimTime,
}

pub trait SimulationEngine {
    /// Current virtual time
    fn now(&self) -> SimTime;

    /// Queue `event` at absolute time `at`
    fn schedule(&mut self, at: SimTime, event: SimEvent) -> Result<(), EngineError>;

    /// Terminate the event loop at `at`, discarding whatever is still pending
    fn stop(&mut self, at: SimTime);

    /// Execute events in virtual-time order until stopped or drained
    fn run(&mut self) -> Result<RunSummary, EngineError>;

    /// Hand the node/link/device arena and its addressing to the kernel
    fn attach_network(&mut self, topology: &Topology, addresses: &AddressPlan) -> Result<(), EngineError>;

    /// Create a traffic source for `descriptor`; it stays idle until started
    fn install_application(&mut self, descriptor: &TrafficDescriptor) -> Result<AppId, EngineError>;

    /// Observe every flow on every node
    fn install_flow_probe(&mut self) -> Result<(), EngineError>;

    /// Per-flow counters gathered by the probe
    fn flow_records(&self) -> Result<Vec<FlowRecord>, EngineError>;

    /// Serialize the probe's record set in the engine's own format
    fn write_flow_records(&self, out: &mut dyn Write) -> Result<(), EngineError>;
}

// ============================================================================
// Event queue
// ============================================================================

struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // reversed so the max-heap pops the earliest event first
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue; events at the same time pop in insertion order
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    next_seq: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, at: SimTime, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { at, seq, event });
    }

    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        self.heap.pop().map(|s| (s.at, s.event))
    }

    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop everything still queued, returning how many events were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.heap.len();
        self.heap.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_orders_by_time() {
        let mut queue = EventQueue::new();
        queue.push(SimTime::from_secs(3), "c");
        queue.push(SimTime::from_secs(1), "a");
        queue.push(SimTime::from_secs(2), "b");

        assert_eq!(queue.peek_time(), Some(SimTime::from_secs(1)));
        let order: Vec<&str> = std::iter::from_fn(|| queue.pop().map(|(_, e)| e)).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_fifo_for_equal_times() {
        let mut queue = EventQueue::new();
        let t = SimTime::from_millis(5);
        for i in 0..10 {
            queue.push(t, i);
        }
        let order: Vec<i32> = std::iter::from_fn(|| queue.pop().map(|(_, e)| e)).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = EventQueue::new();
        queue.push(SimTime::from_secs(11), ());
        queue.push(SimTime::from_secs(12), ());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.pop(), None);
    }
}
