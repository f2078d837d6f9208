use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::ops::{Add, Sub};

// all arena indices are plain usize newtypes so they can index the owning Vec directly
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct LinkId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct AppId(pub usize);

pub type FlowId = u32;

// ============================================================================
// Scenario constants
// ============================================================================

/// Virtual time at which the run is forcibly stopped
pub const SIMULATION_STOP: SimTime = SimTime::from_secs(10);

/// Active window shared by every traffic descriptor
pub const TRAFFIC_START: SimTime = SimTime::from_secs(2);
pub const TRAFFIC_STOP: SimTime = SimTime::from_secs(10);

/// Well-known UDP port of the server sink
pub const SERVER_PORT: u16 = 9;

pub const TRAFFIC_DATA_RATE_BPS: u64 = 10_000_000;
pub const TRAFFIC_PACKET_SIZE: u32 = 4096;

/// IPv4 + UDP header bytes added on top of the application payload
pub const IP_UDP_OVERHEAD_BYTES: u32 = 28;

pub const UDP_PROTOCOL: u8 = 17;

/// Source ports handed out to installed applications, in install order
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

// ============================================================================
// Virtual time
// ============================================================================

/// Virtual simulation time in nanoseconds
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs * 1_000_000_000)
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros * 1_000)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    /// Negative and non-finite inputs collapse to zero
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime((secs * 1e9).round() as u64)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }

    /// Time needed to serialize `bytes` onto a medium of `bits_per_second`, rounded up
    pub fn transmission(bytes: u32, bits_per_second: u64) -> SimTime {
        if bits_per_second == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = bytes as u128 * 8;
        let nanos = (bits * 1_000_000_000 + (bits_per_second as u128 - 1)) / bits_per_second as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

// ============================================================================
// Space
// ============================================================================

#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

// ============================================================================
// Traffic
// ============================================================================

/// Distribution of on/off period lengths, in seconds
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum TimeDistribution {
    Constant { seconds: f64 },
    Exponential { mean: f64 },
}

/// The two kinds of generator a traffic pattern is composed of
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum TrafficKind {
    Cbr,
    Burst,
}

impl TrafficKind {
    /// Station index this generator is bound to
    pub fn source_station(self) -> usize {
        match self {
            TrafficKind::Cbr => 0,
            TrafficKind::Burst => 1,
        }
    }

    pub fn on_time(self) -> TimeDistribution {
        match self {
            TrafficKind::Cbr => TimeDistribution::Constant { seconds: 1.0 },
            TrafficKind::Burst => TimeDistribution::Exponential { mean: 1.0 },
        }
    }

    pub fn off_time(self) -> TimeDistribution {
        match self {
            TrafficKind::Cbr => TimeDistribution::Constant { seconds: 0.0 },
            TrafficKind::Burst => TimeDistribution::Exponential { mean: 1.0 },
        }
    }
}

/// One on/off UDP generator bound to a station and the server sink
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct TrafficDescriptor {
    pub kind: TrafficKind,
    pub source: NodeId,
    pub source_station: usize,
    pub destination: SocketAddrV4,
    pub data_rate_bps: u64,
    pub packet_size: u32,
    pub on_time: TimeDistribution,
    pub off_time: TimeDistribution,
    pub start: SimTime,
    pub stop: SimTime,
}

// ============================================================================
// Flows
// ============================================================================

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct FiveTuple {
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub source_port: u16,
    pub destination: Ipv4Addr,
    pub destination_port: u16,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_port, self.destination, self.destination_port
        )
    }
}

/// Per-flow counters accumulated by the probe; they only ever grow
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub delay_sum: SimTime,
    pub jitter_sum: SimTime,
    pub times_forwarded: u64,
    pub time_first_tx: Option<SimTime>,
    pub time_last_tx: Option<SimTime>,
    pub time_first_rx: Option<SimTime>,
    pub time_last_rx: Option<SimTime>,
}

/// A flow as read back from the engine after the run
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct FlowRecord {
    pub flow_id: FlowId,
    pub five_tuple: FiveTuple,
    pub stats: FlowStats,
}
