//! Typed scenario configuration
//!
//! Every configurable subsystem is a struct or tagged enum resolved at
//! construction time. Defaults describe the stock scenario: 5 stations,
//! no mobility, CBR traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::mt_error::ScenarioError;
use crate::mt_interface::{Position, SimTime, TrafficKind};

/// Seed used when none is given, so repeated invocations are reproducible
pub const DEFAULT_SEED: [u8; 32] = [1u8; 32];

// ============================================================================
// Main Configuration
// ============================================================================

/// The sole external input of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Number of wireless stations
    pub num_wireless_stations: u32,

    /// Stations random-walk instead of sitting on the grid
    pub mobility: bool,

    /// Which generators to install
    pub traffic_pattern: TrafficPattern,

    /// Walk speed in units per second
    pub mobility_speed: f64,

    /// Engine RNG seed (None = DEFAULT_SEED)
    #[serde(skip)]
    pub seed: Option<[u8; 32]>,

    /// Static placement of stations
    pub grid: GridLayout,

    /// Region the random walk is confined to
    pub walk_bounds: Bounds,

    /// Distance a walker covers before it draws a new heading
    pub walk_change_distance: f64,

    /// Stationary access point position; None places it by mobility mode
    pub access_point: Option<Position>,

    pub wifi: WifiConfig,
    pub csma: CsmaConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            num_wireless_stations: 5,
            mobility: false,
            traffic_pattern: TrafficPattern::Cbr,
            mobility_speed: 2.0,
            seed: None,
            grid: GridLayout::default(),
            walk_bounds: Bounds::default(),
            walk_change_distance: 1.0,
            access_point: None,
            wifi: WifiConfig::default(),
            csma: CsmaConfig::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn new(num_wireless_stations: u32, mobility: bool, traffic_pattern: TrafficPattern) -> Self {
        Self {
            num_wireless_stations,
            mobility,
            traffic_pattern,
            ..Default::default()
        }
    }

    /// Get the configured seed or the fixed default
    pub fn resolve_seed(&self) -> [u8; 32] {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    /// Resolve the boolean mobility switch into the typed placement policy
    pub fn mobility_policy(&self) -> MobilityPolicy {
        if self.mobility {
            MobilityPolicy::RandomWalk {
                bounds: self.walk_bounds,
                speed: self.mobility_speed,
                change_distance: self.walk_change_distance,
                start: Position::default(),
            }
        } else {
            MobilityPolicy::Fixed { grid: self.grid }
        }
    }

    /// Where the access point sits for the whole run
    ///
    /// Without an explicit position the AP takes the grid slot after the
    /// last station when stations are fixed, and the walkers' origin
    /// when they walk.
    pub fn access_point_position(&self) -> Position {
        if let Some(position) = self.access_point {
            return position;
        }
        match self.mobility_policy() {
            MobilityPolicy::Fixed { grid } => grid.position(self.num_wireless_stations as usize),
            MobilityPolicy::RandomWalk { start, .. } => start,
        }
    }

    /// Boundary checks for values the type system does not rule out
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.grid.width == 0 {
            return Err(invalid("grid width must be at least 1"));
        }
        if !self.grid.delta_x.is_finite() || !self.grid.delta_y.is_finite() {
            return Err(invalid("grid spacing must be finite"));
        }
        if !self.walk_bounds.is_valid() {
            return Err(invalid(format!("walk bounds {:?} are empty", self.walk_bounds)));
        }
        if self.mobility {
            if !self.mobility_speed.is_finite() || self.mobility_speed <= 0.0 {
                return Err(invalid(format!(
                    "mobility speed must be positive, got {}",
                    self.mobility_speed
                )));
            }
            if !self.walk_change_distance.is_finite() || self.walk_change_distance <= 0.0 {
                return Err(invalid("walk change distance must be positive"));
            }
        }
        if self.wifi.range <= 0.0 || !self.wifi.range.is_finite() {
            return Err(invalid("wifi range must be positive"));
        }
        if self.wifi.queue_packets == 0 || self.csma.queue_packets == 0 {
            return Err(invalid("device queues need room for at least one packet"));
        }
        if self.csma.data_rate_bps == 0 {
            return Err(invalid("wired data rate must be positive"));
        }
        Ok(())
    }
}

/// Convert a raw station count taken at the process boundary
pub fn station_count(raw: i64) -> Result<u32, ScenarioError> {
    u32::try_from(raw).map_err(|_| invalid(format!("number of nodes must be non-negative, got {}", raw)))
}

/// Parse a hex seed, optionally `0x`-prefixed; short input is zero-padded on the right
pub fn parse_seed_hex(hex: &str) -> Result<[u8; 32], ScenarioError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.len() > 64 || digits.len() % 2 != 0 {
        return Err(invalid(format!("seed must be an even number of hex digits, at most 64: {}", hex)));
    }

    let mut seed = [0u8; 32];
    for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
        let byte = std::str::from_utf8(chunk)
            .ok()
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| invalid(format!("invalid hex seed: {}", hex)))?;
        seed[i] = byte;
    }
    Ok(seed)
}

fn invalid(message: impl Into<String>) -> ScenarioError {
    ScenarioError::InvalidConfiguration(message.into())
}

// ============================================================================
// Traffic Pattern
// ============================================================================

/// Traffic selector; unrecognized names are rejected at parse time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TrafficPattern {
    #[default]
    Cbr,
    Burst,
    CbrBurst,
}

impl TrafficPattern {
    pub const ALL: [TrafficPattern; 3] = [TrafficPattern::Cbr, TrafficPattern::Burst, TrafficPattern::CbrBurst];

    /// Generators this pattern is made of, in install order
    pub fn components(self) -> &'static [TrafficKind] {
        match self {
            TrafficPattern::Cbr => &[TrafficKind::Cbr],
            TrafficPattern::Burst => &[TrafficKind::Burst],
            TrafficPattern::CbrBurst => &[TrafficKind::Cbr, TrafficKind::Burst],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TrafficPattern::Cbr => "CBR",
            TrafficPattern::Burst => "Burst",
            TrafficPattern::CbrBurst => "CBR_Burst",
        }
    }
}

impl FromStr for TrafficPattern {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CBR" => Ok(TrafficPattern::Cbr),
            "Burst" => Ok(TrafficPattern::Burst),
            "CBR_Burst" => Ok(TrafficPattern::CbrBurst),
            other => Err(ScenarioError::UnknownTrafficType(other.to_string())),
        }
    }
}

impl TryFrom<String> for TrafficPattern {
    type Error = ScenarioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TrafficPattern> for String {
    fn from(pattern: TrafficPattern) -> Self {
        pattern.name().to_string()
    }
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Mobility
// ============================================================================

/// Placement policy of the wireless stations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MobilityPolicy {
    /// Stations stay on a row-major grid
    Fixed { grid: GridLayout },

    /// Stations start together at `start` and random-walk inside `bounds`
    RandomWalk {
        bounds: Bounds,
        speed: f64,
        change_distance: f64,
        start: Position,
    },
}

/// Row-major grid placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Positions per row
    pub width: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 10.0,
            delta_y: 10.0,
            width: 3,
        }
    }
}

impl GridLayout {
    /// Position of the i-th slot: ((i mod width)*dx, floor(i/width)*dy) from the origin
    pub fn position(&self, index: usize) -> Position {
        let width = self.width.max(1) as usize;
        Position::new(
            self.min_x + (index % width) as f64 * self.delta_x,
            self.min_y + (index / width) as f64 * self.delta_y,
        )
    }
}

/// Axis-aligned rectangle, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            x_min: -50.0,
            x_max: 50.0,
            y_min: -50.0,
            y_max: 50.0,
        }
    }
}

impl Bounds {
    pub fn is_valid(&self) -> bool {
        [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite())
            && self.x_min < self.x_max
            && self.y_min < self.y_max
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    pub fn clamp(&self, p: Position) -> Position {
        Position::new(p.x.clamp(self.x_min, self.x_max), p.y.clamp(self.y_min, self.y_max))
    }
}

// ============================================================================
// Media
// ============================================================================

/// HT modulation and coding schemes, 20 MHz channel, long guard interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtMcs {
    HtMcs0,
    HtMcs1,
    HtMcs2,
    HtMcs3,
    HtMcs4,
    HtMcs5,
    HtMcs6,
    HtMcs7,
}

impl HtMcs {
    pub fn rate_bps(self) -> u64 {
        match self {
            HtMcs::HtMcs0 => 6_500_000,
            HtMcs::HtMcs1 => 13_000_000,
            HtMcs::HtMcs2 => 19_500_000,
            HtMcs::HtMcs3 => 26_000_000,
            HtMcs::HtMcs4 => 39_000_000,
            HtMcs::HtMcs5 => 52_000_000,
            HtMcs::HtMcs6 => 58_500_000,
            HtMcs::HtMcs7 => 65_000_000,
        }
    }
}

/// Wireless infrastructure medium with a constant-rate station manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub data_mode: HtMcs,
    pub control_mode: HtMcs,
    pub slot_us: u64,
    pub sifs_us: u64,
    pub preamble_us: u64,
    pub cw_min: u32,
    /// MAC header, LLC/SNAP and FCS bytes per data frame
    pub mac_overhead_bytes: u32,
    pub ack_bytes: u32,
    /// Maximum sender/receiver distance for a frame to be received
    pub range: f64,
    /// Drop-tail MAC queue capacity per device
    pub queue_packets: usize,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: "ns-3-ssid".to_string(),
            data_mode: HtMcs::HtMcs1,
            control_mode: HtMcs::HtMcs0,
            slot_us: 9,
            sifs_us: 16,
            preamble_us: 40,
            cw_min: 15,
            mac_overhead_bytes: 36,
            ack_bytes: 14,
            range: 80.0,
            queue_packets: 500,
        }
    }
}

impl WifiConfig {
    /// DIFS = SIFS + 2 slots
    pub fn difs(&self) -> SimTime {
        SimTime::from_micros(self.sifs_us + 2 * self.slot_us)
    }

    /// Mean contention backoff, cw_min/2 slots
    pub fn mean_backoff(&self) -> SimTime {
        SimTime::from_nanos(self.cw_min as u64 * self.slot_us * 1_000 / 2)
    }

    /// Medium occupancy of one acknowledged data frame carrying `ip_bytes`
    pub fn airtime(&self, ip_bytes: u32) -> SimTime {
        let data = SimTime::transmission(ip_bytes + self.mac_overhead_bytes, self.data_mode.rate_bps());
        let ack = SimTime::transmission(self.ack_bytes, self.control_mode.rate_bps());
        self.difs()
            + self.mean_backoff()
            + SimTime::from_micros(self.preamble_us)
            + data
            + SimTime::from_micros(self.sifs_us)
            + SimTime::from_micros(self.preamble_us)
            + ack
    }
}

/// Shared wired segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmaConfig {
    pub data_rate_bps: u64,
    pub delay_ns: u64,
    /// Drop-tail device queue capacity
    pub queue_packets: usize,
}

impl Default for CsmaConfig {
    fn default() -> Self {
        Self {
            data_rate_bps: 100_000_000,
            delay_ns: 6560,
            queue_packets: 100,
        }
    }
}

impl CsmaConfig {
    pub fn delay(&self) -> SimTime {
        SimTime::from_nanos(self.delay_ns)
    }
}

// ============================================================================
// Report
// ============================================================================

/// How per-flow received bytes are reduced into the throughput figure
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputReduction {
    /// Σ rx_bytes*8 / (8*10^6); the divisor cancels the bit factor
    #[default]
    AsRecorded,

    /// Σ rx_bytes*8 / seconds / 10^6
    OverWindow { seconds: f64 },
}

/// How per-flow delays are reduced into the delay figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayReduction {
    /// Sum of each flow's mean delay
    #[default]
    SumOfFlowMeans,

    /// Σ delay_sum / Σ rx_packets across all flows
    WeightedMean,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub throughput: ThroughputReduction,
    pub delay: DelayReduction,
}
