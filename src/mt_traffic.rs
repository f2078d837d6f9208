//! Traffic pattern selection
//!
//! Turns a `TrafficPattern` into on/off UDP source descriptors bound to
//! fixed station indices, then installs them on an engine.

use log::{debug, info};
use std::net::SocketAddrV4;

use crate::mt_address::AddressPlan;
use crate::mt_config::TrafficPattern;
use crate::mt_engine::{SimEvent, SimulationEngine};
use crate::mt_error::{EngineError, ScenarioError};
use crate::mt_interface::{
    AppId, NodeId, TrafficDescriptor, TrafficKind, SERVER_PORT, TRAFFIC_DATA_RATE_BPS, TRAFFIC_PACKET_SIZE,
    TRAFFIC_START, TRAFFIC_STOP,
};
use crate::mt_topology::Topology;

pub struct TrafficScheduler;

impl TrafficScheduler {
    /// Build one descriptor per generator of `pattern`
    ///
    /// Every referenced station index is checked before anything is built, so
    /// an undersized topology fails without producing partial output.
    pub fn plan(
        pattern: TrafficPattern,
        topology: &Topology,
        addresses: &AddressPlan,
    ) -> Result<Vec<TrafficDescriptor>, ScenarioError> {
        let available = topology.num_stations();
        for kind in pattern.components() {
            let required = kind.source_station();
            if available <= required {
                return Err(ScenarioError::InsufficientNodes {
                    pattern: pattern.name().to_string(),
                    required,
                    available,
                });
            }
        }

        let server = addresses
            .server_address(topology)
            .ok_or_else(|| ScenarioError::InvalidConfiguration("server has no address on the wired segment".into()))?;
        let destination = SocketAddrV4::new(server, SERVER_PORT);

        let mut descriptors = Vec::with_capacity(pattern.components().len());
        for &kind in pattern.components() {
            let station = kind.source_station();
            let source = topology.station(station).ok_or(ScenarioError::InsufficientNodes {
                pattern: pattern.name().to_string(),
                required: station,
                available,
            })?;
            descriptors.push(describe(kind, source, station, destination));
        }

        info!(
            "Traffic pattern {}: {} generator(s) -> {}",
            pattern,
            descriptors.len(),
            destination
        );
        Ok(descriptors)
    }

    /// Create one application per descriptor and schedule its start and stop
    pub fn install<E: SimulationEngine + ?Sized>(
        descriptors: &[TrafficDescriptor],
        engine: &mut E,
    ) -> Result<Vec<AppId>, EngineError> {
        let mut apps = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let app = engine.install_application(descriptor)?;
            engine.schedule(descriptor.start, SimEvent::StartApplication(app))?;
            engine.schedule(descriptor.stop, SimEvent::StopApplication(app))?;
            debug!(
                "  {:?} {:?} from station {} active {}..{}",
                app, descriptor.kind, descriptor.source_station, descriptor.start, descriptor.stop
            );
            apps.push(app);
        }
        Ok(apps)
    }
}

fn describe(kind: TrafficKind, source: NodeId, source_station: usize, destination: SocketAddrV4) -> TrafficDescriptor {
    TrafficDescriptor {
        kind,
        source,
        source_station,
        destination,
        data_rate_bps: TRAFFIC_DATA_RATE_BPS,
        packet_size: TRAFFIC_PACKET_SIZE,
        on_time: kind.on_time(),
        off_time: kind.off_time(),
        start: TRAFFIC_START,
        stop: TRAFFIC_STOP,
    }
}
