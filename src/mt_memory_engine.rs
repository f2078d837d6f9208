//! In-memory discrete-event kernel
//!
//! A small stand-in for a full network simulator:
//!
//! - every link is a shared half-duplex medium serving its device queues
//!   round-robin, one frame at a time
//! - wireless frames occupy the medium for DIFS + mean backoff + data + SIFS + ACK
//!   and are lost when sender and receiver are farther apart than the range
//! - wired frames take size/bandwidth on the medium plus the propagation delay
//! - packets to another link are forwarded through the node attached to both
//! - device queues are drop-tail
//!
//! All randomness comes from per-stream RNGs derived from the engine seed,
//! so identical inputs replay identically.

use hashbrown::HashMap;
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::io::Write;
use std::net::Ipv4Addr;

use crate::mt_address::AddressPlan;
use crate::mt_engine::{EventQueue, RunSummary, SimEvent, SimulationEngine};
use crate::mt_error::EngineError;
use crate::mt_flow_monitor::{DropReason, FlowMonitor};
use crate::mt_interface::{
    AppId, DeviceId, FiveTuple, FlowRecord, LinkId, NodeId, Position, SimTime, TrafficDescriptor, EPHEMERAL_PORT_BASE,
};
use crate::mt_mobility::{MobilityModel, RandomWalk};
use crate::mt_onoff::OnOffApplication;
use crate::mt_topology::{Medium, NodeMobility, Topology};

/// Ethernet header + FCS added on the wired segment
const ETHERNET_OVERHEAD_BYTES: u32 = 18;

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

#[derive(Debug, Clone)]
struct Packet {
    uid: u64,
    tuple: FiveTuple,
    bytes: u32,
}

#[derive(Debug, Clone)]
struct Frame {
    packet: Packet,
    receiver: DeviceId,
}

#[derive(Debug)]
enum KernelEvent {
    Harness(SimEvent),
    Stop,
    StartSending { app: AppId, generation: u64 },
    StopSending { app: AppId, generation: u64 },
    SendPacket { app: AppId, generation: u64 },
    TransmitComplete { link: LinkId },
    Arrive { device: DeviceId, packet: Packet },
    CourseChange { node: NodeId },
}

struct NetNode {
    mobility: MobilityModel,
    devices: Vec<DeviceId>,
}

struct NetDevice {
    node: NodeId,
    link: LinkId,
    address: Ipv4Addr,
    queue: VecDeque<Frame>,
    capacity: usize,
}

struct NetLink {
    medium: Medium,
    devices: Vec<DeviceId>,
    /// sender and frame currently occupying the medium
    on_air: Option<(DeviceId, Frame)>,
    cursor: usize,
    usage: LinkUsage,
}

/// Medium occupancy counters of one link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkUsage {
    pub frames: u64,
    pub busy: SimTime,
}

struct Network {
    nodes: Vec<NetNode>,
    devices: Vec<NetDevice>,
    links: Vec<NetLink>,
    by_address: HashMap<Ipv4Addr, DeviceId>,
}

/// A position reported when a walker changes direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseChange {
    pub time: SimTime,
    pub node: NodeId,
    pub position: Position,
}

pub struct MemoryEngine {
    seed: [u8; 32],
    now: SimTime,
    queue: EventQueue<KernelEvent>,
    stop_at: Option<SimTime>,
    ran: bool,

    network: Option<Network>,
    apps: Vec<OnOffApplication>,
    monitor: Option<FlowMonitor>,
    next_uid: u64,

    course_changes: Vec<CourseChange>,
    sink_packets: u64,
    sink_bytes: u64,
}

impl MemoryEngine {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            now: SimTime::ZERO,
            queue: EventQueue::new(),
            stop_at: None,
            ran: false,
            network: None,
            apps: Vec::new(),
            monitor: None,
            next_uid: 0,
            course_changes: Vec::new(),
            sink_packets: 0,
            sink_bytes: 0,
        }
    }

    /// Independent RNG for one named stream of randomness
    fn stream_rng(&self, label: &str) -> StdRng {
        let hash = blake3::keyed_hash(&self.seed, label.as_bytes());
        StdRng::from_seed(*hash.as_bytes())
    }

    /// Current position of `node`
    pub fn position_of(&self, node: NodeId) -> Option<Position> {
        let network = self.network.as_ref()?;
        let mut mobility = network.nodes.get(node.0)?.mobility.clone();
        Some(mobility.position_at(self.now))
    }

    /// Every course change observed so far, in time order
    pub fn course_changes(&self) -> &[CourseChange] {
        &self.course_changes
    }

    pub fn packets_sent(&self, app: AppId) -> Option<u64> {
        self.apps.get(app.0).map(|a| a.packets_sent())
    }

    /// Packets and bytes that reached a listening sink port
    pub fn sink_received(&self) -> (u64, u64) {
        (self.sink_packets, self.sink_bytes)
    }

    pub fn link_usage(&self, link: LinkId) -> Option<LinkUsage> {
        Some(self.network.as_ref()?.links.get(link.0)?.usage)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn dispatch(&mut self, event: KernelEvent) -> Result<(), EngineError> {
        match event {
            KernelEvent::Harness(SimEvent::StartApplication(app)) => self.start_application(app),
            KernelEvent::Harness(SimEvent::StopApplication(app)) => {
                let application = self.apps.get_mut(app.0).ok_or(EngineError::UnknownApplication(app))?;
                application.stop();
                debug!(
                    "{} app {:?} stopped after {} packets",
                    self.now,
                    app,
                    application.packets_sent()
                );
                Ok(())
            }
            KernelEvent::StartSending { app, generation } => self.start_sending(app, generation),
            KernelEvent::StopSending { app, generation } => self.stop_sending(app, generation),
            KernelEvent::SendPacket { app, generation } => self.send_packet(app, generation),
            KernelEvent::TransmitComplete { link } => self.transmit_complete(link),
            KernelEvent::Arrive { device, packet } => self.arrive(device, packet),
            KernelEvent::CourseChange { node } => self.course_change(node),
            KernelEvent::Stop => Ok(()),
        }
    }

    fn start_application(&mut self, app: AppId) -> Result<(), EngineError> {
        let application = self.apps.get_mut(app.0).ok_or(EngineError::UnknownApplication(app))?;
        let delay = application.start();
        let generation = application.generation();
        debug!("{} app {:?} started, first on period in {}", self.now, app, delay);
        self.queue.push(self.now + delay, KernelEvent::StartSending { app, generation });
        Ok(())
    }

    fn start_sending(&mut self, app: AppId, generation: u64) -> Result<(), EngineError> {
        let now = self.now;
        let application = self.apps.get_mut(app.0).ok_or(EngineError::UnknownApplication(app))?;
        if !application.is_current(generation) {
            return Ok(());
        }
        let (first, on) = application.begin_on(now);
        trace!("{} app {:?} on for {}", now, app, on);
        self.queue.push(now + first, KernelEvent::SendPacket { app, generation });
        self.queue.push(now + on, KernelEvent::StopSending { app, generation });
        Ok(())
    }

    fn stop_sending(&mut self, app: AppId, generation: u64) -> Result<(), EngineError> {
        let now = self.now;
        let application = self.apps.get_mut(app.0).ok_or(EngineError::UnknownApplication(app))?;
        if !application.is_current(generation) {
            return Ok(());
        }
        let off = application.end_on(now);
        let generation = application.generation();
        trace!("{} app {:?} off for {}", now, app, off);
        self.queue.push(now + off, KernelEvent::StartSending { app, generation });
        Ok(())
    }

    fn send_packet(&mut self, app: AppId, generation: u64) -> Result<(), EngineError> {
        let now = self.now;
        let application = self.apps.get_mut(app.0).ok_or(EngineError::UnknownApplication(app))?;
        if !application.is_current(generation) || !application.is_sending() {
            return Ok(());
        }

        application.packet_sent(now);
        let interval = application.interval();
        let source = application.descriptor().source;
        let packet = Packet {
            uid: self.next_uid,
            tuple: application.five_tuple(),
            bytes: application.ip_packet_bytes(),
        };
        self.next_uid += 1;
        self.queue.push(now + interval, KernelEvent::SendPacket { app, generation });

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.report_tx(now, packet.uid, packet.tuple, packet.bytes);
        }
        self.route_and_enqueue(source, packet)
    }

    fn arrive(&mut self, device: DeviceId, packet: Packet) -> Result<(), EngineError> {
        let network = self.network.as_ref().ok_or(EngineError::NotAttached)?;
        let node = network.devices[device.0].node;
        let local = network.nodes[node.0]
            .devices
            .iter()
            .any(|d| network.devices[d.0].address == packet.tuple.destination);

        if local {
            trace!("{} packet {} delivered to {:?}", self.now, packet.uid, node);
            if let Some(monitor) = self.monitor.as_mut() {
                monitor.report_rx(self.now, packet.uid, packet.bytes);
            }
            // the server listens on every installed application's destination port
            let listening = self
                .apps
                .iter()
                .any(|a| a.descriptor().destination.port() == packet.tuple.destination_port);
            if listening {
                self.sink_packets += 1;
                self.sink_bytes += packet.bytes as u64;
            }
            return Ok(());
        }

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.report_forward(packet.uid);
        }
        self.route_and_enqueue(node, packet)
    }

    fn course_change(&mut self, node: NodeId) -> Result<(), EngineError> {
        let now = self.now;
        let stop_at = self.stop_at;
        let network = self.network.as_mut().ok_or(EngineError::NotAttached)?;
        let net_node = network.nodes.get_mut(node.0).ok_or(EngineError::UnknownNode(node))?;

        let MobilityModel::RandomWalk(walk) = &mut net_node.mobility else {
            return Ok(());
        };
        let position = walk.change_course(now);
        let next = now + walk.change_interval();

        self.course_changes.push(CourseChange {
            time: now,
            node,
            position,
        });
        trace!("{} {:?} turns at {}", now, node, position);

        // without a horizon the walkers would keep the queue alive forever
        if stop_at.is_some() {
            self.queue.push(next, KernelEvent::CourseChange { node });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Forwarding and media
    // ------------------------------------------------------------------------

    /// Pick the outgoing device and next-hop device for `destination` as seen from `node`
    fn next_hop(network: &Network, node: NodeId, destination: Ipv4Addr) -> Option<(DeviceId, DeviceId)> {
        let target = *network.by_address.get(&destination)?;
        let target_link = network.devices[target.0].link;
        let own = &network.nodes[node.0].devices;

        if let Some(&out) = own.iter().find(|d| network.devices[d.0].link == target_link) {
            return Some((out, target));
        }

        // a neighbour that is itself attached to the destination link
        for &out in own {
            let link = &network.links[network.devices[out.0].link.0];
            for &peer in &link.devices {
                let peer_node = network.devices[peer.0].node;
                if peer_node == node {
                    continue;
                }
                let bridges = network.nodes[peer_node.0]
                    .devices
                    .iter()
                    .any(|d| network.devices[d.0].link == target_link);
                if bridges {
                    return Some((out, peer));
                }
            }
        }
        None
    }

    fn route_and_enqueue(&mut self, node: NodeId, packet: Packet) -> Result<(), EngineError> {
        let network = self.network.as_ref().ok_or(EngineError::NotAttached)?;
        let Some((out, receiver)) = Self::next_hop(network, node, packet.tuple.destination) else {
            debug!("{} no route from {:?} to {}", self.now, node, packet.tuple.destination);
            if let Some(monitor) = self.monitor.as_mut() {
                monitor.report_drop(packet.uid, DropReason::NoRoute);
            }
            return Ok(());
        };

        let network = self.network.as_mut().ok_or(EngineError::NotAttached)?;
        let device = &mut network.devices[out.0];
        if device.queue.len() >= device.capacity {
            let uid = packet.uid;
            if let Some(monitor) = self.monitor.as_mut() {
                monitor.report_drop(uid, DropReason::QueueFull);
            }
            return Ok(());
        }
        device.queue.push_back(Frame { packet, receiver });

        let link = device.link;
        if network.links[link.0].on_air.is_none() {
            self.begin_transmission(link)?;
        }
        Ok(())
    }

    /// Start the next queued frame on an idle link, serving devices round-robin
    fn begin_transmission(&mut self, link_id: LinkId) -> Result<(), EngineError> {
        let now = self.now;
        let network = self.network.as_mut().ok_or(EngineError::NotAttached)?;
        let Network { links, devices, .. } = network;
        let link = &mut links[link_id.0];
        if link.on_air.is_some() || link.devices.is_empty() {
            return Ok(());
        }

        let count = link.devices.len();
        let mut chosen = None;
        for step in 0..count {
            let slot = (link.cursor + step) % count;
            let device = link.devices[slot];
            if let Some(frame) = devices[device.0].queue.pop_front() {
                link.cursor = (slot + 1) % count;
                chosen = Some((device, frame));
                break;
            }
        }
        let Some((sender, frame)) = chosen else {
            return Ok(());
        };

        let duration = match &link.medium {
            Medium::Wireless(wifi) => wifi.airtime(frame.packet.bytes),
            Medium::Wired(csma) => {
                SimTime::transmission(frame.packet.bytes + ETHERNET_OVERHEAD_BYTES, csma.data_rate_bps)
            }
        };
        link.usage.frames += 1;
        link.usage.busy = link.usage.busy + duration;
        link.on_air = Some((sender, frame));

        self.queue.push(now + duration, KernelEvent::TransmitComplete { link: link_id });
        Ok(())
    }

    fn transmit_complete(&mut self, link_id: LinkId) -> Result<(), EngineError> {
        let now = self.now;
        let network = self.network.as_mut().ok_or(EngineError::NotAttached)?;
        let Some((sender, frame)) = network.links[link_id.0].on_air.take() else {
            return Ok(());
        };

        let sender_node = network.devices[sender.0].node;
        let receiver_node = network.devices[frame.receiver.0].node;
        let arrival = match &network.links[link_id.0].medium {
            Medium::Wireless(wifi) => {
                let range = wifi.range;
                let from = network.nodes[sender_node.0].mobility.position_at(now);
                let to = network.nodes[receiver_node.0].mobility.position_at(now);
                let distance = from.distance(&to);
                if distance <= range {
                    Some(now + SimTime::from_secs_f64(distance / SPEED_OF_LIGHT))
                } else {
                    trace!("{} frame from {:?} out of range ({:.1})", now, sender_node, distance);
                    None
                }
            }
            Medium::Wired(csma) => Some(now + csma.delay()),
        };

        match arrival {
            Some(at) => self.queue.push(
                at,
                KernelEvent::Arrive {
                    device: frame.receiver,
                    packet: frame.packet,
                },
            ),
            None => {
                if let Some(monitor) = self.monitor.as_mut() {
                    monitor.report_drop(frame.packet.uid, DropReason::OutOfRange);
                }
            }
        }

        self.begin_transmission(link_id)
    }
}

impl SimulationEngine for MemoryEngine {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, at: SimTime, event: SimEvent) -> Result<(), EngineError> {
        if at < self.now {
            return Err(EngineError::ScheduleInPast { at, now: self.now });
        }
        let app = match event {
            SimEvent::StartApplication(app) | SimEvent::StopApplication(app) => app,
        };
        if app.0 >= self.apps.len() {
            return Err(EngineError::UnknownApplication(app));
        }
        self.queue.push(at, KernelEvent::Harness(event));
        Ok(())
    }

    fn stop(&mut self, at: SimTime) {
        let at = at.max(self.now);
        self.stop_at = Some(at);
        self.queue.push(at, KernelEvent::Stop);
    }

    fn run(&mut self) -> Result<RunSummary, EngineError> {
        if self.ran {
            return Err(EngineError::AlreadyRan);
        }
        self.ran = true;

        // walkers are scheduled here so they only exist once a horizon may be known
        if let Some(network) = self.network.as_ref() {
            let walkers: Vec<NodeId> = network
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.mobility.is_mobile())
                .map(|(i, _)| NodeId(i))
                .collect();
            for node in walkers {
                self.queue.push(self.now, KernelEvent::CourseChange { node });
            }
        }

        info!("Running simulation (stop at {:?})", self.stop_at);
        let mut executed = 0u64;
        while let Some((at, event)) = self.queue.pop() {
            self.now = at;
            if let KernelEvent::Stop = event {
                let discarded = self.queue.clear();
                info!(
                    "Simulation stopped at {}: {} events executed, {} discarded",
                    at,
                    executed,
                    discarded
                );
                return Ok(RunSummary {
                    events_executed: executed,
                    events_discarded: discarded,
                    stopped_at: at,
                });
            }
            self.dispatch(event)?;
            executed += 1;
        }

        info!("Simulation drained at {}: {} events executed", self.now, executed);
        Ok(RunSummary {
            events_executed: executed,
            events_discarded: 0,
            stopped_at: self.now,
        })
    }

    fn attach_network(&mut self, topology: &Topology, addresses: &AddressPlan) -> Result<(), EngineError> {
        if self.network.is_some() {
            return Err(EngineError::AlreadyAttached);
        }

        let mut nodes = Vec::with_capacity(topology.nodes().len());
        for node in topology.nodes() {
            let mobility = match node.mobility {
                NodeMobility::Fixed(position) => MobilityModel::ConstantPosition(position),
                NodeMobility::RandomWalk {
                    start,
                    bounds,
                    speed,
                    change_distance,
                } => {
                    let rng = self.stream_rng(&format!("walk:{}", node.id.0));
                    MobilityModel::RandomWalk(RandomWalk::new(start, bounds, speed, change_distance, rng))
                }
            };
            nodes.push(NetNode {
                mobility,
                devices: node.devices.clone(),
            });
        }

        let mut devices = Vec::with_capacity(topology.devices().len());
        let mut by_address = HashMap::new();
        for device in topology.devices() {
            let address = addresses
                .address(device.id)
                .ok_or(EngineError::UnknownNode(device.node))?;
            let link = topology.link(device.link).ok_or(EngineError::UnknownNode(device.node))?;
            let capacity = match &link.medium {
                Medium::Wireless(wifi) => wifi.queue_packets,
                Medium::Wired(csma) => csma.queue_packets,
            };
            by_address.insert(address, device.id);
            devices.push(NetDevice {
                node: device.node,
                link: device.link,
                address,
                queue: VecDeque::new(),
                capacity,
            });
        }

        let links = topology
            .links()
            .iter()
            .map(|link| NetLink {
                medium: link.medium.clone(),
                devices: link.devices.clone(),
                on_air: None,
                cursor: 0,
                usage: LinkUsage::default(),
            })
            .collect();

        debug!(
            "Attached {} nodes, {} devices, {} links",
            nodes.len(),
            devices.len(),
            topology.links().len()
        );
        self.network = Some(Network {
            nodes,
            devices,
            links,
            by_address,
        });
        Ok(())
    }

    fn install_application(&mut self, descriptor: &TrafficDescriptor) -> Result<AppId, EngineError> {
        let network = self.network.as_ref().ok_or(EngineError::NotAttached)?;
        let source = network
            .nodes
            .get(descriptor.source.0)
            .ok_or(EngineError::UnknownNode(descriptor.source))?;
        let first_device = source
            .devices
            .first()
            .ok_or(EngineError::UnknownNode(descriptor.source))?;
        let source_address = network.devices[first_device.0].address;

        let app = AppId(self.apps.len());
        let source_port = EPHEMERAL_PORT_BASE + app.0 as u16;
        let rng = self.stream_rng(&format!("app:{}", app.0));
        self.apps.push(OnOffApplication::new(descriptor.clone(), source_address, source_port, rng));

        debug!(
            "Installed {:?} {:?} on {:?}: {}:{} -> {}",
            app, descriptor.kind, descriptor.source, source_address, source_port, descriptor.destination
        );
        Ok(app)
    }

    fn install_flow_probe(&mut self) -> Result<(), EngineError> {
        if self.network.is_none() {
            return Err(EngineError::NotAttached);
        }
        if self.monitor.is_none() {
            self.monitor = Some(FlowMonitor::new());
        }
        Ok(())
    }

    fn flow_records(&self) -> Result<Vec<FlowRecord>, EngineError> {
        self.monitor
            .as_ref()
            .map(FlowMonitor::records)
            .ok_or(EngineError::ProbeNotInstalled)
    }

    fn write_flow_records(&self, out: &mut dyn Write) -> Result<(), EngineError> {
        self.monitor
            .as_ref()
            .ok_or(EngineError::ProbeNotInstalled)?
            .write_yaml(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mt_address::AddressPlanner;
    use crate::mt_config::{ScenarioConfig, TrafficPattern};
    use crate::mt_interface::{TrafficKind, SERVER_PORT, SIMULATION_STOP, TRAFFIC_START, TRAFFIC_STOP};
    use crate::mt_topology::TopologyBuilder;
    use std::net::SocketAddrV4;

    fn attached(config: &ScenarioConfig) -> (MemoryEngine, Topology, AddressPlan) {
        let topology = TopologyBuilder::new(config).build().unwrap();
        let addresses = AddressPlanner::default().plan(&topology).unwrap();
        let mut engine = MemoryEngine::new(config.resolve_seed());
        engine.attach_network(&topology, &addresses).unwrap();
        engine.install_flow_probe().unwrap();
        (engine, topology, addresses)
    }

    fn descriptor(topology: &Topology, addresses: &AddressPlan, kind: TrafficKind) -> TrafficDescriptor {
        TrafficDescriptor {
            kind,
            source: NodeId(kind.source_station()),
            source_station: kind.source_station(),
            destination: SocketAddrV4::new(addresses.server_address(topology).unwrap(), SERVER_PORT),
            data_rate_bps: 10_000_000,
            packet_size: 4096,
            on_time: kind.on_time(),
            off_time: kind.off_time(),
            start: TRAFFIC_START,
            stop: TRAFFIC_STOP,
        }
    }

    fn install(engine: &mut MemoryEngine, d: &TrafficDescriptor) -> AppId {
        let app = engine.install_application(d).unwrap();
        engine.schedule(d.start, SimEvent::StartApplication(app)).unwrap();
        engine.schedule(d.stop, SimEvent::StopApplication(app)).unwrap();
        app
    }

    #[test]
    fn test_cbr_flow_crosses_both_segments() {
        let config = ScenarioConfig::new(5, false, TrafficPattern::Cbr);
        let (mut engine, topology, addresses) = attached(&config);
        let d = descriptor(&topology, &addresses, TrafficKind::Cbr);
        let app = install(&mut engine, &d);

        engine.stop(SIMULATION_STOP);
        let summary = engine.run().unwrap();
        assert_eq!(summary.stopped_at, SIMULATION_STOP);

        let records = engine.flow_records().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.flow_id, 1);
        assert_eq!(record.five_tuple.source, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(record.five_tuple.destination, Ipv4Addr::new(10, 1, 1, 2));

        // 8s at one packet per 3.2768ms
        let sent = engine.packets_sent(app).unwrap();
        assert!((2440..=2442).contains(&sent), "sent {}", sent);
        assert_eq!(record.stats.tx_packets, sent);
        assert!(record.stats.rx_packets > 0);
        assert!(record.stats.rx_packets <= record.stats.tx_packets);
        // every delivered packet crossed the AP
        assert!(record.stats.times_forwarded >= record.stats.rx_packets);
        assert_eq!(record.stats.lost_packets, 0);
        assert_eq!(engine.sink_received().0, record.stats.rx_packets);
        assert_eq!(record.stats.rx_bytes, record.stats.rx_packets * 4124);

        // one wifi hop plus one wired hop at minimum
        let mean_delay = record.stats.delay_sum.as_secs_f64() / record.stats.rx_packets as f64;
        assert!(mean_delay > 0.0028, "mean delay {}", mean_delay);

        let wifi = engine.link_usage(topology.wireless_link()).unwrap();
        let wired = engine.link_usage(topology.wired_link()).unwrap();
        assert!(wifi.frames >= wired.frames);
    }

    #[test]
    fn test_pending_events_discarded_at_stop() {
        let config = ScenarioConfig::new(2, false, TrafficPattern::Cbr);
        let (mut engine, topology, addresses) = attached(&config);
        let mut d = descriptor(&topology, &addresses, TrafficKind::Cbr);
        d.stop = SimTime::from_secs(20);
        install(&mut engine, &d);

        engine.stop(SimTime::from_secs(3));
        let summary = engine.run().unwrap();
        assert_eq!(engine.now(), SimTime::from_secs(3));
        assert!(summary.events_discarded >= 2, "{:?}", summary);

        let stats = &engine.flow_records().unwrap()[0].stats;
        assert!(stats.time_last_tx.unwrap() <= SimTime::from_secs(3));
        assert!(matches!(engine.run(), Err(EngineError::AlreadyRan)));
    }

    #[test]
    fn test_out_of_range_station_loses_everything() {
        let mut config = ScenarioConfig::new(1, false, TrafficPattern::Cbr);
        config.access_point = Some(Position::new(500.0, 500.0));
        let (mut engine, topology, addresses) = attached(&config);
        install(&mut engine, &descriptor(&topology, &addresses, TrafficKind::Cbr));

        engine.stop(SIMULATION_STOP);
        engine.run().unwrap();

        let stats = &engine.flow_records().unwrap()[0].stats;
        assert!(stats.tx_packets > 0);
        assert_eq!(stats.rx_packets, 0);
        assert!(stats.lost_packets > 0);
    }

    #[test]
    fn test_overload_fills_queue_and_drops() {
        let mut config = ScenarioConfig::new(2, false, TrafficPattern::Cbr);
        config.wifi.queue_packets = 10;
        let (mut engine, topology, addresses) = attached(&config);
        let mut d = descriptor(&topology, &addresses, TrafficKind::Cbr);
        d.data_rate_bps = 40_000_000;
        install(&mut engine, &d);

        engine.stop(SIMULATION_STOP);
        engine.run().unwrap();

        let stats = &engine.flow_records().unwrap()[0].stats;
        assert!(stats.lost_packets > 0);
        assert!(stats.rx_packets + stats.lost_packets <= stats.tx_packets);
    }

    #[test]
    fn test_walkers_stay_in_bounds() {
        let config = ScenarioConfig::new(5, true, TrafficPattern::Cbr);
        let (mut engine, topology, _) = attached(&config);
        engine.stop(SIMULATION_STOP);
        engine.run().unwrap();

        let changes = engine.course_changes();
        // five walkers turning every 0.5s (1 unit at 2 units/s) from t=0 until the stop event
        assert_eq!(changes.len(), 5 * 20);
        for change in changes {
            assert!(config.walk_bounds.contains(&change.position));
            assert!(change.time < SIMULATION_STOP);
        }
        for station in topology.stations() {
            let position = engine.position_of(station.id).unwrap();
            assert!(config.walk_bounds.contains(&position));
        }
        assert_eq!(
            engine.position_of(topology.access_point()),
            Some(Position::new(0.0, 0.0))
        );
    }

    #[test]
    fn test_walking_out_of_range_loses_frames() {
        let delivered = |mobility: bool| {
            let mut config = ScenarioConfig::new(5, mobility, TrafficPattern::Cbr);
            config.wifi.range = 30.0;
            config.mobility_speed = 10.0;
            // one straight leg until the first wall, reached no earlier than t=5s
            config.walk_change_distance = 1000.0;
            let (mut engine, topology, addresses) = attached(&config);
            install(&mut engine, &descriptor(&topology, &addresses, TrafficKind::Cbr));
            engine.stop(SIMULATION_STOP);
            engine.run().unwrap();
            engine.flow_records().unwrap()[0].stats.clone()
        };

        let fixed = delivered(false);
        let walking = delivered(true);
        assert_eq!(fixed.tx_packets, walking.tx_packets);
        assert_eq!(fixed.lost_packets, 0);
        // station 0 is 10t from the AP, so out of range for t in (3s, 5s) at least
        assert!(walking.lost_packets > 0, "{:?}", walking);
        assert!(walking.rx_packets < fixed.rx_packets);
    }

    #[test]
    fn test_engine_contract_errors() {
        let mut engine = MemoryEngine::new([0u8; 32]);
        assert!(matches!(engine.install_flow_probe(), Err(EngineError::NotAttached)));
        assert!(matches!(engine.flow_records(), Err(EngineError::ProbeNotInstalled)));
        assert!(matches!(
            engine.schedule(SimTime::from_secs(1), SimEvent::StartApplication(AppId(0))),
            Err(EngineError::UnknownApplication(_))
        ));

        let config = ScenarioConfig::default();
        let (mut engine, topology, addresses) = attached(&config);
        assert!(matches!(
            engine.attach_network(&topology, &addresses),
            Err(EngineError::AlreadyAttached)
        ));
    }

    #[test]
    fn test_same_seed_same_burst_outcome() {
        let run = |seed: [u8; 32]| {
            let mut config = ScenarioConfig::new(3, false, TrafficPattern::Burst);
            config.seed = Some(seed);
            let (mut engine, topology, addresses) = attached(&config);
            install(&mut engine, &descriptor(&topology, &addresses, TrafficKind::Burst));
            engine.stop(SIMULATION_STOP);
            engine.run().unwrap();
            engine.flow_records().unwrap()
        };
        assert_eq!(run([9u8; 32]), run([9u8; 32]));
    }
}
