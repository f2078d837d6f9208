//! Topology construction: node, link and device arenas
//!
//! Stations take NodeId 0..n so station index k is NodeId(k); the access
//! point follows at n and the server at n+1. Downstream components refer to
//! everything by index and never hold references into the arena.

use log::{debug, info};

use crate::mt_config::{Bounds, CsmaConfig, MobilityPolicy, ScenarioConfig, WifiConfig};
use crate::mt_error::ScenarioError;
use crate::mt_interface::{DeviceId, LinkId, NodeId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    WirelessStation,
    AccessPoint,
    WiredHost,
}

/// Placement of one node as handed to the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeMobility {
    Fixed(Position),
    RandomWalk {
        start: Position,
        bounds: Bounds,
        speed: f64,
        change_distance: f64,
    },
}

impl NodeMobility {
    /// Position at time zero
    pub fn initial_position(&self) -> Position {
        match self {
            NodeMobility::Fixed(position) => *position,
            NodeMobility::RandomWalk { start, .. } => *start,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub role: NodeRole,
    pub mobility: NodeMobility,
    pub devices: Vec<DeviceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    WirelessInfrastructure,
    WiredSegment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Medium {
    Wireless(WifiConfig),
    Wired(CsmaConfig),
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub kind: LinkKind,
    pub medium: Medium,
    pub devices: Vec<DeviceId>,
}

/// Attachment of one node to one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub node: NodeId,
    pub link: LinkId,
}

/// The complete node/link/device set of a scenario
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<Link>,
    devices: Vec<Device>,
    num_stations: usize,
    access_point: NodeId,
    server: NodeId,
    wireless: LinkId,
    wired: LinkId,
}

impl Topology {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.0)
    }

    pub fn num_stations(&self) -> usize {
        self.num_stations
    }

    /// NodeId of the station with the given index, if it exists
    pub fn station(&self, index: usize) -> Option<NodeId> {
        (index < self.num_stations).then_some(NodeId(index))
    }

    pub fn stations(&self) -> impl Iterator<Item = &Node> {
        self.nodes[..self.num_stations].iter()
    }

    pub fn access_point(&self) -> NodeId {
        self.access_point
    }

    pub fn server(&self) -> NodeId {
        self.server
    }

    pub fn wireless_link(&self) -> LinkId {
        self.wireless
    }

    pub fn wired_link(&self) -> LinkId {
        self.wired
    }

    /// The device `node` uses on `link`
    pub fn device_on(&self, node: NodeId, link: LinkId) -> Option<DeviceId> {
        self.node(node)?
            .devices
            .iter()
            .copied()
            .find(|d| self.devices[d.0].link == link)
    }
}

/// Builds the station/AP/server topology from the scenario configuration
pub struct TopologyBuilder<'a> {
    config: &'a ScenarioConfig,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(config: &'a ScenarioConfig) -> Self {
        Self { config }
    }

    pub fn build(&self) -> Result<Topology, ScenarioError> {
        self.config.validate()?;

        let num_stations = self.config.num_wireless_stations as usize;
        let policy = self.config.mobility_policy();

        let mut nodes = Vec::with_capacity(num_stations + 2);
        for i in 0..num_stations {
            nodes.push(Node {
                id: NodeId(i),
                role: NodeRole::WirelessStation,
                mobility: station_mobility(&policy, i),
                devices: Vec::new(),
            });
        }

        let access_point = NodeId(num_stations);
        nodes.push(Node {
            id: access_point,
            role: NodeRole::AccessPoint,
            mobility: NodeMobility::Fixed(self.config.access_point_position()),
            devices: Vec::new(),
        });

        // only the AP and the server take part in the wired segment
        let server = NodeId(num_stations + 1);
        nodes.push(Node {
            id: server,
            role: NodeRole::WiredHost,
            mobility: NodeMobility::Fixed(Position::default()),
            devices: Vec::new(),
        });

        let mut topology = Topology {
            nodes,
            links: Vec::with_capacity(2),
            devices: Vec::with_capacity(num_stations + 3),
            num_stations,
            access_point,
            server,
            wireless: LinkId(0),
            wired: LinkId(1),
        };

        let mut wireless_members: Vec<NodeId> = (0..num_stations).map(NodeId).collect();
        wireless_members.push(access_point);
        let wireless = attach_link(
            &mut topology,
            LinkKind::WirelessInfrastructure,
            Medium::Wireless(self.config.wifi.clone()),
            &wireless_members,
        );
        let wired = attach_link(
            &mut topology,
            LinkKind::WiredSegment,
            Medium::Wired(self.config.csma.clone()),
            &[access_point, server],
        );
        topology.wireless = wireless;
        topology.wired = wired;

        info!(
            "Topology: {} station(s), AP {:?}, server {:?}, mobility {}",
            num_stations,
            access_point,
            server,
            if self.config.mobility { "random walk" } else { "fixed grid" }
        );
        for station in topology.stations() {
            debug!("  station {:?} at {}", station.id, station.mobility.initial_position());
        }

        Ok(topology)
    }
}

fn station_mobility(policy: &MobilityPolicy, index: usize) -> NodeMobility {
    match *policy {
        MobilityPolicy::Fixed { grid } => NodeMobility::Fixed(grid.position(index)),
        MobilityPolicy::RandomWalk {
            bounds,
            speed,
            change_distance,
            start,
        } => NodeMobility::RandomWalk {
            start: bounds.clamp(start),
            bounds,
            speed,
            change_distance,
        },
    }
}

fn attach_link(topology: &mut Topology, kind: LinkKind, medium: Medium, members: &[NodeId]) -> LinkId {
    let link_id = LinkId(topology.links.len());
    let mut devices = Vec::with_capacity(members.len());

    for &node in members {
        let device_id = DeviceId(topology.devices.len());
        topology.devices.push(Device {
            id: device_id,
            node,
            link: link_id,
        });
        topology.nodes[node.0].devices.push(device_id);
        devices.push(device_id);
    }

    topology.links.push(Link {
        id: link_id,
        kind,
        medium,
        devices,
    });
    link_id
}
