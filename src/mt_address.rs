//! IPv4 addressing of the wireless and wired segments

use log::{debug, info};
use std::fmt;
use std::net::Ipv4Addr;

use crate::mt_error::ScenarioError;
use crate::mt_interface::{DeviceId, LinkId, NodeId};
use crate::mt_topology::{LinkKind, Topology};

/// A contiguous IPv4 prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBlock {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl AddressBlock {
    /// Host bits of `network` must be zero; prefixes longer than /30 leave no hosts
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self, ScenarioError> {
        if prefix_len > 30 {
            return Err(ScenarioError::InvalidConfiguration(format!(
                "prefix /{} leaves no usable hosts",
                prefix_len
            )));
        }
        let block = Self { network, prefix_len };
        if u32::from(network) & !block.mask() != 0 {
            return Err(ScenarioError::InvalidConfiguration(format!(
                "{} has host bits set for /{}",
                network, prefix_len
            )));
        }
        Ok(block)
    }

    /// 192.168.0.0/24
    pub fn wireless_default() -> Self {
        Self {
            network: Ipv4Addr::new(192, 168, 0, 0),
            prefix_len: 24,
        }
    }

    /// 10.1.1.0/24
    pub fn wired_default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 1, 1, 0),
            prefix_len: 24,
        }
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len as u32)
        }
    }

    fn size(&self) -> u64 {
        1u64 << (32 - self.prefix_len as u32)
    }

    /// Excludes the network and broadcast addresses
    pub fn usable_hosts(&self) -> u32 {
        (self.size() - 2) as u32
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask() == u32::from(self.network)
    }

    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        // aligned prefixes either nest or are disjoint
        self.contains(other.network) || other.contains(self.network)
    }

    /// The n-th host address, 1-based
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        if n == 0 || n > self.usable_hosts() {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network) + n))
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Per-device address assignment
#[derive(Debug, Clone)]
pub struct AddressPlan {
    /// indexed by DeviceId
    addresses: Vec<Ipv4Addr>,
    /// indexed by LinkId
    blocks: Vec<AddressBlock>,
}

impl AddressPlan {
    pub fn address(&self, device: DeviceId) -> Option<Ipv4Addr> {
        self.addresses.get(device.0).copied()
    }

    pub fn block(&self, link: LinkId) -> Option<&AddressBlock> {
        self.blocks.get(link.0)
    }

    /// Address of `node` on `link`
    pub fn node_address(&self, topology: &Topology, node: NodeId, link: LinkId) -> Option<Ipv4Addr> {
        self.address(topology.device_on(node, link)?)
    }

    /// Server address on the wired segment
    pub fn server_address(&self, topology: &Topology) -> Option<Ipv4Addr> {
        self.node_address(topology, topology.server(), topology.wired_link())
    }

    /// Device owning `addr`
    pub fn device_for(&self, addr: Ipv4Addr) -> Option<DeviceId> {
        self.addresses.iter().position(|a| *a == addr).map(DeviceId)
    }
}

/// Assigns one block per link; the blocks never overlap
pub struct AddressPlanner {
    wireless: AddressBlock,
    wired: AddressBlock,
}

impl Default for AddressPlanner {
    fn default() -> Self {
        Self {
            wireless: AddressBlock::wireless_default(),
            wired: AddressBlock::wired_default(),
        }
    }
}

impl AddressPlanner {
    pub fn new(wireless: AddressBlock, wired: AddressBlock) -> Result<Self, ScenarioError> {
        if wireless.overlaps(&wired) {
            return Err(ScenarioError::InvalidConfiguration(format!(
                "wireless block {} overlaps wired block {}",
                wireless, wired
            )));
        }
        Ok(Self { wireless, wired })
    }

    pub fn plan(&self, topology: &Topology) -> Result<AddressPlan, ScenarioError> {
        let mut addresses = vec![Ipv4Addr::UNSPECIFIED; topology.devices().len()];
        let mut blocks = Vec::with_capacity(topology.links().len());

        for link in topology.links() {
            let block = match link.kind {
                LinkKind::WirelessInfrastructure => self.wireless,
                LinkKind::WiredSegment => self.wired,
            };

            if link.devices.len() > block.usable_hosts() as usize {
                return Err(ScenarioError::InvalidConfiguration(format!(
                    "block {} has {} usable hosts but link {:?} has {} devices",
                    block,
                    block.usable_hosts(),
                    link.id,
                    link.devices.len()
                )));
            }

            // device order on the link decides the host number
            for (n, device) in link.devices.iter().enumerate() {
                let addr = block
                    .host(n as u32 + 1)
                    .ok_or_else(|| ScenarioError::InvalidConfiguration(format!("block {} exhausted", block)))?;
                addresses[device.0] = addr;
                debug!("  {:?} on {:?} -> {}", device, link.id, addr);
            }

            blocks.push(block);
        }

        info!("Addressing: wireless {}, wired {}", self.wireless, self.wired);
        Ok(AddressPlan { addresses, blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mt_config::{ScenarioConfig, TrafficPattern};
    use crate::mt_topology::TopologyBuilder;

    fn topology(n: u32) -> Topology {
        let config = ScenarioConfig::new(n, false, TrafficPattern::Cbr);
        TopologyBuilder::new(&config).build().unwrap()
    }

    #[test]
    fn test_blocks_disjoint_and_every_device_addressed_once() {
        let topology = topology(5);
        let plan = AddressPlanner::default().plan(&topology).unwrap();

        let wireless = *plan.block(topology.wireless_link()).unwrap();
        let wired = *plan.block(topology.wired_link()).unwrap();
        assert!(!wireless.overlaps(&wired));

        let mut seen = std::collections::HashSet::new();
        for device in topology.devices() {
            let addr = plan.address(device.id).unwrap();
            assert!(seen.insert(addr), "{} assigned twice", addr);

            let block = plan.block(device.link).unwrap();
            assert!(block.contains(addr));
            let other = if device.link == topology.wireless_link() { wired } else { wireless };
            assert!(!other.contains(addr));
        }
    }

    #[test]
    fn test_assignment_order() {
        let topology = topology(2);
        let plan = AddressPlanner::default().plan(&topology).unwrap();

        let wl = topology.wireless_link();
        assert_eq!(
            plan.node_address(&topology, NodeId(0), wl),
            Some(Ipv4Addr::new(192, 168, 0, 1))
        );
        assert_eq!(
            plan.node_address(&topology, NodeId(1), wl),
            Some(Ipv4Addr::new(192, 168, 0, 2))
        );
        assert_eq!(
            plan.node_address(&topology, topology.access_point(), wl),
            Some(Ipv4Addr::new(192, 168, 0, 3))
        );
        assert_eq!(
            plan.node_address(&topology, topology.access_point(), topology.wired_link()),
            Some(Ipv4Addr::new(10, 1, 1, 1))
        );
        assert_eq!(plan.server_address(&topology), Some(Ipv4Addr::new(10, 1, 1, 2)));
    }

    #[test]
    fn test_overlapping_blocks_rejected() {
        let a = AddressBlock::new(Ipv4Addr::new(10, 0, 0, 0), 16).unwrap();
        let b = AddressBlock::new(Ipv4Addr::new(10, 0, 5, 0), 24).unwrap();
        assert!(a.overlaps(&b));
        assert!(matches!(
            AddressPlanner::new(a, b),
            Err(ScenarioError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_block_exhaustion() {
        let topology = topology(6);
        let tiny = AddressBlock::new(Ipv4Addr::new(172, 16, 0, 0), 29).unwrap();
        assert_eq!(tiny.usable_hosts(), 6);

        let planner = AddressPlanner::new(tiny, AddressBlock::wired_default()).unwrap();
        assert!(matches!(
            planner.plan(&topology),
            Err(ScenarioError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_misaligned_block_rejected() {
        assert!(AddressBlock::new(Ipv4Addr::new(192, 168, 0, 7), 24).is_err());
        assert!(AddressBlock::new(Ipv4Addr::new(192, 168, 0, 0), 31).is_err());
    }

    #[test]
    fn test_device_lookup_by_address() {
        let topology = topology(1);
        let plan = AddressPlanner::default().plan(&topology).unwrap();
        let server = plan.server_address(&topology).unwrap();
        let device = plan.device_for(server).unwrap();
        assert_eq!(topology.device(device).unwrap().node, topology.server());
        assert_eq!(plan.device_for(Ipv4Addr::new(8, 8, 8, 8)), None);
    }
}
