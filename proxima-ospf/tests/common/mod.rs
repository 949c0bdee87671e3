//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Multi-router test fixture on top of the deterministic event fabric.

use std::net::Ipv4Addr;
use std::time::Duration;

use proxima_ospf::instance::{Instance, InstanceCfg, ProtocolMsg};
use proxima_ospf::tasks::TimerMsg;
use proxima_sim::device::DeviceInfo;
use proxima_sim::rib::RouteEntry;
use proxima_sim::testing::{NodeIo, SimEvent, SimNet};

pub struct TestNet {
    pub sim: SimNet<TimerMsg>,
    pub routers: Vec<Instance<NodeIo<TimerMsg>>>,
}

impl TestNet {
    pub fn new(seed: u64) -> TestNet {
        TestNet {
            sim: SimNet::new(seed),
            routers: Vec::new(),
        }
    }

    pub fn add_router(
        &mut self,
        cfg: InstanceCfg,
        devices: Vec<DeviceInfo>,
    ) -> usize {
        let io = self.sim.add_node(devices);
        self.routers.push(Instance::new(cfg, io));
        self.routers.len() - 1
    }

    pub fn connect(&mut self, a: (usize, u32), b: (usize, u32)) {
        self.sim.connect(a, b, Duration::from_millis(1));
    }

    /// Bind devices and bring every router up. Call after all links
    /// are wired so point-to-point gateways are learned.
    pub fn start(&mut self) {
        for router in &mut self.routers {
            router.set_bound_devices();
            router.start().expect("router startup failed");
        }
    }

    /// Drive the fabric until the given absolute simulation time.
    pub fn run_until(&mut self, until: Duration) {
        while let Some((node, event)) = self.sim.poll(until) {
            let msg = match event {
                SimEvent::Timer(msg) => ProtocolMsg::Timer(msg),
                SimEvent::Packet { ifindex, data } => {
                    ProtocolMsg::NetRxPacket { ifindex, data }
                }
            };
            self.routers[node].dispatch(msg);
        }
    }

    pub fn routes(&self, node: usize) -> Vec<RouteEntry> {
        self.sim.routes(node)
    }

    pub fn find_route(
        &self,
        node: usize,
        dest: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Option<RouteEntry> {
        self.routes(node)
            .into_iter()
            .find(|route| route.dest == dest && route.mask == mask)
    }

    /// Number of neighbors a router currently knows across all its
    /// interfaces.
    pub fn neighbor_count(&self, node: usize) -> usize {
        self.routers[node]
            .arenas
            .interfaces
            .iter()
            .map(|iface| iface.neighbors.len())
            .sum()
    }

    /// Whether the router has a Full adjacency to the given router ID.
    pub fn has_full_adjacency(&self, node: usize, router_id: Ipv4Addr) -> bool {
        use proxima_ospf::neighbor::nsm;
        self.routers[node].arenas.interfaces.iter().any(|iface| {
            iface.neighbors.iter().any(|(key, nbr_idx)| {
                key.router_id == router_id
                    && self.routers[node]
                        .arenas
                        .neighbors
                        .get(*nbr_idx)
                        .is_some_and(|nbr| nbr.state == nsm::State::Full)
            })
        })
    }
}

/// A /30 point-to-point device.
pub fn p2p_device(ifindex: u32, addr: Ipv4Addr) -> DeviceInfo {
    DeviceInfo {
        ifindex,
        addr,
        mask: Ipv4Addr::new(255, 255, 255, 252),
        mtu: 1500,
        up: true,
        point_to_point: true,
        peer: None,
    }
}

/// A device table: loopback placeholder plus the given interfaces.
pub fn devices(ifaces: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    let mut devices = vec![DeviceInfo::loopback()];
    devices.extend(ifaces);
    devices
}

pub fn router_cfg(router_id: Ipv4Addr, node_name: &str) -> InstanceCfg {
    InstanceCfg {
        router_id,
        node_name: node_name.to_owned(),
        ..Default::default()
    }
}

/// Short timers for tests that exercise failure and recovery paths.
pub fn fast_cfg(router_id: Ipv4Addr, node_name: &str) -> InstanceCfg {
    InstanceCfg {
        router_id,
        node_name: node_name.to_owned(),
        hello_interval: Duration::from_millis(100),
        dead_interval: Duration::from_millis(300),
        rxmt_interval: Duration::from_millis(200),
        spf_delay: Duration::from_millis(100),
        ..Default::default()
    }
}

pub fn addr(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}

pub const MASK_30: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 252);

/// Inject one /30 prefix as an external route.
pub fn inject_prefix(
    net: &mut TestNet,
    node: usize,
    ifindex: u32,
    network: Ipv4Addr,
) {
    let network = ipnetwork::Ipv4Network::with_netmask(network, MASK_30)
        .expect("valid /30 network");
    net.routers[node].add_external_route(
        ifindex,
        network,
        Ipv4Addr::UNSPECIFIED,
        0,
    );
}
