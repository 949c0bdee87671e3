//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use proxima_sim::device::DeviceSet;
use proxima_sim::rib::RouteTable;
use proxima_sim::rng::UniformRng;
use proxima_sim::socket::PacketIo;
use proxima_sim::time::{Scheduler, TimerHandle};
use serde::{Deserialize, Serialize};

use crate::area;
use crate::collections::Arena;
use crate::debug::Debug;
use crate::error::Error;
use crate::events;
use crate::interface::Interface;
use crate::logging::LogFiles;
use crate::lsdb::{self, LsdbSet};
use crate::neighbor::Neighbor;
use crate::network::{self, SocketSet};
use crate::packet::lsa::{Lsa, LsaKey};
use crate::route;
use crate::spf::{self, L2NextHop, NextHop, SpfLevel};
use crate::tasks::{self, TimerMsg};

/// Everything the engine consumes from its host, rolled into one bound.
pub trait SystemApi:
    Scheduler<TimerMsg> + PacketIo + RouteTable + DeviceSet + UniformRng
{
}

impl<T> SystemApi for T where
    T: Scheduler<TimerMsg> + PacketIo + RouteTable + DeviceSet + UniformRng
{
}

/// Messages delivered by the host into the instance's event loop.
#[derive(Debug)]
pub enum ProtocolMsg {
    /// A raw IPv4 datagram arrived on the given interface.
    NetRxPacket { ifindex: u32, data: Bytes },
    /// A previously scheduled timer fired.
    Timer(TimerMsg),
}

// Configuration attributes. All timing attributes are overridable; the
// defaults match the protocol's well-known values.
#[derive(Clone, Debug)]
pub struct InstanceCfg {
    pub router_id: Ipv4Addr,
    pub area_id: u32,
    // Label used for snapshot and log file names.
    pub node_name: String,
    pub hello_addr: Ipv4Addr,
    pub lsa_addr: Ipv4Addr,
    pub hello_interval: Duration,
    pub dead_interval: Duration,
    // Retransmission interval for DBD/LSR/LSU.
    pub rxmt_interval: Duration,
    pub spf_delay: Duration,
    // Minimum interval between successive originations of one LSA key.
    // Zero disables throttling.
    pub min_ls_interval: Duration,
    pub initial_hello_delay: Duration,
    pub area_mask: Ipv4Addr,
    pub enable_area_proxy: bool,
    pub auto_sync_interfaces: bool,
    // Zero means a single sync at start.
    pub interface_sync_interval: Duration,
    pub log_dir: Option<PathBuf>,
    pub enable_packet_log: bool,
    pub include_hello_in_packet_log: bool,
    pub enable_lsa_timing_log: bool,
    pub reset_state_on_disable: bool,
    pub enable_checksum: bool,
}

// Prefix injected locally and advertised through the L1-Summary-LSA.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ExternalRoute {
    pub ifindex: u32,
    pub network: Ipv4Network,
    pub gateway: Ipv4Addr,
    pub metric: u32,
}

// Per-router control block. One of these exists per simulated router
// and is passed (by reference) to every subcomponent.
pub struct Instance<S: SystemApi> {
    pub cfg: InstanceCfg,
    pub state: InstanceState,
    pub arenas: InstanceArenas,
    pub sys: S,
}

pub struct InstanceArenas {
    // Indexed by IfIndex; entry 0 is the loopback placeholder.
    pub interfaces: Vec<Interface>,
    pub neighbors: Arena<Neighbor>,
}

pub struct InstanceState {
    // Set while the instance is running (between start and stop); the
    // routing installer is a no-op before startup captures the host
    // table's static base.
    pub active: bool,
    pub enabled: bool,
    // Cleared by a snapshot import so the imported state is the
    // starting point instead of fresh originations.
    pub do_initialize: bool,
    pub is_area_leader: bool,
    pub lsdb: LsdbSet,
    pub external_routes: Vec<ExternalRoute>,
    // Derived caches, rebuilt by the SPF runs.
    pub l1_next_hop: BTreeMap<Ipv4Addr, NextHop>,
    pub l2_next_hop: BTreeMap<u32, L2NextHop>,
    pub border_next_hop: BTreeMap<u32, (Ipv4Addr, NextHop)>,
    pub sockets: SocketSet,
    // Host routing table size at start; everything past it is ours.
    pub base_routes: u32,
    pub tasks: InstanceTasks,
    pub logs: LogFiles,
}

#[derive(Debug, Default)]
pub struct InstanceTasks {
    pub hello: Option<TimerHandle>,
    pub spf_l1: Option<TimerHandle>,
    pub spf_l2: Option<TimerHandle>,
    pub leader_attempt: Option<TimerHandle>,
    pub iface_sync: Option<TimerHandle>,
    pub delayed_orig: BTreeMap<LsaKey, TimerHandle>,
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            router_id: Ipv4Addr::UNSPECIFIED,
            area_id: 0,
            node_name: "router".to_owned(),
            hello_addr: Ipv4Addr::new(224, 0, 0, 5),
            lsa_addr: Ipv4Addr::new(224, 0, 0, 6),
            hello_interval: Duration::from_secs(10),
            dead_interval: Duration::from_secs(30),
            rxmt_interval: Duration::from_secs(5),
            spf_delay: Duration::from_secs(5),
            min_ls_interval: Duration::ZERO,
            initial_hello_delay: Duration::ZERO,
            area_mask: Ipv4Addr::new(255, 255, 0, 0),
            enable_area_proxy: false,
            auto_sync_interfaces: false,
            interface_sync_interval: Duration::ZERO,
            log_dir: None,
            enable_packet_log: false,
            include_hello_in_packet_log: false,
            enable_lsa_timing_log: false,
            reset_state_on_disable: false,
            enable_checksum: false,
        }
    }
}

// ===== impl Instance =====

impl<S: SystemApi> Instance<S> {
    pub fn new(cfg: InstanceCfg, sys: S) -> Instance<S> {
        Instance {
            cfg,
            state: InstanceState {
                active: false,
                enabled: true,
                do_initialize: true,
                is_area_leader: false,
                lsdb: Default::default(),
                external_routes: Vec::new(),
                l1_next_hop: Default::default(),
                l2_next_hop: Default::default(),
                border_next_hop: Default::default(),
                sockets: Default::default(),
                base_routes: 0,
                tasks: Default::default(),
                logs: Default::default(),
            },
            arenas: InstanceArenas {
                interfaces: Vec::new(),
                neighbors: Default::default(),
            },
            sys,
        }
    }

    pub fn router_id(&self) -> Ipv4Addr {
        self.cfg.router_id
    }

    /// Register the host's bound devices as protocol interfaces. Index
    /// 0 must be the loopback placeholder. Point-to-point interfaces
    /// learn their gateway from the device's peer address.
    pub fn set_bound_devices(&mut self) {
        let devices = self.sys.devices();
        let mut interfaces = Vec::with_capacity(devices.len());
        interfaces.push(Interface::placeholder());
        for device in devices.iter().filter(|device| device.ifindex != 0) {
            interfaces.push(Interface::new(
                device,
                self.cfg.hello_interval.as_millis() as u16,
                self.cfg.dead_interval.as_millis() as u32,
                self.cfg.area_id,
                1,
            ));
        }
        self.arenas.interfaces = interfaces;
    }

    /// Override the per-interface routing metrics. The vector must
    /// cover every interface, the placeholder included.
    pub fn set_metrics(&mut self, metrics: Vec<u16>) {
        assert_eq!(
            metrics.len(),
            self.arenas.interfaces.len(),
            "metric count must match the number of interfaces",
        );
        for (iface, metric) in
            self.arenas.interfaces.iter_mut().zip(metrics)
        {
            iface.metric = metric;
        }
    }

    /// Move every interface (and the instance) into the given area.
    pub fn set_area(&mut self, area_id: u32) {
        self.cfg.area_id = area_id;
        for iface in self.arenas.interfaces.iter_mut().skip(1) {
            iface.area_id = area_id;
        }
    }

    pub fn set_area_leader(&mut self, is_leader: bool) {
        self.state.is_area_leader = is_leader;
    }

    pub fn set_do_initialize(&mut self, do_initialize: bool) {
        self.state.do_initialize = do_initialize;
    }

    /// Bring the instance up: open sockets, start the Hello protocol
    /// and originate the initial LSAs. Fails only when a raw socket
    /// cannot be bound, which is a configuration bug.
    pub fn start(&mut self) -> Result<(), Error> {
        Debug::InstanceStart.log();

        self.state.logs = LogFiles::init(&self.cfg);
        self.state.base_routes = self.sys.n_routes();
        self.state.active = true;

        // Learn initial interface state from the host before creating
        // sockets; with a zero sync interval this is the only sync.
        if self.cfg.auto_sync_interfaces {
            self.sync_interfaces();
            if !self.cfg.interface_sync_interval.is_zero() {
                self.state.tasks.iface_sync = Some(tasks::schedule(
                    &self.sys,
                    &self.sys,
                    self.cfg.interface_sync_interval,
                    TimerMsg::InterfaceSync,
                ));
            }
        }

        network::start_interfaces(self)?;

        self.state.tasks.hello = Some(tasks::schedule(
            &self.sys,
            &self.sys,
            self.cfg.initial_hello_delay,
            TimerMsg::HelloInterval,
        ));

        if self.state.do_initialize {
            lsdb::throttled_originate_l1_summary(self);
            if self.cfg.enable_area_proxy {
                area::schedule_initial_attempt(self);
            }
        } else {
            spf::run(self, SpfLevel::L1);
            spf::run(self, SpfLevel::L2);
        }

        Ok(())
    }

    /// Tear the instance down, cancelling every timer and closing all
    /// sockets.
    pub fn stop(&mut self) {
        Debug::InstanceStop.log();
        self.state.active = false;
        self.cancel_all_timers();
        network::close_sockets(self);
        self.state.logs.close();
    }

    /// Stop all transmission and timers but keep the link-state
    /// databases. With `ResetStateOnDisable`, adjacency state and the
    /// installed routes are cleared as well. Idempotent.
    pub fn disable(&mut self) {
        if !self.state.enabled {
            return;
        }
        Debug::InstanceDisable.log();
        self.state.enabled = false;
        self.cancel_all_timers();
        network::close_sockets(self);

        if self.cfg.reset_state_on_disable {
            let InstanceArenas {
                interfaces,
                neighbors,
            } = &mut self.arenas;
            for iface in interfaces.iter_mut() {
                iface.clear_neighbors(neighbors);
            }
            self.state.l1_next_hop.clear();
            self.state.l2_next_hop.clear();
            self.state.border_next_hop.clear();
            route::uninstall_all(self);
        }
    }

    /// Resume after `disable()`. Idempotent.
    pub fn enable(&mut self) {
        if self.state.enabled {
            return;
        }
        Debug::InstanceEnable.log();
        self.state.enabled = true;
        if let Err(error) = network::start_interfaces(self) {
            error.log();
        }
        self.state.tasks.hello = Some(tasks::schedule(
            &self.sys,
            &self.sys,
            self.cfg.initial_hello_delay,
            TimerMsg::HelloInterval,
        ));
        if self.cfg.auto_sync_interfaces
            && !self.cfg.interface_sync_interval.is_zero()
        {
            self.state.tasks.iface_sync = Some(tasks::schedule(
                &self.sys,
                &self.sys,
                self.cfg.interface_sync_interval,
                TimerMsg::InterfaceSync,
            ));
        }
    }

    /// Host entry point: feed one received packet or fired timer into
    /// the protocol.
    pub fn dispatch(&mut self, msg: ProtocolMsg) {
        if !self.state.enabled {
            return;
        }
        match msg {
            ProtocolMsg::NetRxPacket { ifindex, data } => {
                if let Err(error) = network::read_packet(self, ifindex, data)
                {
                    error.log();
                }
            }
            ProtocolMsg::Timer(msg) => {
                events::process_timer(self, msg);
            }
        }
    }

    /// Inject a locally reachable prefix. It is advertised to the area
    /// through the L1-Summary-LSA.
    pub fn add_external_route(
        &mut self,
        ifindex: u32,
        network: Ipv4Network,
        gateway: Ipv4Addr,
        metric: u32,
    ) {
        self.state.external_routes.push(ExternalRoute {
            ifindex,
            network,
            gateway,
            metric,
        });
        lsdb::throttled_originate_l1_summary(self);
    }

    /// Replace the whole injected prefix set. Returns whether the set
    /// changed (and was therefore reflooded).
    pub fn set_external_routes(
        &mut self,
        routes: Vec<ExternalRoute>,
    ) -> bool {
        if self.state.external_routes == routes {
            return false;
        }
        self.state.external_routes = routes;
        lsdb::throttled_originate_l1_summary(self);
        true
    }

    /// Advertise the connected networks of every other interface via
    /// the given one.
    pub fn add_all_reachable(&mut self, ifindex: u32) {
        let mut routes = Vec::new();
        for iface in self.arenas.interfaces.iter().skip(1) {
            if iface.ifindex == ifindex {
                continue;
            }
            let network =
                Ipv4Network::with_netmask(iface.addr, iface.mask)
                    .expect("interface mask is a valid netmask");
            routes.push((network, iface.addr));
        }
        for (network, gateway) in routes {
            self.state.external_routes.push(ExternalRoute {
                ifindex,
                network,
                gateway,
                metric: 0,
            });
        }
        lsdb::throttled_originate_l1_summary(self);
    }

    /// Remove a previously injected prefix.
    pub fn remove_external_route(&mut self, network: Ipv4Network) {
        let before = self.state.external_routes.len();
        self.state
            .external_routes
            .retain(|route| route.network != network);
        if self.state.external_routes.len() != before {
            lsdb::throttled_originate_l1_summary(self);
        }
    }

    /// Feed externally supplied LSAs straight into the processor, as
    /// if they had arrived in an LS Update.
    pub fn inject_lsas(&mut self, lsas: Vec<Lsa>) {
        for lsa in lsas {
            events::process_lsa(self, lsa);
        }
    }

    /// Write the four snapshot files (`<node>.meta`, `.lsdb`,
    /// `.neighbors`, `.prefixes`) under `dir`.
    pub fn export_ospf(&self, dir: &std::path::Path) -> Result<(), Error> {
        crate::snapshot::export_ospf(self, dir)
    }

    /// Load a previously exported snapshot. On any truncated or
    /// mismatched file the import is refused and current state is left
    /// intact. A successful import suppresses the initial origination
    /// so the imported databases are the starting point.
    pub fn import_ospf(&mut self, dir: &std::path::Path) -> Result<(), Error> {
        crate::snapshot::import_ospf(self, dir).inspect_err(|error| {
            error.log();
        })
    }

    // Poll the host device set and mirror up/down transitions onto the
    // protocol interfaces.
    pub(crate) fn sync_interfaces(&mut self) {
        let devices = self.sys.devices();
        let mut transitions = Vec::new();
        for device in devices.iter().filter(|device| device.ifindex != 0) {
            let Some(iface) = self
                .arenas
                .interfaces
                .get_mut(device.ifindex as usize)
            else {
                continue;
            };
            if iface.up != device.up {
                iface.up = device.up;
                transitions.push((device.ifindex, device.up));
            }
        }
        for (ifindex, up) in transitions {
            if up {
                Debug::InterfaceUp(ifindex).log();
                if let Err(error) = network::open_interface(self, ifindex) {
                    error.log();
                }
            } else {
                Debug::InterfaceDown(ifindex).log();
                network::close_interface(self, ifindex);
            }
        }
    }

    fn cancel_all_timers(&mut self) {
        let tasks = std::mem::take(&mut self.state.tasks);
        for handle in tasks
            .hello
            .into_iter()
            .chain(tasks.spf_l1)
            .chain(tasks.spf_l2)
            .chain(tasks.leader_attempt)
            .chain(tasks.iface_sync)
            .chain(tasks.delayed_orig.into_values())
        {
            self.sys.cancel(handle);
        }

        let InstanceArenas {
            interfaces,
            neighbors,
        } = &mut self.arenas;
        for iface in interfaces.iter() {
            for nbr_idx in iface.neighbors.values() {
                if let Some(nbr) = neighbors.get_mut(*nbr_idx) {
                    let nbr_tasks = std::mem::take(&mut nbr.tasks);
                    for handle in nbr_tasks
                        .dead_timer
                        .into_iter()
                        .chain(nbr_tasks.rxmt)
                        .chain(nbr_tasks.ls_rxmt.into_values())
                    {
                        self.sys.cancel(handle);
                    }
                }
            }
        }
    }
}
