//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Deterministic single-threaded event fabric for integration tests.
//!
//! The fabric owns the clock, the event queue, the point-to-point links
//! and the per-node host state (devices, routing table, RNG). Tests pop
//! events one at a time and feed them into the instance under test, so
//! a whole multi-router run is an ordinary deterministic loop.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::device::{DeviceInfo, DeviceSet};
use crate::rib::{RouteEntry, RouteTable};
use crate::rng::UniformRng;
use crate::socket::{PacketIo, SocketBind, SocketHandle};
use crate::time::{Clock, Scheduler, TimerHandle};

/// Event handed back to the test driver.
#[derive(Debug)]
pub enum SimEvent<M> {
    Timer(M),
    Packet { ifindex: u32, data: Bytes },
}

/// Per-node view of the fabric, implementing every collaborator trait
/// the engine consumes.
pub struct NodeIo<M> {
    world: Rc<RefCell<World<M>>>,
    node: usize,
}

/// The shared simulation world.
pub struct SimNet<M> {
    world: Rc<RefCell<World<M>>>,
}

struct World<M> {
    now: Duration,
    seq: u64,
    next_id: u64,
    queue: BinaryHeap<Reverse<EventEntry<M>>>,
    cancelled: HashSet<TimerHandle>,
    nodes: Vec<SimNode>,
    links: Vec<SimLink>,
    sockets: HashMap<SocketHandle, SocketInfo>,
    // Base seed; node RNGs derive from it so late-added nodes stay
    // reproducible.
    seed: u64,
}

struct SimNode {
    devices: Vec<DeviceInfo>,
    routes: Vec<RouteEntry>,
    rng: SmallRng,
}

struct SimLink {
    a: (usize, u32),
    b: (usize, u32),
    delay: Duration,
}

#[derive(Clone, Copy)]
struct SocketInfo {
    node: usize,
    ifindex: u32,
    closed: bool,
}

struct EventEntry<M> {
    time: Duration,
    seq: u64,
    node: usize,
    kind: EventKind<M>,
}

enum EventKind<M> {
    Timer { handle: TimerHandle, msg: M },
    Packet { ifindex: u32, data: Bytes },
}

// Events are ordered by (time, insertion sequence) only.
impl<M> PartialEq for EventEntry<M> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<M> Eq for EventEntry<M> {}

impl<M> PartialOrd for EventEntry<M> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for EventEntry<M> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

// ===== impl SimNet =====

impl<M> SimNet<M> {
    pub fn new(seed: u64) -> SimNet<M> {
        SimNet {
            world: Rc::new(RefCell::new(World {
                now: Duration::ZERO,
                seq: 0,
                next_id: 1,
                queue: BinaryHeap::new(),
                cancelled: HashSet::new(),
                nodes: Vec::new(),
                links: Vec::new(),
                sockets: HashMap::new(),
                seed,
            })),
        }
    }

    /// Register a node with its device table (index 0 must be the
    /// loopback placeholder) and return its collaborator view.
    pub fn add_node(&self, devices: Vec<DeviceInfo>) -> NodeIo<M> {
        let mut world = self.world.borrow_mut();
        let seed = world.seed.wrapping_add(world.nodes.len() as u64);
        world.nodes.push(SimNode {
            devices,
            routes: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        });
        NodeIo {
            world: self.world.clone(),
            node: world.nodes.len() - 1,
        }
    }

    /// Wire a point-to-point link between two node devices and teach
    /// both ends the peer address.
    pub fn connect(
        &self,
        a: (usize, u32),
        b: (usize, u32),
        delay: Duration,
    ) {
        let mut world = self.world.borrow_mut();
        let addr_a = world.nodes[a.0].devices[a.1 as usize].addr;
        let addr_b = world.nodes[b.0].devices[b.1 as usize].addr;
        world.nodes[a.0].devices[a.1 as usize].peer = Some(addr_b);
        world.nodes[b.0].devices[b.1 as usize].peer = Some(addr_a);
        world.links.push(SimLink { a, b, delay });
    }

    /// Flip the administrative state of a device.
    pub fn set_device_up(&self, node: usize, ifindex: u32, up: bool) {
        let mut world = self.world.borrow_mut();
        world.nodes[node].devices[ifindex as usize].up = up;
    }

    /// Read a node's routing table.
    pub fn routes(&self, node: usize) -> Vec<RouteEntry> {
        self.world.borrow().nodes[node].routes.clone()
    }

    pub fn now(&self) -> Duration {
        self.world.borrow().now
    }

    /// Pop the next event at or before `until`, advancing the clock.
    /// Returns `None` once the queue holds nothing due before `until`,
    /// leaving the clock at `until`.
    pub fn poll(&self, until: Duration) -> Option<(usize, SimEvent<M>)> {
        loop {
            let entry = {
                let mut world = self.world.borrow_mut();
                let due = world
                    .queue
                    .peek()
                    .map(|Reverse(entry)| entry.time)
                    .filter(|time| *time <= until);
                match due {
                    Some(_) => {
                        let Reverse(entry) = world.queue.pop().unwrap();
                        world.now = entry.time;
                        entry
                    }
                    None => {
                        world.now = until;
                        return None;
                    }
                }
            };
            match entry.kind {
                EventKind::Timer { handle, msg } => {
                    let cancelled = self
                        .world
                        .borrow_mut()
                        .cancelled
                        .remove(&handle);
                    if !cancelled {
                        return Some((entry.node, SimEvent::Timer(msg)));
                    }
                }
                EventKind::Packet { ifindex, data } => {
                    return Some((
                        entry.node,
                        SimEvent::Packet { ifindex, data },
                    ));
                }
            }
        }
    }
}

// ===== impl World =====

impl<M> World<M> {
    fn push(&mut self, time: Duration, node: usize, kind: EventKind<M>) {
        self.seq += 1;
        let seq = self.seq;
        self.queue.push(Reverse(EventEntry {
            time,
            seq,
            node,
            kind,
        }));
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

// ===== impl NodeIo =====

impl<M> Clock for NodeIo<M> {
    fn now(&self) -> Duration {
        self.world.borrow().now
    }
}

impl<M> Scheduler<M> for NodeIo<M> {
    fn schedule(&self, delay: Duration, msg: M) -> TimerHandle {
        let mut world = self.world.borrow_mut();
        let handle = world.alloc_id();
        let time = world.now + delay;
        world.push(time, self.node, EventKind::Timer { handle, msg });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.world.borrow_mut().cancelled.insert(handle);
    }
}

impl<M> PacketIo for NodeIo<M> {
    fn open(
        &self,
        ifindex: u32,
        _bind: SocketBind,
    ) -> Result<SocketHandle, std::io::Error> {
        let mut world = self.world.borrow_mut();
        if world.nodes[self.node]
            .devices
            .get(ifindex as usize)
            .is_none()
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such device: {ifindex}"),
            ));
        }
        let handle = world.alloc_id();
        world.sockets.insert(
            handle,
            SocketInfo {
                node: self.node,
                ifindex,
                closed: false,
            },
        );
        Ok(handle)
    }

    fn send_to(
        &self,
        socket: SocketHandle,
        _dst: Ipv4Addr,
        data: Bytes,
    ) -> Result<(), std::io::Error> {
        let mut world = self.world.borrow_mut();
        let Some(info) = world.sockets.get(&socket).copied() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket not open",
            ));
        };
        if info.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket closed",
            ));
        }
        // Sends on a down device vanish on the wire.
        if !world.nodes[info.node].devices[info.ifindex as usize].up {
            return Ok(());
        }
        // Deliver to the peer endpoint of the attached link, if any.
        let link = world.links.iter().find_map(|link| {
            if link.a == (info.node, info.ifindex) {
                Some((link.b, link.delay))
            } else if link.b == (info.node, info.ifindex) {
                Some((link.a, link.delay))
            } else {
                None
            }
        });
        if let Some(((peer_node, peer_ifindex), delay)) = link {
            if world.nodes[peer_node].devices[peer_ifindex as usize].up {
                let time = world.now + delay;
                world.push(
                    time,
                    peer_node,
                    EventKind::Packet {
                        ifindex: peer_ifindex,
                        data,
                    },
                );
            }
        }
        Ok(())
    }

    fn close(&self, socket: SocketHandle) {
        if let Some(info) =
            self.world.borrow_mut().sockets.get_mut(&socket)
        {
            info.closed = true;
        }
    }
}

impl<M> DeviceSet for NodeIo<M> {
    fn devices(&self) -> Vec<DeviceInfo> {
        self.world.borrow().nodes[self.node].devices.clone()
    }

    fn device(&self, ifindex: u32) -> Option<DeviceInfo> {
        self.world.borrow().nodes[self.node]
            .devices
            .get(ifindex as usize)
            .cloned()
    }
}

impl<M> RouteTable for NodeIo<M> {
    fn add_network_route(&self, entry: RouteEntry) {
        self.world.borrow_mut().nodes[self.node].routes.push(entry);
    }

    fn remove_route(&self, index: u32) {
        let mut world = self.world.borrow_mut();
        let routes = &mut world.nodes[self.node].routes;
        if (index as usize) < routes.len() {
            routes.remove(index as usize);
        }
    }

    fn n_routes(&self) -> u32 {
        self.world.borrow().nodes[self.node].routes.len() as u32
    }

    fn route(&self, index: u32) -> Option<RouteEntry> {
        self.world.borrow().nodes[self.node]
            .routes
            .get(index as usize)
            .copied()
    }
}

impl<M> UniformRng for NodeIo<M> {
    fn rand_u32(&self) -> u32 {
        self.world.borrow_mut().nodes[self.node].rng.random()
    }

    fn rand_range(&self, lo: u64, hi: u64) -> u64 {
        self.world.borrow_mut().nodes[self.node]
            .rng
            .random_range(lo..hi)
    }
}
