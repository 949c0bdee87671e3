//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use proxima_sim::device::DeviceInfo;

use crate::collections::{Arena, NeighborIndex, NeighborKey};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{LsaRouterLink, LsaRouterLinkType};

// Per-bound-device interface record.
//
// Index 0 is the loopback placeholder and never participates in the
// protocol; every table indexed by IfIndex mirrors that convention.
#[derive(Debug)]
pub struct Interface {
    pub ifindex: u32,
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    // Learned peer address on point-to-point channels, broadcast
    // placeholder on multi-access ones.
    pub gateway: Ipv4Addr,
    // Hello interval in milliseconds, as carried on the wire.
    pub hello_interval: u16,
    // Router dead interval in milliseconds, as carried on the wire.
    pub dead_interval: u32,
    pub area_id: u32,
    pub metric: u16,
    pub mtu: u16,
    // Administratively and operationally usable. A down interface keeps
    // its neighbor records but stops owning sockets.
    pub up: bool,
    pub neighbors: std::collections::BTreeMap<NeighborKey, NeighborIndex>,
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(
        device: &DeviceInfo,
        hello_interval: u16,
        dead_interval: u32,
        area_id: u32,
        metric: u16,
    ) -> Interface {
        let gateway = match device.peer {
            Some(peer) => peer,
            None => Ipv4Addr::BROADCAST,
        };

        Interface {
            ifindex: device.ifindex,
            addr: device.addr,
            mask: device.mask,
            gateway,
            hello_interval,
            dead_interval,
            area_id,
            metric,
            mtu: device.mtu,
            up: device.up,
            neighbors: Default::default(),
        }
    }

    // The loopback placeholder occupying index 0.
    pub(crate) fn placeholder() -> Interface {
        Interface {
            ifindex: 0,
            addr: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::BROADCAST,
            gateway: Ipv4Addr::UNSPECIFIED,
            hello_interval: 0,
            dead_interval: 0,
            area_id: 0,
            metric: 0,
            mtu: 0,
            up: false,
            neighbors: Default::default(),
        }
    }

    pub(crate) fn add_neighbor(
        &mut self,
        arena: &mut Arena<Neighbor>,
        router_id: Ipv4Addr,
        addr: Ipv4Addr,
        area_id: u32,
        state: nsm::State,
        dd_seq_no: u32,
    ) -> NeighborIndex {
        let nbr = Neighbor::new(router_id, addr, area_id, state, dd_seq_no);
        let nbr_idx = arena.insert(nbr);
        self.neighbors
            .insert(NeighborKey::new(router_id, addr), nbr_idx);
        nbr_idx
    }

    pub fn get_neighbor(
        &self,
        key: &NeighborKey,
    ) -> Option<NeighborIndex> {
        self.neighbors.get(key).copied()
    }

    pub fn is_neighbor(&self, key: &NeighborKey) -> bool {
        self.neighbors.contains_key(key)
    }

    pub(crate) fn remove_neighbor(
        &mut self,
        arena: &mut Arena<Neighbor>,
        key: &NeighborKey,
    ) -> Option<Neighbor> {
        let nbr_idx = self.neighbors.remove(key)?;
        arena.remove(nbr_idx)
    }

    pub(crate) fn clear_neighbors(&mut self, arena: &mut Arena<Neighbor>) {
        for (_, nbr_idx) in std::mem::take(&mut self.neighbors) {
            arena.remove(nbr_idx);
        }
    }

    // Router links for every Full neighbor: type 1 when the neighbor
    // shares this interface's area, type 5 (cross-area) otherwise.
    pub fn active_router_links(
        &self,
        arena: &Arena<Neighbor>,
    ) -> Vec<LsaRouterLink> {
        let mut links = vec![];
        for nbr_idx in self.neighbors.values() {
            let Some(nbr) = arena.get(*nbr_idx) else {
                continue;
            };
            if nbr.state != nsm::State::Full {
                continue;
            }
            let link = if nbr.area_id == self.area_id {
                LsaRouterLink::new(
                    LsaRouterLinkType::PointToPoint,
                    nbr.router_id.into(),
                    self.addr,
                    self.metric,
                )
            } else {
                LsaRouterLink::new(
                    LsaRouterLinkType::CrossArea,
                    nbr.area_id,
                    self.addr,
                    self.metric,
                )
            };
            links.push(link);
        }
        links
    }
}
