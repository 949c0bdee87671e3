//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::net::Ipv4Addr;

use derive_new::new;
use proxima_sim::time::Scheduler;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{Instance, SystemApi};
use crate::neighbor::nsm;
use crate::packet::lsa::LsaBody;
use crate::route;
use crate::tasks::TimerMsg;

// The two shortest-path levels: intra-area over Router-LSAs and
// inter-area over Area-LSAs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SpfLevel {
    L1,
    L2,
}

// First hop toward an intra-area destination router.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct NextHop {
    pub ifindex: u32,
    pub addr: Ipv4Addr,
    pub metric: u32,
}

// First hop toward a remote area in the L2 graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct L2NextHop {
    pub first_hop_area: u32,
    pub distance: u32,
}

// ===== global functions =====

// Debounced scheduling: LSDB churn within one delay window produces a
// single recomputation.
pub(crate) fn schedule<S: SystemApi>(
    instance: &mut Instance<S>,
    level: SpfLevel,
) {
    let slot = match level {
        SpfLevel::L1 => &mut instance.state.tasks.spf_l1,
        SpfLevel::L2 => &mut instance.state.tasks.spf_l2,
    };
    if slot.is_some() {
        return;
    }
    Debug::SpfScheduled(level).log();
    *slot = Some(
        instance
            .sys
            .schedule(instance.cfg.spf_delay, TimerMsg::SpfDelay(level)),
    );
}

pub(crate) fn run<S: SystemApi>(instance: &mut Instance<S>, level: SpfLevel) {
    Debug::SpfRun(level).log();
    match level {
        SpfLevel::L1 => run_l1(instance),
        SpfLevel::L2 => run_l2(instance),
    }
    route::update_routing(instance);
}

// Dijkstra over the Router LSDB. Nodes are router IDs; every router
// link contributes an edge toward its link ID (cross-area links simply
// dead-end unless a router by that number exists).
fn run_l1<S: SystemApi>(instance: &mut Instance<S>) {
    let root: u32 = instance.cfg.router_id.into();
    let lsdb = &instance.state.lsdb;

    let mut distance: HashMap<u32, u32> = HashMap::new();
    let mut prev_hop: HashMap<u32, u32> = HashMap::new();
    let mut queue = BinaryHeap::new();
    distance.insert(root, 0);
    queue.push(Reverse((0u32, root)));

    while let Some(Reverse((dist, node))) = queue.pop() {
        if distance.get(&node).is_some_and(|best| *best < dist) {
            continue;
        }
        let Some(lsa) = lsdb.router.get(&Ipv4Addr::from(node)) else {
            continue;
        };
        let LsaBody::Router(router) = &lsa.body else {
            continue;
        };
        for link in &router.links {
            let neighbor = link.link_id;
            let candidate = dist.saturating_add(link.metric as u32);
            if distance
                .get(&neighbor)
                .is_none_or(|best| candidate < *best)
            {
                distance.insert(neighbor, candidate);
                prev_hop.insert(neighbor, node);
                queue.push(Reverse((candidate, neighbor)));
            }
        }
    }

    // Resolve each reachable destination to the adjacent first-hop
    // router and the interface carrying it.
    instance.state.l1_next_hop.clear();
    let mut next_hops = BTreeMap::new();
    for dest_addr in lsdb.router.keys() {
        let dest: u32 = (*dest_addr).into();
        if dest == root || !prev_hop.contains_key(&dest) {
            continue;
        }

        let mut first_hop = dest;
        while let Some(prev) = prev_hop.get(&first_hop) {
            if *prev == root {
                break;
            }
            first_hop = *prev;
        }

        match full_adjacency(instance, Ipv4Addr::from(first_hop)) {
            Some((ifindex, addr)) => {
                next_hops.insert(
                    *dest_addr,
                    NextHop::new(ifindex, addr, distance[&dest]),
                );
            }
            None => {
                Error::SpfNexthopNotFound(Ipv4Addr::from(first_hop)).log();
            }
        }
    }
    instance.state.l1_next_hop = next_hops;

    if instance.cfg.enable_area_proxy {
        update_border_next_hops(instance);
    }
}

// Best border-router relay per remote area: the minimum over every
// reachable router's cross-area links, plus our own cross-area
// adjacencies at interface cost.
fn update_border_next_hops<S: SystemApi>(instance: &mut Instance<S>) {
    let mut border: BTreeMap<u32, (Ipv4Addr, NextHop)> = BTreeMap::new();

    for (router_id, lsa) in &instance.state.lsdb.router {
        if *router_id == instance.cfg.router_id {
            continue;
        }
        let Some(next_hop) = instance.state.l1_next_hop.get(router_id)
        else {
            continue;
        };
        let LsaBody::Router(router) = &lsa.body else {
            continue;
        };
        for link in router.cross_area_links() {
            let metric =
                next_hop.metric.saturating_add(link.metric as u32);
            if border
                .get(&link.area_id)
                .is_none_or(|(_, best)| best.metric > metric)
            {
                let mut relay = *next_hop;
                relay.metric = metric;
                border.insert(link.area_id, (*router_id, relay));
            }
        }
    }

    // This router's own cross-area interfaces count too.
    for iface in instance.arenas.interfaces.iter().skip(1) {
        for nbr_idx in iface.neighbors.values() {
            let Some(nbr) = instance.arenas.neighbors.get(*nbr_idx) else {
                continue;
            };
            if nbr.state < nsm::State::TwoWay
                || nbr.area_id == instance.cfg.area_id
            {
                continue;
            }
            let metric = iface.metric as u32;
            if border
                .get(&nbr.area_id)
                .is_none_or(|(_, best)| best.metric > metric)
            {
                border.insert(
                    nbr.area_id,
                    (
                        instance.cfg.router_id,
                        NextHop::new(iface.ifindex, nbr.addr, metric),
                    ),
                );
            }
        }
    }

    instance.state.border_next_hop = border;
}

// Dijkstra over the Area LSDB. Nodes are area IDs.
fn run_l2<S: SystemApi>(instance: &mut Instance<S>) {
    let root = instance.cfg.area_id;
    let lsdb = &instance.state.lsdb;

    let mut distance: HashMap<u32, u32> = HashMap::new();
    let mut prev_hop: HashMap<u32, u32> = HashMap::new();
    let mut queue = BinaryHeap::new();
    distance.insert(root, 0);
    queue.push(Reverse((0u32, root)));

    while let Some(Reverse((dist, node))) = queue.pop() {
        if distance.get(&node).is_some_and(|best| *best < dist) {
            continue;
        }
        let Some(lsa) = lsdb.area.get(&node) else {
            continue;
        };
        let LsaBody::Area(area) = &lsa.body else {
            continue;
        };
        for link in &area.links {
            let neighbor = link.area_id;
            let candidate = dist.saturating_add(link.metric as u32);
            if distance
                .get(&neighbor)
                .is_none_or(|best| candidate < *best)
            {
                distance.insert(neighbor, candidate);
                prev_hop.insert(neighbor, node);
                queue.push(Reverse((candidate, neighbor)));
            }
        }
    }

    let mut next_hops = BTreeMap::new();
    for area_id in lsdb.area.keys() {
        if *area_id == root || !prev_hop.contains_key(area_id) {
            continue;
        }

        let mut first_hop = *area_id;
        while let Some(prev) = prev_hop.get(&first_hop) {
            if *prev == root {
                break;
            }
            first_hop = *prev;
        }

        next_hops.insert(
            *area_id,
            L2NextHop::new(first_hop, distance[area_id]),
        );
    }
    instance.state.l2_next_hop = next_hops;
}

// Locate a Full adjacency whose router ID matches the first-hop
// router.
fn full_adjacency<S: SystemApi>(
    instance: &Instance<S>,
    router_id: Ipv4Addr,
) -> Option<(u32, Ipv4Addr)> {
    for iface in instance.arenas.interfaces.iter().skip(1) {
        for nbr_idx in iface.neighbors.values() {
            let Some(nbr) = instance.arenas.neighbors.get(*nbr_idx) else {
                continue;
            };
            if nbr.state == nsm::State::Full && nbr.router_id == router_id {
                return Some((iface.ifindex, nbr.addr));
            }
        }
    }
    None
}
