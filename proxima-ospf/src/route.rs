//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use proxima_sim::rib::{RouteEntry, RouteTable};

use crate::instance::{Instance, SystemApi};
use crate::packet::lsa::LsaBody;

// (network, mask) -> (gateway, ifindex, metric).
type BestDest = BTreeMap<(Ipv4Addr, Ipv4Addr), (Ipv4Addr, u32, u32)>;

// Rebuild the engine-owned suffix of the host routing table from the
// current next-hop caches and summary databases. L1 routes always win
// over L2 routes; ties within a level keep the first lowest-metric
// entry seen (no ECMP).
pub(crate) fn update_routing<S: SystemApi>(instance: &mut Instance<S>) {
    if !instance.state.active {
        return;
    }
    uninstall_all(instance);

    // L1: locally injected prefixes first, then every reachable
    // router's summary through its computed next hop.
    let mut best: BestDest = BTreeMap::new();
    for route in &instance.state.external_routes {
        best.insert(
            (route.network.network(), route.network.mask()),
            (Ipv4Addr::UNSPECIFIED, route.ifindex, route.metric),
        );
    }

    for (router_id, next_hop) in &instance.state.l1_next_hop {
        let Some(lsa) = instance.state.lsdb.l1_summary.get(router_id)
        else {
            continue;
        };
        let LsaBody::L1Summary(summary) = &lsa.body else {
            continue;
        };
        for route in &summary.routes {
            let key = (masked(route.address, route.mask), route.mask);
            if best
                .get(&key)
                .is_none_or(|(_, _, metric)| next_hop.metric < *metric)
            {
                best.insert(
                    key,
                    (next_hop.addr, next_hop.ifindex, next_hop.metric),
                );
            }
        }
    }

    // L2: prefixes of remote areas through the shortest border router
    // toward each area's first hop. Keys already present in the L1 map
    // are never competed with.
    let mut l2_best: BestDest = BTreeMap::new();
    for (area_id, l2_next_hop) in &instance.state.l2_next_hop {
        if *area_id == instance.cfg.area_id {
            continue;
        }
        let Some(lsa) = instance.state.lsdb.l2_summary.get(area_id) else {
            continue;
        };
        let LsaBody::L2Summary(summary) = &lsa.body else {
            continue;
        };
        let Some((_, border_hop)) = instance
            .state
            .border_next_hop
            .get(&l2_next_hop.first_hop_area)
        else {
            continue;
        };
        let base_metric =
            border_hop.metric.saturating_add(l2_next_hop.distance);
        for route in &summary.routes {
            let key = (masked(route.address, route.mask), route.mask);
            if best.contains_key(&key) {
                continue;
            }
            let metric = base_metric.saturating_add(route.metric);
            if l2_best
                .get(&key)
                .is_none_or(|(_, _, best_metric)| metric < *best_metric)
            {
                l2_best.insert(
                    key,
                    (border_hop.addr, border_hop.ifindex, metric),
                );
            }
        }
    }

    for ((dest, mask), (gateway, ifindex, metric)) in
        best.iter().chain(l2_best.iter())
    {
        instance.sys.add_network_route(RouteEntry {
            dest: *dest,
            mask: *mask,
            gateway: *gateway,
            ifindex: *ifindex,
            metric: *metric,
        });
    }
}

// Trim the host table back to the static entries present at start.
pub(crate) fn uninstall_all<S: SystemApi>(instance: &mut Instance<S>) {
    let base = instance.state.base_routes;
    while instance.sys.n_routes() > base {
        instance.sys.remove_route(base);
    }
}

fn masked(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(mask))
}
