//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use common::*;
use proxima_ospf::packet::lsa::{LsaKey, LsaTypeCode};

// Three routers on a line; after both adjacencies reach Full each end
// learns the far subnet through the middle router.
#[test]
fn cold_start_line() {
    let mut net = TestNet::new(1);

    let r0 = net.add_router(
        router_cfg(addr(10, 0, 0, 1), "r0"),
        devices(vec![p2p_device(1, addr(10, 1, 1, 1))]),
    );
    let r1 = net.add_router(
        router_cfg(addr(10, 0, 0, 2), "r1"),
        devices(vec![
            p2p_device(1, addr(10, 1, 1, 2)),
            p2p_device(2, addr(10, 1, 2, 1)),
        ]),
    );
    let r2 = net.add_router(
        router_cfg(addr(10, 0, 0, 3), "r2"),
        devices(vec![p2p_device(1, addr(10, 1, 2, 2))]),
    );
    net.connect((r0, 1), (r1, 1));
    net.connect((r1, 2), (r2, 1));

    net.start();
    inject_prefix(&mut net, r0, 1, addr(10, 1, 1, 0));
    inject_prefix(&mut net, r1, 1, addr(10, 1, 1, 0));
    inject_prefix(&mut net, r1, 2, addr(10, 1, 2, 0));
    inject_prefix(&mut net, r2, 1, addr(10, 1, 2, 0));

    net.run_until(Duration::from_secs(60));

    assert!(net.has_full_adjacency(r0, addr(10, 0, 0, 2)));
    assert!(net.has_full_adjacency(r2, addr(10, 0, 0, 2)));

    let route = net
        .find_route(r0, addr(10, 1, 2, 0), MASK_30)
        .expect("r0 must reach the far subnet");
    assert_eq!(route.gateway, addr(10, 1, 1, 2));
    assert_eq!(route.ifindex, 1);

    let route = net
        .find_route(r2, addr(10, 1, 1, 0), MASK_30)
        .expect("r2 must reach the far subnet");
    assert_eq!(route.gateway, addr(10, 1, 2, 1));
    assert_eq!(route.ifindex, 1);
}

// Seven routers with a three-hop and a four-hop path to a stub: the
// shorter path's gateway wins.
#[test]
fn two_path_shortest_hop_count() {
    let mut net = TestNet::new(2);

    // r0 -- r1 -- r3 -- r6 (3 hops)
    // r0 -- r2 -- r4 -- r5 -- r6 (4 hops)
    let r0 = net.add_router(
        router_cfg(addr(10, 0, 0, 1), "r0"),
        devices(vec![
            p2p_device(1, addr(10, 1, 1, 1)),
            p2p_device(2, addr(10, 1, 4, 1)),
        ]),
    );
    let r1 = net.add_router(
        router_cfg(addr(10, 0, 0, 2), "r1"),
        devices(vec![
            p2p_device(1, addr(10, 1, 1, 2)),
            p2p_device(2, addr(10, 1, 2, 1)),
        ]),
    );
    let r2 = net.add_router(
        router_cfg(addr(10, 0, 0, 3), "r2"),
        devices(vec![
            p2p_device(1, addr(10, 1, 4, 2)),
            p2p_device(2, addr(10, 1, 5, 1)),
        ]),
    );
    let r3 = net.add_router(
        router_cfg(addr(10, 0, 0, 4), "r3"),
        devices(vec![
            p2p_device(1, addr(10, 1, 2, 2)),
            p2p_device(2, addr(10, 1, 3, 1)),
        ]),
    );
    let r4 = net.add_router(
        router_cfg(addr(10, 0, 0, 5), "r4"),
        devices(vec![
            p2p_device(1, addr(10, 1, 5, 2)),
            p2p_device(2, addr(10, 1, 6, 1)),
        ]),
    );
    let r5 = net.add_router(
        router_cfg(addr(10, 0, 0, 6), "r5"),
        devices(vec![
            p2p_device(1, addr(10, 1, 6, 2)),
            p2p_device(2, addr(10, 1, 7, 1)),
        ]),
    );
    let r6 = net.add_router(
        router_cfg(addr(10, 0, 0, 7), "r6"),
        devices(vec![
            p2p_device(1, addr(10, 1, 3, 2)),
            p2p_device(2, addr(10, 1, 7, 2)),
        ]),
    );
    net.connect((r0, 1), (r1, 1));
    net.connect((r1, 2), (r3, 1));
    net.connect((r3, 2), (r6, 1));
    net.connect((r0, 2), (r2, 1));
    net.connect((r2, 2), (r4, 1));
    net.connect((r4, 2), (r5, 1));
    net.connect((r5, 2), (r6, 2));

    net.start();
    inject_prefix(&mut net, r6, 1, addr(10, 99, 0, 0));

    net.run_until(Duration::from_secs(90));

    let route = net
        .find_route(r0, addr(10, 99, 0, 0), MASK_30)
        .expect("r0 must reach the stub");
    // Three hops through r1, never four through r2.
    assert_eq!(route.gateway, addr(10, 1, 1, 2));
    assert_eq!(route.metric, 3);
}

// Sixteen routers in four areas with area proxy enabled: inter-area
// traffic relays through the elected borders, not the long way around.
#[test]
fn four_area_hierarchy() {
    let mut net = TestNet::new(3);

    let area_cfg = |a: u8, n: u8, area_id: u32, name: &str| {
        let mut cfg = router_cfg(addr(10, 0, a, n), name);
        cfg.area_id = area_id;
        cfg.enable_area_proxy = true;
        cfg
    };

    // Chains inside each area; .1/.2 ends of every /30.
    let chain_dev = |net_octet: u8, link: u8, end: u8, ifindex: u32| {
        p2p_device(ifindex, addr(10, net_octet, link, end))
    };

    let a0 = net.add_router(
        area_cfg(1, 1, 1, "a0"),
        devices(vec![chain_dev(10, 1, 1, 1)]),
    );
    let a1 = net.add_router(
        area_cfg(1, 2, 1, "a1"),
        devices(vec![
            chain_dev(10, 1, 2, 1),
            chain_dev(10, 2, 1, 2),
            p2p_device(3, addr(10, 50, 2, 1)),
        ]),
    );
    let a2 = net.add_router(
        area_cfg(1, 3, 1, "a2"),
        devices(vec![chain_dev(10, 2, 2, 1), chain_dev(10, 3, 1, 2)]),
    );
    let a3 = net.add_router(
        area_cfg(1, 4, 1, "a3"),
        devices(vec![
            chain_dev(10, 3, 2, 1),
            p2p_device(2, addr(10, 50, 1, 1)),
        ]),
    );

    let b0 = net.add_router(
        area_cfg(2, 1, 2, "b0"),
        devices(vec![
            chain_dev(20, 1, 1, 1),
            p2p_device(2, addr(10, 50, 1, 2)),
        ]),
    );
    let b1 = net.add_router(
        area_cfg(2, 2, 2, "b1"),
        devices(vec![
            chain_dev(20, 1, 2, 1),
            chain_dev(20, 2, 1, 2),
            p2p_device(3, addr(10, 50, 3, 2)),
        ]),
    );
    let b2 = net.add_router(
        area_cfg(2, 3, 2, "b2"),
        devices(vec![chain_dev(20, 2, 2, 1), chain_dev(20, 3, 1, 2)]),
    );
    let b3 = net.add_router(
        area_cfg(2, 4, 2, "b3"),
        devices(vec![
            chain_dev(20, 3, 2, 1),
            p2p_device(2, addr(10, 50, 4, 1)),
        ]),
    );

    let c0 = net.add_router(
        area_cfg(3, 1, 3, "c0"),
        devices(vec![
            chain_dev(30, 1, 1, 1),
            p2p_device(2, addr(10, 50, 2, 2)),
        ]),
    );
    let c1 = net.add_router(
        area_cfg(3, 2, 3, "c1"),
        devices(vec![chain_dev(30, 1, 2, 1), chain_dev(30, 2, 1, 2)]),
    );
    let c2 = net.add_router(
        area_cfg(3, 3, 3, "c2"),
        devices(vec![chain_dev(30, 2, 2, 1), chain_dev(30, 3, 1, 2)]),
    );
    let c3 = net.add_router(
        area_cfg(3, 4, 3, "c3"),
        devices(vec![
            chain_dev(30, 3, 2, 1),
            p2p_device(2, addr(10, 50, 3, 1)),
        ]),
    );

    let d0 = net.add_router(
        area_cfg(4, 1, 4, "d0"),
        devices(vec![
            chain_dev(40, 1, 1, 1),
            p2p_device(2, addr(10, 50, 4, 2)),
        ]),
    );
    let d1 = net.add_router(
        area_cfg(4, 2, 4, "d1"),
        devices(vec![chain_dev(40, 1, 2, 1), chain_dev(40, 2, 1, 2)]),
    );
    let d2 = net.add_router(
        area_cfg(4, 3, 4, "d2"),
        devices(vec![chain_dev(40, 2, 2, 1), chain_dev(40, 3, 1, 2)]),
    );
    let d3 = net.add_router(
        area_cfg(4, 4, 4, "d3"),
        devices(vec![chain_dev(40, 3, 2, 1)]),
    );

    // Intra-area chains.
    net.connect((a0, 1), (a1, 1));
    net.connect((a1, 2), (a2, 1));
    net.connect((a2, 2), (a3, 1));
    net.connect((b0, 1), (b1, 1));
    net.connect((b1, 2), (b2, 1));
    net.connect((b2, 2), (b3, 1));
    net.connect((c0, 1), (c1, 1));
    net.connect((c1, 2), (c2, 1));
    net.connect((c2, 2), (c3, 1));
    net.connect((d0, 1), (d1, 1));
    net.connect((d1, 2), (d2, 1));
    net.connect((d2, 2), (d3, 1));
    // Cross-area links: A-B, A-C, C-B, B-D.
    net.connect((a3, 2), (b0, 2));
    net.connect((a1, 3), (c0, 2));
    net.connect((c3, 2), (b1, 3));
    net.connect((b3, 2), (d0, 2));

    net.start();
    inject_prefix(&mut net, d3, 1, addr(10, 99, 0, 0));

    net.run_until(Duration::from_secs(150));

    // The smallest router of each area leads it.
    assert!(net.routers[a0].state.is_area_leader);
    assert!(net.routers[b0].state.is_area_leader);
    assert!(!net.routers[a1].state.is_area_leader);
    assert!(!net.routers[b3].state.is_area_leader);

    // A0 relays toward the A-B border (through the area-A chain).
    let route = net
        .find_route(a0, addr(10, 99, 0, 0), MASK_30)
        .expect("a0 must reach the D stub");
    assert_eq!(route.gateway, addr(10, 10, 1, 2));

    // A1 heads for A3 (the A-B border), not its own A-C cross link.
    let route = net
        .find_route(a1, addr(10, 99, 0, 0), MASK_30)
        .expect("a1 must reach the D stub");
    assert_eq!(route.gateway, addr(10, 10, 2, 2));

    // C0 heads for C3 (the C-B border), not back through area A.
    let route = net
        .find_route(c0, addr(10, 99, 0, 0), MASK_30)
        .expect("c0 must reach the D stub");
    assert_eq!(route.gateway, addr(10, 30, 1, 2));
}

// Export after convergence, import into a fresh identical topology:
// database hashes and installed routes carry over byte-for-byte.
#[test]
fn snapshot_round_trip() {
    let build = |seed| {
        let mut net = TestNet::new(seed);
        let r0 = net.add_router(
            router_cfg(addr(10, 0, 0, 1), "r0"),
            devices(vec![p2p_device(1, addr(10, 1, 1, 1))]),
        );
        let r1 = net.add_router(
            router_cfg(addr(10, 0, 0, 2), "r1"),
            devices(vec![
                p2p_device(1, addr(10, 1, 1, 2)),
                p2p_device(2, addr(10, 1, 2, 1)),
            ]),
        );
        let r2 = net.add_router(
            router_cfg(addr(10, 0, 0, 3), "r2"),
            devices(vec![p2p_device(1, addr(10, 1, 2, 2))]),
        );
        net.connect((r0, 1), (r1, 1));
        net.connect((r1, 2), (r2, 1));
        net
    };

    let mut net = build(4);
    net.start();
    inject_prefix(&mut net, 0, 1, addr(10, 1, 1, 0));
    inject_prefix(&mut net, 2, 1, addr(10, 1, 2, 0));
    net.run_until(Duration::from_secs(60));

    let dir = std::env::temp_dir()
        .join(format!("proxima-snapshot-{}", std::process::id()));
    net.routers[0].export_ospf(&dir).unwrap();

    let hashes = (
        net.routers[0].state.lsdb.router_lsdb_hash(),
        net.routers[0].state.lsdb.l1_summary_lsdb_hash(),
        net.routers[0].state.lsdb.area_lsdb_hash(),
        net.routers[0].state.lsdb.l2_summary_lsdb_hash(),
    );
    let routes = net.routes(0);

    // Fresh simulation, identical topology; r0 resumes from the
    // snapshot instead of a cold start.
    let mut net2 = build(5);
    for router in &mut net2.routers {
        router.set_bound_devices();
    }
    net2.routers[0].import_ospf(&dir).unwrap();
    for router in &mut net2.routers {
        router.start().unwrap();
    }

    assert_eq!(hashes.0, net2.routers[0].state.lsdb.router_lsdb_hash());
    assert_eq!(hashes.1, net2.routers[0].state.lsdb.l1_summary_lsdb_hash());
    assert_eq!(hashes.2, net2.routers[0].state.lsdb.area_lsdb_hash());
    assert_eq!(hashes.3, net2.routers[0].state.lsdb.l2_summary_lsdb_hash());
    assert_eq!(routes, net2.routes(0));

    let _ = std::fs::remove_dir_all(&dir);
}

// A truncated snapshot refuses to import and leaves state untouched.
#[test]
fn snapshot_truncated_import() {
    let dir = std::env::temp_dir()
        .join(format!("proxima-snapshot-bad-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("r0.meta"), [0u8; 2]).unwrap();
    std::fs::write(dir.join("r0.lsdb"), [0u8; 1]).unwrap();
    std::fs::write(dir.join("r0.neighbors"), [0u8; 1]).unwrap();
    std::fs::write(dir.join("r0.prefixes"), [0u8; 1]).unwrap();

    let mut net = TestNet::new(6);
    let r0 = net.add_router(
        router_cfg(addr(10, 0, 0, 1), "r0"),
        devices(vec![p2p_device(1, addr(10, 1, 1, 1))]),
    );
    net.routers[r0].set_bound_devices();

    assert!(net.routers[r0].import_ospf(&dir).is_err());
    assert!(net.routers[r0].state.do_initialize);
    assert!(net.routers[r0].state.lsdb.router.is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

// A router whose only interface starts down stays silent until the
// host brings the device up; Hellos then flow within a sync interval.
#[test]
fn auto_sync_interface_up() {
    let mut net = TestNet::new(7);

    let mut r0_cfg = fast_cfg(addr(10, 0, 0, 1), "r0");
    r0_cfg.auto_sync_interfaces = true;
    r0_cfg.interface_sync_interval = Duration::from_millis(20);

    let mut r0_dev = p2p_device(1, addr(10, 1, 1, 1));
    r0_dev.up = false;

    let r0 = net.add_router(r0_cfg, devices(vec![r0_dev]));
    let r1 = net.add_router(
        fast_cfg(addr(10, 0, 0, 2), "r1"),
        devices(vec![p2p_device(1, addr(10, 1, 1, 2))]),
    );
    net.connect((r0, 1), (r1, 1));
    net.start();

    net.run_until(Duration::from_secs(1));
    assert_eq!(net.neighbor_count(r0), 0);
    assert_eq!(net.neighbor_count(r1), 0);

    net.sim.set_device_up(r0, 1, true);
    net.run_until(Duration::from_millis(3500));
    assert!(net.has_full_adjacency(r0, addr(10, 0, 0, 2)));
    assert!(net.has_full_adjacency(r1, addr(10, 0, 0, 1)));
}

// Disable stops all transmission and is idempotent; Enable resumes and
// the adjacency reconverges.
#[test]
fn disable_enable() {
    let mut net = TestNet::new(8);

    let mut r0_cfg = fast_cfg(addr(10, 0, 0, 1), "r0");
    r0_cfg.reset_state_on_disable = true;

    let r0 = net.add_router(
        r0_cfg,
        devices(vec![p2p_device(1, addr(10, 1, 1, 1))]),
    );
    let r1 = net.add_router(
        fast_cfg(addr(10, 0, 0, 2), "r1"),
        devices(vec![p2p_device(1, addr(10, 1, 1, 2))]),
    );
    net.connect((r0, 1), (r1, 1));
    net.start();
    inject_prefix(&mut net, r1, 1, addr(10, 99, 0, 0));

    net.run_until(Duration::from_secs(2));
    assert!(net.has_full_adjacency(r0, addr(10, 0, 0, 2)));
    assert!(net.find_route(r0, addr(10, 99, 0, 0), MASK_30).is_some());

    // Two Disables leave the same state as one.
    net.routers[r0].disable();
    net.routers[r0].disable();
    assert!(net.routes(r0).is_empty());

    net.run_until(Duration::from_secs(4));
    // r1 timed the silent peer out.
    assert_eq!(net.neighbor_count(r1), 0);

    // Two Enables leave the same state as one.
    net.routers[r0].enable();
    net.routers[r0].enable();

    net.run_until(Duration::from_secs(8));
    assert!(net.has_full_adjacency(r0, addr(10, 0, 0, 2)));
    assert!(net.has_full_adjacency(r1, addr(10, 0, 0, 1)));
    assert!(net.find_route(r0, addr(10, 99, 0, 0), MASK_30).is_some());
}

// With MinLSInterval set, a burst of prefix changes collapses into one
// deferred regeneration.
#[test]
fn origination_throttle() {
    let mut net = TestNet::new(9);

    let mut cfg = router_cfg(addr(10, 0, 0, 1), "r0");
    cfg.min_ls_interval = Duration::from_secs(1);

    let r0 = net.add_router(
        cfg,
        devices(vec![p2p_device(1, addr(10, 1, 1, 1))]),
    );
    net.start();

    net.run_until(Duration::from_millis(10));
    inject_prefix(&mut net, r0, 1, addr(10, 99, 0, 0));
    inject_prefix(&mut net, r0, 1, addr(10, 99, 0, 4));

    let stats = net.routers[r0].state.lsdb.throttle_stats;
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.suppressed, 1);

    net.run_until(Duration::from_secs(3));

    let key = LsaKey::new(
        LsaTypeCode::L1Summary.into(),
        addr(10, 0, 0, 1),
        u32::from(addr(10, 0, 0, 1)),
    );
    // Startup origination plus exactly one coalesced regeneration.
    assert_eq!(
        net.routers[r0].state.lsdb.seq_numbers.get(&key).copied(),
        Some(2)
    );
    let lsa = net.routers[r0].state.lsdb.fetch(&key).unwrap();
    assert_eq!(lsa.hdr.seq_no, 2);
    // Both injected prefixes made it into the regenerated LSA.
    let body = lsa.body.as_l1_summary().unwrap();
    assert_eq!(body.routes.len(), 2);
}
