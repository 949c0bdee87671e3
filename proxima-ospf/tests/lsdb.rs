//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use proxima_ospf::lsdb::LsdbSet;
use proxima_ospf::packet::lsa::*;

fn area_lsa(area_id: u32, adv_rtr: Ipv4Addr, seq_no: u32) -> Lsa {
    Lsa::new(
        area_id,
        adv_rtr,
        seq_no,
        LsaBody::Area(LsaArea {
            links: vec![AreaLink::new(
                area_id + 1,
                Ipv4Addr::new(10, 1, 1, 1),
                1,
            )],
        }),
    )
}

fn router_lsa(router_id: Ipv4Addr, seq_no: u32) -> Lsa {
    Lsa::new(
        router_id.into(),
        router_id,
        seq_no,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::empty(),
            links: vec![],
        }),
    )
}

// Applying the same LSA a second time changes nothing.
#[test]
fn idempotent_installation() {
    let mut lsdb = LsdbSet::default();
    let lsa = router_lsa(Ipv4Addr::new(1, 1, 1, 1), 3);

    assert!(lsdb.install(lsa.clone()));
    let hash = lsdb.router_lsdb_hash();

    assert!(!lsdb.install(lsa));
    assert_eq!(hash, lsdb.router_lsdb_hash());
}

// Stored sequence numbers never decrease.
#[test]
fn monotonic_seq_no() {
    let mut lsdb = LsdbSet::default();
    let router_id = Ipv4Addr::new(1, 1, 1, 1);

    assert!(lsdb.install(router_lsa(router_id, 3)));
    assert!(!lsdb.install(router_lsa(router_id, 2)));
    assert!(lsdb.install(router_lsa(router_id, 4)));

    let key = LsaKey::new(
        LsaTypeCode::Router.into(),
        router_id,
        router_id.into(),
    );
    assert_eq!(lsdb.fetch(&key).unwrap().hdr.seq_no, 4);
}

// On an equal sequence number the smaller advertising router wins,
// regardless of arrival order.
#[test]
fn tie_break_stability() {
    let small = Ipv4Addr::new(1, 1, 1, 1);
    let large = Ipv4Addr::new(2, 2, 2, 2);

    for order in [[small, large], [large, small]] {
        let mut lsdb = LsdbSet::default();
        for adv_rtr in order {
            lsdb.install(area_lsa(7, adv_rtr, 5));
        }
        let key = LsaKey::new(LsaTypeCode::Area.into(), small, 7);
        assert_eq!(lsdb.fetch(&key).unwrap().hdr.adv_rtr, small);
    }
}

// Unknown LSA types are never stored.
#[test]
fn unknown_type_dropped() {
    let mut lsdb = LsdbSet::default();
    let lsa = Lsa::new(
        1,
        Ipv4Addr::new(1, 1, 1, 1),
        1,
        LsaBody::Unknown(LsaUnknown {}),
    );
    assert!(!lsdb.install(lsa));
    assert!(lsdb.iter_all().next().is_none());
}

// The database exchange snapshot restricts L1 entries to same-area
// neighbors but always describes the L2 databases.
#[test]
fn dbd_snapshot_area_filter() {
    let mut lsdb = LsdbSet::default();
    lsdb.install(router_lsa(Ipv4Addr::new(1, 1, 1, 1), 1));
    lsdb.install(area_lsa(1, Ipv4Addr::new(1, 1, 1, 1), 1));

    assert_eq!(lsdb.dbd_snapshot(true).len(), 2);
    assert_eq!(lsdb.dbd_snapshot(false).len(), 1);
}
