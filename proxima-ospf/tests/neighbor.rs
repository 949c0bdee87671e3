//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use proxima_ospf::neighbor::{Neighbor, nsm};
use proxima_ospf::packet::lsa::{LsaHdr, LsaKey, LsaType, LsaTypeCode};

fn neighbor() -> Neighbor {
    Neighbor::new(
        Ipv4Addr::new(2, 2, 2, 2),
        Ipv4Addr::new(10, 1, 1, 2),
        0,
        nsm::State::Exchange,
        1,
    )
}

fn hdr(lsa_id: u32, seq_no: u32) -> LsaHdr {
    LsaHdr {
        age: 0,
        options: 0,
        lsa_type: LsaTypeCode::Router.into(),
        lsa_id,
        adv_rtr: Ipv4Addr::from(lsa_id),
        seq_no,
        cksum: 0,
        length: LsaHdr::LENGTH,
    }
}

// One DBD page holds at most (MTU - 100) / 20 headers; an MTU below
// the overhead budget yields an empty page.
#[test]
fn dbd_page_size() {
    let mut nbr = neighbor();
    for lsa_id in 0..100u32 {
        nbr.lists.dbd_queue.push_back(hdr(lsa_id, 1));
    }

    assert_eq!(nbr.pop_dbd_page(1500).len(), 70);
    assert_eq!(nbr.pop_dbd_page(340).len(), 12);
    assert_eq!(nbr.pop_dbd_page(119).len(), 0);
    assert_eq!(nbr.pop_dbd_page(1500).len(), 18);
    assert!(nbr.lists.dbd_queue.is_empty());
}

#[test]
fn lsr_page_size() {
    let mut nbr = neighbor();
    for lsa_id in 0..200u32 {
        nbr.lists.lsr_queue.push_back(LsaKey::new(
            LsaTypeCode::Router.into(),
            Ipv4Addr::from(lsa_id),
            lsa_id,
        ));
    }

    assert_eq!(nbr.pop_lsr_page(1500).len(), 116);
    assert_eq!(nbr.pop_lsr_page(1500).len(), 84);
    assert!(nbr.lists.lsr_queue.is_empty());
}

// The request list covers keys the peer holds at a strictly higher
// sequence number, plus keys missing locally. Everything else stays
// off the list.
#[test]
fn outdated_key_selection() {
    let mut nbr = neighbor();
    nbr.insert_observed(&hdr(1, 5));
    nbr.insert_observed(&hdr(2, 3));
    nbr.insert_observed(&hdr(3, 7));

    let mut local: BTreeMap<LsaKey, u32> = BTreeMap::new();
    local.insert(hdr(1, 5).key(), 5);
    local.insert(hdr(2, 3).key(), 4);

    nbr.enqueue_outdated_keys(&local);

    let requested: Vec<u32> =
        nbr.lists.lsr_queue.iter().map(|key| key.lsa_id).collect();
    assert_eq!(requested, vec![3]);

    // An unknown LS type on the wire never reaches the request list;
    // only recognized keys are observed in the first place.
    assert!(
        nbr.lists
            .lsr_queue
            .iter()
            .all(|key| key.lsa_type != LsaType(0))
    );
}
