//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use proxima_sim::time::TimerHandle;

use crate::packet::PacketType;
use crate::packet::lsa::{LsaHdr, LsaKey};

// Per-packet overhead budget subtracted from the interface MTU before
// paging DBD headers and LSR entries.
const PAGE_OVERHEAD: u16 = 100;

#[derive(Debug)]
pub struct Neighbor {
    pub router_id: Ipv4Addr,
    pub addr: Ipv4Addr,
    // Neighbors on the same subnet may sit in a different area under
    // the area-proxy extension.
    pub area_id: u32,
    pub state: nsm::State,

    // DD sequence number currently agreed with (or proposed to) the
    // peer.
    pub dd_seq_no: u32,
    // Last Database Description packet sent, replayed verbatim when the
    // master retransmits a duplicate poll.
    pub last_sent_dbdesc: Option<Bytes>,
    // Packet re-sent by the per-neighbor retransmit timer (DBD or LSR).
    pub rxmt_packet: Option<(PacketType, Bytes)>,
    // Keys requested in the LS Request currently in flight.
    pub last_sent_lsreq: Option<BTreeSet<LsaKey>>,

    pub last_hello_rcvd: Option<Duration>,
    pub discontinuity_time: DateTime<Utc>,

    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSA headers snapshotted for description in DBD packets.
    pub dbd_queue: VecDeque<LsaHdr>,
    // Keys awaiting an LS Request.
    pub lsr_queue: VecDeque<LsaKey>,
    // The neighbor's latest sequence number per key, learned during the
    // database exchange.
    pub observed: BTreeMap<LsaKey, u32>,
    // Unacknowledged LS Updates, keyed for per-LSA acks.
    pub ls_rxmt: BTreeMap<LsaKey, Bytes>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    // Router dead timer; at most one per neighbor.
    pub dead_timer: Option<TimerHandle>,
    // DBD/LSR retransmit timer; at most one per neighbor.
    pub rxmt: Option<TimerHandle>,
    // LS Update retransmit timers, one per outstanding key.
    pub ls_rxmt: BTreeMap<LsaKey, TimerHandle>,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        // Multi-access only, unused on point-to-point links.
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    impl std::fmt::Display for State {
        fn fmt(
            &self,
            f: &mut std::fmt::Formatter<'_>,
        ) -> std::fmt::Result {
            match self {
                State::Down => write!(f, "down"),
                State::Attempt => write!(f, "attempt"),
                State::Init => write!(f, "init"),
                State::TwoWay => write!(f, "2-way"),
                State::ExStart => write!(f, "exstart"),
                State::Exchange => write!(f, "exchange"),
                State::Loading => write!(f, "loading"),
                State::Full => write!(f, "full"),
            }
        }
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub fn new(
        router_id: Ipv4Addr,
        addr: Ipv4Addr,
        area_id: u32,
        state: nsm::State,
        dd_seq_no: u32,
    ) -> Neighbor {
        Neighbor {
            router_id,
            addr,
            area_id,
            state,
            dd_seq_no,
            last_sent_dbdesc: None,
            rxmt_packet: None,
            last_sent_lsreq: None,
            last_hello_rcvd: None,
            discontinuity_time: Utc::now(),
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    // Record a header described by the peer during database exchange.
    pub fn insert_observed(&mut self, hdr: &LsaHdr) {
        self.lists.observed.insert(hdr.key(), hdr.seq_no);
    }

    // Pop as many queued DBD headers as fit in one packet.
    pub fn pop_dbd_page(&mut self, mtu: u16) -> Vec<LsaHdr> {
        let max = mtu.saturating_sub(PAGE_OVERHEAD) / LsaHdr::LENGTH;
        let mut page = vec![];
        for _ in 0..max {
            match self.lists.dbd_queue.pop_front() {
                Some(hdr) => page.push(hdr),
                None => break,
            }
        }
        page
    }

    // Pop as many queued request keys as fit in one packet.
    pub fn pop_lsr_page(&mut self, mtu: u16) -> Vec<LsaKey> {
        let max = mtu.saturating_sub(PAGE_OVERHEAD) / 12;
        let mut page = vec![];
        for _ in 0..max {
            match self.lists.lsr_queue.pop_front() {
                Some(key) => page.push(key),
                None => break,
            }
        }
        page
    }

    // Compare the peer's observed headers against the local database
    // and queue a request for every key the peer holds at a strictly
    // higher sequence number, or that is missing locally.
    pub fn enqueue_outdated_keys(&mut self, local: &BTreeMap<LsaKey, u32>) {
        for (key, their_seq_no) in &self.lists.observed {
            let outdated = match local.get(key) {
                Some(our_seq_no) => their_seq_no > our_seq_no,
                None => true,
            };
            if outdated {
                self.lists.lsr_queue.push_back(*key);
            }
        }
    }

    // Forget everything tied to the adjacency (the neighbor relation
    // itself survives).
    pub(crate) fn reset_adjacency(&mut self) {
        self.lists.dbd_queue.clear();
        self.lists.lsr_queue.clear();
        self.lists.observed.clear();
        self.lists.ls_rxmt.clear();
        self.last_sent_dbdesc = None;
        self.rxmt_packet = None;
        self.last_sent_lsreq = None;
    }
}
