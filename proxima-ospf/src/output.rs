//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bytes::Bytes;
use proxima_sim::time::Scheduler;

use crate::collections::{NeighborIndex, NeighborKey};
use crate::instance::{Instance, SystemApi};
use crate::neighbor::nsm;
use crate::network::{self, SocketKind};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Packet,
    PacketHdr, PacketType,
};
use crate::tasks::{self, TimerMsg};

// ===== Hello packets =====

// Transmit a Hello on every up interface and schedule the next round.
pub(crate) fn send_hello<S: SystemApi>(instance: &mut Instance<S>) {
    for ifindex in 1..instance.arenas.interfaces.len() as u32 {
        let iface = &instance.arenas.interfaces[ifindex as usize];
        if !iface.up {
            continue;
        }

        // List every neighbor seen on this interface.
        let neighbors: BTreeSet<Ipv4Addr> = iface
            .neighbors
            .keys()
            .map(|key| key.router_id)
            .collect();

        let hdr = PacketHdr::generate(
            PacketType::Hello,
            instance.cfg.router_id,
            iface.area_id,
        );
        let packet = Packet::Hello(Hello {
            hdr,
            network_mask: iface.mask,
            hello_interval: iface.hello_interval,
            options: 0,
            priority: 0,
            dead_interval: iface.dead_interval,
            dr: Ipv4Addr::UNSPECIFIED,
            bdr: Ipv4Addr::UNSPECIFIED,
            neighbors,
        });
        let data = network::encode_packet(instance, &packet);
        let dst = instance.cfg.hello_addr;
        network::send_packet(
            instance,
            ifindex,
            SocketKind::Hello,
            dst,
            PacketType::Hello,
            "",
            data,
        );
    }

    instance.state.tasks.hello = Some(tasks::schedule(
        &instance.sys,
        &instance.sys,
        instance.cfg.hello_interval,
        TimerMsg::HelloInterval,
    ));
}

// ===== Database Description packets =====

// First DBD of the negotiation: empty, I/M set, MS when claiming the
// master role. The claim is retransmitted until the peer answers.
pub(crate) fn send_dbdesc_negotiate<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    let iface = &instance.arenas.interfaces[ifindex as usize];
    let nbr = &instance.arenas.neighbors[nbr_idx];

    let hdr = PacketHdr::generate(
        PacketType::DbDesc,
        instance.cfg.router_id,
        iface.area_id,
    );
    let packet = Packet::DbDesc(DbDesc {
        hdr,
        mtu: iface.mtu,
        options: 0,
        dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
        dd_seq_no: nbr.dd_seq_no,
        lsa_hdrs: vec![],
    });
    let data = network::encode_packet(instance, &packet);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.last_sent_dbdesc = Some(data.clone());
    send_to_neighbor_rxmt(instance, ifindex, nbr_idx, PacketType::DbDesc, data);
}

// Slave reply during negotiation and exchange: echo the master's
// sequence number and describe the next page of headers.
pub(crate) fn send_dbdesc_slave_reply<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    echo_seq_no: u32,
) {
    let mtu = instance.arenas.interfaces[ifindex as usize].mtu;
    let area_id = instance.arenas.interfaces[ifindex as usize].area_id;

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    let lsa_hdrs = nbr.pop_dbd_page(mtu);
    let mut dd_flags = DbDescFlags::M;
    if nbr.lists.dbd_queue.is_empty() {
        dd_flags.remove(DbDescFlags::M);
    }

    let hdr = PacketHdr::generate(
        PacketType::DbDesc,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::DbDesc(DbDesc {
        hdr,
        mtu,
        options: 0,
        dd_flags,
        dd_seq_no: echo_seq_no,
        lsa_hdrs,
    });
    let data = network::encode_packet(instance, &packet);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.last_sent_dbdesc = Some(data.clone());
    let dst = nbr.addr;
    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        dst,
        PacketType::DbDesc,
        "",
        data,
    );
}

// Master's Exchange DBD: carries the master's sequence number and the
// next page of its own queue, retransmitted until the slave echoes it.
pub(crate) fn send_dbdesc_master_poll<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    let mtu = instance.arenas.interfaces[ifindex as usize].mtu;
    let area_id = instance.arenas.interfaces[ifindex as usize].area_id;

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    let lsa_hdrs = nbr.pop_dbd_page(mtu);
    let mut dd_flags = DbDescFlags::M | DbDescFlags::MS;
    if nbr.lists.dbd_queue.is_empty() {
        dd_flags.remove(DbDescFlags::M);
    }
    let dd_seq_no = nbr.dd_seq_no;

    let hdr = PacketHdr::generate(
        PacketType::DbDesc,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::DbDesc(DbDesc {
        hdr,
        mtu,
        options: 0,
        dd_flags,
        dd_seq_no,
        lsa_hdrs,
    });
    let data = network::encode_packet(instance, &packet);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.last_sent_dbdesc = Some(data.clone());
    send_to_neighbor_rxmt(instance, ifindex, nbr_idx, PacketType::DbDesc, data);
}

// ===== LS Request packets =====

// Request the next page of outdated keys, retransmitted until every
// requested LSA arrives.
pub(crate) fn send_lsreq<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    entries: Vec<LsaKey>,
) {
    let area_id = instance.arenas.interfaces[ifindex as usize].area_id;

    let hdr = PacketHdr::generate(
        PacketType::LsRequest,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::LsRequest(LsRequest {
        hdr,
        entries: entries.clone(),
    });
    let data = network::encode_packet(instance, &packet);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.last_sent_lsreq = Some(entries.into_iter().collect());
    send_to_neighbor_rxmt(
        instance,
        ifindex,
        nbr_idx,
        PacketType::LsRequest,
        data,
    );
}

// ===== LS Update packets =====

// Answer an LS Request with one unicast LS Update carrying every
// requested LSA found locally. The requester retransmits its LSR until
// satisfied, so no retransmission is armed here.
pub(crate) fn send_lsupd_direct<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    dst: Ipv4Addr,
    lsas: Vec<Lsa>,
) {
    let area_id = instance.arenas.interfaces[ifindex as usize].area_id;

    let hdr = PacketHdr::generate(
        PacketType::LsUpdate,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::LsUpdate(LsUpdate { hdr, lsas });
    let level = network::packet_lsa_level(&packet);
    let data = network::encode_packet(instance, &packet);
    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        dst,
        PacketType::LsUpdate,
        level,
        data,
    );
}

// Build the single-LSA LS Update used for flooding and per-key
// retransmission.
pub(crate) fn build_lsupd<S: SystemApi>(
    instance: &Instance<S>,
    area_id: u32,
    lsa: &Lsa,
) -> (Bytes, &'static str) {
    let hdr = PacketHdr::generate(
        PacketType::LsUpdate,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::LsUpdate(LsUpdate {
        hdr,
        lsas: vec![lsa.clone()],
    });
    let level = network::packet_lsa_level(&packet);
    (network::encode_packet(instance, &packet), level)
}

// ===== LS Ack packets =====

// Unicast one LS Ack back to the sender, one header per acked LSA.
pub(crate) fn send_lsack<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    dst: Ipv4Addr,
    lsa_hdrs: Vec<LsaHdr>,
) {
    let area_id = instance.arenas.interfaces[ifindex as usize].area_id;

    let hdr = PacketHdr::generate(
        PacketType::LsAck,
        instance.cfg.router_id,
        area_id,
    );
    let packet = Packet::LsAck(LsAck { hdr, lsa_hdrs });
    let level = network::packet_lsa_level(&packet);
    let data = network::encode_packet(instance, &packet);
    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        dst,
        PacketType::LsAck,
        level,
        data,
    );
}

// ===== retransmission helpers =====

// Unicast to the neighbor and arm the per-neighbor retransmit timer.
// At most one such timer exists per neighbor; rearming replaces it.
pub(crate) fn send_to_neighbor_rxmt<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    pkt_type: PacketType,
    data: Bytes,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    let dst = nbr.addr;
    nbr.rxmt_packet = Some((pkt_type, data.clone()));
    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        dst,
        pkt_type,
        "",
        data,
    );

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    if let Some(handle) = nbr.tasks.rxmt.take() {
        instance.sys.cancel(handle);
    }
    if nbr.state >= nsm::State::TwoWay {
        let key = NeighborKey::new(nbr.router_id, nbr.addr);
        nbr.tasks.rxmt = Some(tasks::schedule(
            &instance.sys,
            &instance.sys,
            instance.cfg.rxmt_interval,
            TimerMsg::RxmtInterval { ifindex, key },
        ));
    } else {
        nbr.rxmt_packet = None;
    }
}

// Cancel the per-neighbor retransmit timer and forget its packet.
pub(crate) fn stop_rxmt<S: SystemApi>(
    instance: &mut Instance<S>,
    nbr_idx: NeighborIndex,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.rxmt_packet = None;
    if let Some(handle) = nbr.tasks.rxmt.take() {
        instance.sys.cancel(handle);
    }
}

// Unicast an LS Update and arm the per-(neighbor, key) retransmit
// timer, cancelled by a matching LS Ack.
pub(crate) fn send_to_neighbor_keyed_rxmt<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    lsa_key: LsaKey,
    lsa_level: &'static str,
    data: Bytes,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    let dst = nbr.addr;
    nbr.lists.ls_rxmt.insert(lsa_key, data.clone());
    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        dst,
        PacketType::LsUpdate,
        lsa_level,
        data,
    );

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    if let Some(handle) = nbr.tasks.ls_rxmt.remove(&lsa_key) {
        instance.sys.cancel(handle);
    }
    if nbr.state >= nsm::State::TwoWay {
        let key = NeighborKey::new(nbr.router_id, nbr.addr);
        let handle = tasks::schedule(
            &instance.sys,
            &instance.sys,
            instance.cfg.rxmt_interval,
            TimerMsg::LsaRxmtInterval {
                ifindex,
                key,
                lsa_key,
            },
        );
        nbr.tasks.ls_rxmt.insert(lsa_key, handle);
    } else {
        nbr.lists.ls_rxmt.remove(&lsa_key);
    }
}
