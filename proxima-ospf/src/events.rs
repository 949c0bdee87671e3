//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use proxima_sim::time::{Clock, Scheduler};

use crate::area;
use crate::collections::{NeighborIndex, NeighborKey};
use crate::debug::Debug;
use crate::error::{Error, InterfaceCfgError};
use crate::flood;
use crate::instance::{Instance, InstanceArenas, SystemApi};
use crate::lsdb;
use crate::neighbor::nsm;
use crate::network::{self, SocketKind};
use crate::output;
use crate::packet::lsa::{Lsa, LsaKey, LsaTypeCode};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Packet,
    PacketType,
};
use crate::route;
use crate::spf::{self, SpfLevel};
use crate::tasks::{self, TimerMsg};

// ===== packet dispatch =====

pub(crate) fn process_packet<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    packet: Packet,
) -> Result<(), Error> {
    match packet {
        Packet::Hello(hello) => process_hello(instance, ifindex, src, hello),
        Packet::DbDesc(dbd) => process_dbdesc(instance, ifindex, src, dbd),
        Packet::LsRequest(lsr) => process_lsreq(instance, ifindex, src, lsr),
        Packet::LsUpdate(lsu) => process_lsupd(instance, ifindex, src, lsu),
        Packet::LsAck(lsack) => process_lsack(instance, ifindex, src, lsack),
    }
}

// ===== Hello packets =====

fn process_hello<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    hello: Hello,
) -> Result<(), Error> {
    let iface = instance
        .arenas
        .interfaces
        .get(ifindex as usize)
        .filter(|_| ifindex != 0)
        .ok_or(Error::InterfaceIndexNotFound(ifindex))?;

    // Both timers must match the local interface configuration.
    if hello.hello_interval != iface.hello_interval {
        return Err(Error::InterfaceCfgError(
            ifindex,
            InterfaceCfgError::HelloIntervalMismatch(
                hello.hello_interval,
                iface.hello_interval,
            ),
        ));
    }
    if hello.dead_interval != iface.dead_interval {
        return Err(Error::InterfaceCfgError(
            ifindex,
            InterfaceCfgError::DeadIntervalMismatch(
                hello.dead_interval,
                iface.dead_interval,
            ),
        ));
    }

    let router_id = hello.hdr.router_id;
    let nbr_key = NeighborKey::new(router_id, src);
    let now = instance.sys.now();

    let nbr_idx = {
        let InstanceArenas {
            interfaces,
            neighbors,
        } = &mut instance.arenas;
        let iface = &mut interfaces[ifindex as usize];
        match iface.get_neighbor(&nbr_key) {
            Some(nbr_idx) => {
                let nbr = &mut neighbors[nbr_idx];
                // A Hello carrying a new area ID replaces the stored
                // one.
                if nbr.area_id != hello.hdr.area_id {
                    nbr.area_id = hello.hdr.area_id;
                }
                nbr_idx
            }
            None => {
                Debug::NeighborCreate(router_id).log();
                iface.add_neighbor(
                    neighbors,
                    router_id,
                    src,
                    hello.hdr.area_id,
                    nsm::State::Init,
                    instance.sys.rand_u32(),
                )
            }
        }
    };

    {
        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        // A timed-out neighbor rejoins at Init.
        if nbr.state == nsm::State::Down {
            Debug::NsmTransition(router_id, nbr.state, nsm::State::Init)
                .log();
            nbr.state = nsm::State::Init;
        }
        nbr.last_hello_rcvd = Some(now);
    }

    if hello.neighbors.contains(&instance.cfg.router_id) {
        // Two-way: refresh the dead timer and, from Init, start the
        // database description negotiation.
        refresh_dead_timer(instance, ifindex, nbr_idx);

        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        if nbr.state == nsm::State::Init {
            Debug::NsmTransition(router_id, nbr.state, nsm::State::ExStart)
                .log();
            nbr.state = nsm::State::ExStart;
            nbr.dd_seq_no = instance.sys.rand_u32();
            output::send_dbdesc_negotiate(instance, ifindex, nbr_idx);
        }
    } else {
        // One-way: an established relation falls back to Init.
        let state = instance.arenas.neighbors[nbr_idx].state;
        if state > nsm::State::Init {
            fallback_to_init(instance, ifindex, nbr_idx);
        }
    }

    Ok(())
}

fn refresh_dead_timer<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    let dead_interval = Duration::from_millis(
        instance.arenas.interfaces[ifindex as usize].dead_interval as u64,
    );
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    let key = NeighborKey::new(nbr.router_id, nbr.addr);
    if let Some(handle) = nbr.tasks.dead_timer.take() {
        instance.sys.cancel(handle);
    }
    nbr.tasks.dead_timer = Some(tasks::schedule(
        &instance.sys,
        &instance.sys,
        dead_interval,
        TimerMsg::NbrDeadTimer { ifindex, key },
    ));
}

fn fallback_to_init<S: SystemApi>(
    instance: &mut Instance<S>,
    _ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    Debug::NsmTransition(nbr.router_id, nbr.state, nsm::State::Init).log();
    nbr.state = nsm::State::Init;
    clear_nbr_timers(instance, nbr_idx);
    instance.arenas.neighbors[nbr_idx].reset_adjacency();

    // The adjacency is gone; readvertise the Router-LSA.
    lsdb::throttled_originate_router_lsa(instance);
}

fn clear_nbr_timers<S: SystemApi>(
    instance: &mut Instance<S>,
    nbr_idx: NeighborIndex,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    if let Some(handle) = nbr.tasks.rxmt.take() {
        instance.sys.cancel(handle);
    }
    for (_, handle) in std::mem::take(&mut nbr.tasks.ls_rxmt) {
        instance.sys.cancel(handle);
    }
}

// ===== Database Description packets =====

fn process_dbdesc<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    dbd: DbDesc,
) -> Result<(), Error> {
    let router_id = dbd.hdr.router_id;
    if router_id == instance.cfg.router_id {
        return Err(Error::OwnRouterId(router_id));
    }

    let nbr_key = NeighborKey::new(router_id, src);
    let nbr_idx = nbr_lookup(instance, ifindex, &nbr_key)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;

    let state = instance.arenas.neighbors[nbr_idx].state;
    if state < nsm::State::ExStart {
        return Err(Error::DbDescReject(router_id, state));
    }

    if state == nsm::State::ExStart {
        return negotiate_dbdesc(instance, ifindex, nbr_idx, dbd);
    }

    if dbd.dd_flags.contains(DbDescFlags::I) {
        // Late negotiation retransmission; answer with the last DBD so
        // the peer can make progress.
        resend_last_dbdesc(instance, ifindex, nbr_idx);
        return Ok(());
    }

    if dbd.dd_flags.contains(DbDescFlags::MS) {
        // Peer claims the master role.
        if instance.cfg.router_id > router_id {
            return Err(Error::DbDescMasterConflict(router_id));
        }
        process_master_dbdesc(instance, ifindex, nbr_idx, dbd)
    } else {
        // Peer answers as slave.
        if instance.cfg.router_id < router_id {
            return Err(Error::DbDescSlaveConflict(router_id));
        }
        process_slave_dbdesc(instance, ifindex, nbr_idx, dbd)
    }
}

// ExStart: decide master/slave by Router ID and snapshot the database
// headers this neighbor is eligible to see.
fn negotiate_dbdesc<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    dbd: DbDesc,
) -> Result<(), Error> {
    let router_id = instance.arenas.neighbors[nbr_idx].router_id;
    let negotiate_flags =
        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS;

    if router_id > instance.cfg.router_id
        && dbd.dd_flags.contains(negotiate_flags)
    {
        // The peer is master: adopt its sequence number, answer with
        // our first page and move to Exchange.
        snapshot_dbd_queue(instance, nbr_idx);
        output::stop_rxmt(instance, nbr_idx);

        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        nbr.dd_seq_no = dbd.dd_seq_no;
        Debug::NsmTransition(router_id, nbr.state, nsm::State::Exchange)
            .log();
        nbr.state = nsm::State::Exchange;

        output::send_dbdesc_slave_reply(
            instance,
            ifindex,
            nbr_idx,
            dbd.dd_seq_no,
        );
        instance.arenas.neighbors[nbr_idx].dd_seq_no = dbd.dd_seq_no + 1;
    } else if router_id < instance.cfg.router_id
        && !dbd.dd_flags.contains(DbDescFlags::MS)
    {
        // The peer conceded the slave role and echoed our sequence
        // number, possibly already carrying its first page.
        if dbd.dd_seq_no != instance.arenas.neighbors[nbr_idx].dd_seq_no {
            return Err(Error::DbDescOutOfOrder(
                router_id,
                instance.arenas.neighbors[nbr_idx].dd_seq_no,
                dbd.dd_seq_no,
            ));
        }
        snapshot_dbd_queue(instance, nbr_idx);

        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        for hdr in &dbd.lsa_hdrs {
            nbr.insert_observed(hdr);
        }
        Debug::NsmTransition(router_id, nbr.state, nsm::State::Exchange)
            .log();
        nbr.state = nsm::State::Exchange;
        nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);

        output::send_dbdesc_master_poll(instance, ifindex, nbr_idx);
    }

    Ok(())
}

fn snapshot_dbd_queue<S: SystemApi>(
    instance: &mut Instance<S>,
    nbr_idx: NeighborIndex,
) {
    let same_area = instance.arenas.neighbors[nbr_idx].area_id
        == instance.cfg.area_id;
    let hdrs = instance.state.lsdb.dbd_snapshot(same_area);
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.lists.dbd_queue = hdrs.into();
}

// Exchange, slave side: the master owns the sequence number; echo it
// with the next page of our own queue.
fn process_master_dbdesc<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    dbd: DbDesc,
) -> Result<(), Error> {
    let (router_id, expected) = {
        let nbr = &instance.arenas.neighbors[nbr_idx];
        (nbr.router_id, nbr.dd_seq_no)
    };

    if dbd.dd_seq_no.wrapping_add(1) == expected {
        // Duplicate poll; replay the previous reply.
        resend_last_dbdesc(instance, ifindex, nbr_idx);
        return Ok(());
    }
    if dbd.dd_seq_no != expected {
        return Err(Error::DbDescOutOfOrder(
            router_id,
            expected,
            dbd.dd_seq_no,
        ));
    }

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    for hdr in &dbd.lsa_hdrs {
        nbr.insert_observed(hdr);
    }

    output::send_dbdesc_slave_reply(instance, ifindex, nbr_idx, expected);
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.dd_seq_no = expected.wrapping_add(1);

    if !dbd.dd_flags.contains(DbDescFlags::M)
        && nbr.lists.dbd_queue.is_empty()
    {
        advance_to_loading(instance, ifindex, nbr_idx);
    }

    Ok(())
}

// Exchange, master side: the slave echoed our sequence number with its
// next page; either finish or advance the sequence and poll again.
fn process_slave_dbdesc<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    dbd: DbDesc,
) -> Result<(), Error> {
    let (router_id, expected) = {
        let nbr = &instance.arenas.neighbors[nbr_idx];
        (nbr.router_id, nbr.dd_seq_no)
    };
    if dbd.dd_seq_no != expected {
        return Err(Error::DbDescOutOfOrder(
            router_id,
            expected,
            dbd.dd_seq_no,
        ));
    }

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    for hdr in &dbd.lsa_hdrs {
        nbr.insert_observed(hdr);
    }

    if !dbd.dd_flags.contains(DbDescFlags::M)
        && nbr.lists.dbd_queue.is_empty()
    {
        advance_to_loading(instance, ifindex, nbr_idx);
        return Ok(());
    }

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.dd_seq_no = expected.wrapping_add(1);
    output::send_dbdesc_master_poll(instance, ifindex, nbr_idx);

    Ok(())
}

fn resend_last_dbdesc<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    let nbr = &instance.arenas.neighbors[nbr_idx];
    let dst = nbr.addr;
    if let Some(data) = nbr.last_sent_dbdesc.clone() {
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
}

// ===== Loading =====

// Exchange finished on both sides: compare the snapshots against the
// local databases and request everything outdated or missing.
fn advance_to_loading<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    // Duplicate final DBDs must not restart the request list.
    if instance.arenas.neighbors[nbr_idx].state >= nsm::State::Loading {
        return;
    }
    output::stop_rxmt(instance, nbr_idx);

    let same_area = instance.arenas.neighbors[nbr_idx].area_id
        == instance.cfg.area_id;
    let local = instance.state.lsdb.local_seq_nos(same_area);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    Debug::NsmTransition(nbr.router_id, nbr.state, nsm::State::Loading)
        .log();
    nbr.state = nsm::State::Loading;
    nbr.enqueue_outdated_keys(&local);

    send_next_lsr(instance, ifindex, nbr_idx);
}

fn send_next_lsr<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    if instance.arenas.neighbors[nbr_idx].lists.lsr_queue.is_empty() {
        advance_to_full(instance, ifindex, nbr_idx);
        return;
    }

    let mtu = instance.arenas.interfaces[ifindex as usize].mtu;
    let entries = instance.arenas.neighbors[nbr_idx].pop_lsr_page(mtu);
    output::send_lsreq(instance, ifindex, nbr_idx, entries);
}

// ===== Full =====

fn advance_to_full<S: SystemApi>(
    instance: &mut Instance<S>,
    _ifindex: u32,
    nbr_idx: NeighborIndex,
) {
    output::stop_rxmt(instance, nbr_idx);

    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    Debug::NsmTransition(nbr.router_id, nbr.state, nsm::State::Full).log();
    nbr.state = nsm::State::Full;
    nbr.last_sent_lsreq = None;

    // The adjacency set changed; readvertise the Router-LSA (which on
    // an area leader cascades into the Area-LSA).
    lsdb::throttled_originate_router_lsa(instance);
}

// ===== LS Request packets =====

fn process_lsreq<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    lsr: LsRequest,
) -> Result<(), Error> {
    let router_id = lsr.hdr.router_id;
    let nbr_key = NeighborKey::new(router_id, src);
    let nbr_idx = nbr_lookup(instance, ifindex, &nbr_key)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;
    let state = instance.arenas.neighbors[nbr_idx].state;
    if state < nsm::State::Exchange {
        return Err(Error::DbDescReject(router_id, state));
    }

    // Answer with one LS Update carrying every requested LSA we hold;
    // unknown or missing keys are skipped.
    let lsas: Vec<Lsa> = lsr
        .entries
        .iter()
        .filter_map(|key| instance.state.lsdb.fetch(key).cloned())
        .collect();
    if !lsas.is_empty() {
        output::send_lsupd_direct(instance, ifindex, src, lsas);
    }

    Ok(())
}

// ===== LS Update packets =====

fn process_lsupd<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    lsu: LsUpdate,
) -> Result<(), Error> {
    let router_id = lsu.hdr.router_id;
    let nbr_key = NeighborKey::new(router_id, src);
    let nbr_idx = nbr_lookup(instance, ifindex, &nbr_key)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;
    if instance.arenas.neighbors[nbr_idx].state < nsm::State::Exchange {
        return Err(Error::DbDescReject(
            router_id,
            instance.arenas.neighbors[nbr_idx].state,
        ));
    }

    let mut ack_hdrs = vec![];
    for lsa in lsu.lsas {
        // LSAs of unrecognized types are dropped silently.
        if lsa.body.is_unknown() {
            continue;
        }

        ack_hdrs.push(lsa.hdr);

        // Our own LSAs echoed back need no processing, only the ack.
        if lsa.hdr.adv_rtr == instance.cfg.router_id {
            satisfy_lsreq(instance, ifindex, nbr_idx, &lsa);
            continue;
        }

        // Install-or-drop; newly installed LSAs are flooded onward and
        // recorded in the timing log.
        if process_lsa(instance, lsa.clone()) {
            if instance.cfg.enable_lsa_timing_log {
                let now = instance.sys.now();
                instance.state.logs.log_lsa_timing(
                    now,
                    &lsa.hdr.key(),
                    lsa.hdr.seq_no,
                );
            }
            flood::flood(instance, ifindex, &lsa);
        }

        satisfy_lsreq(instance, ifindex, nbr_idx, &lsa);
    }

    // Acknowledge everything received, duplicates included, so the
    // sender's keyed retransmissions stop.
    if !ack_hdrs.is_empty() {
        output::send_lsack(instance, ifindex, src, ack_hdrs);
    }

    Ok(())
}

// While Loading, an arriving LSA may answer the LS Request in flight;
// once the whole page is satisfied, move on to the next one.
fn satisfy_lsreq<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    nbr_idx: NeighborIndex,
    lsa: &Lsa,
) {
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    if nbr.state != nsm::State::Loading {
        return;
    }
    let Some(outstanding) = nbr.last_sent_lsreq.as_mut() else {
        return;
    };
    outstanding.remove(&lsa.hdr.key());
    if outstanding.is_empty() {
        nbr.last_sent_lsreq = None;
        output::stop_rxmt(instance, nbr_idx);
        send_next_lsr(instance, ifindex, nbr_idx);
    }
}

// ===== LS Ack packets =====

fn process_lsack<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    src: Ipv4Addr,
    lsack: LsAck,
) -> Result<(), Error> {
    let router_id = lsack.hdr.router_id;
    let nbr_key = NeighborKey::new(router_id, src);
    let nbr_idx = nbr_lookup(instance, ifindex, &nbr_key)
        .ok_or(Error::UnknownNeighbor(src, router_id))?;

    // Each acked header cancels the matching keyed retransmission.
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    for hdr in &lsack.lsa_hdrs {
        let key = hdr.key();
        nbr.lists.ls_rxmt.remove(&key);
        if let Some(handle) = nbr.tasks.ls_rxmt.remove(&key) {
            instance.sys.cancel(handle);
        }
    }

    Ok(())
}

// ===== LSA processing =====

// Install-or-drop one LSA and run the per-type side effects. Returns
// whether the LSA was installed (i.e., it was new).
pub(crate) fn process_lsa<S: SystemApi>(
    instance: &mut Instance<S>,
    lsa: Lsa,
) -> bool {
    let hdr = lsa.hdr;
    match hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            if !instance.state.lsdb.install(lsa) {
                return false;
            }
            if instance.cfg.enable_area_proxy {
                if instance.state.is_area_leader {
                    lsdb::throttled_originate_area(instance);
                    lsdb::log_mapping(instance, &hdr);
                }
                area::update_eligibility(instance);
            }
            spf::schedule(instance, SpfLevel::L1);
            true
        }
        Some(LsaTypeCode::L1Summary) => {
            if !instance.state.lsdb.install(lsa) {
                return false;
            }
            if instance.cfg.enable_area_proxy
                && instance.state.is_area_leader
            {
                lsdb::throttled_originate_l2_summary(instance);
                lsdb::log_mapping(instance, &hdr);
            }
            route::update_routing(instance);
            true
        }
        Some(LsaTypeCode::Area) => {
            if !instance.cfg.enable_area_proxy
                || !instance.state.lsdb.install(lsa)
            {
                return false;
            }
            spf::schedule(instance, SpfLevel::L2);
            true
        }
        Some(LsaTypeCode::L2Summary) => {
            if !instance.cfg.enable_area_proxy
                || !instance.state.lsdb.install(lsa)
            {
                return false;
            }
            route::update_routing(instance);
            true
        }
        _ => false,
    }
}

// ===== timer dispatch =====

pub(crate) fn process_timer<S: SystemApi>(
    instance: &mut Instance<S>,
    msg: TimerMsg,
) {
    match msg {
        TimerMsg::HelloInterval => {
            output::send_hello(instance);
        }
        TimerMsg::NbrDeadTimer { ifindex, key } => {
            process_nbr_dead_timer(instance, ifindex, key);
        }
        TimerMsg::RxmtInterval { ifindex, key } => {
            process_rxmt_interval(instance, ifindex, key);
        }
        TimerMsg::LsaRxmtInterval {
            ifindex,
            key,
            lsa_key,
        } => {
            process_lsa_rxmt_interval(instance, ifindex, key, lsa_key);
        }
        TimerMsg::SpfDelay(level) => {
            match level {
                SpfLevel::L1 => instance.state.tasks.spf_l1 = None,
                SpfLevel::L2 => instance.state.tasks.spf_l2 = None,
            }
            spf::run(instance, level);
        }
        TimerMsg::DelayedOrig(key) => {
            instance.state.tasks.delayed_orig.remove(&key);
            match key.lsa_type.type_code() {
                Some(LsaTypeCode::Router) => {
                    lsdb::originate_router_lsa(instance)
                }
                Some(LsaTypeCode::L1Summary) => {
                    lsdb::originate_l1_summary(instance)
                }
                Some(LsaTypeCode::Area) => {
                    if instance.state.is_area_leader {
                        lsdb::originate_area(instance);
                    }
                }
                Some(LsaTypeCode::L2Summary) => {
                    if instance.state.is_area_leader {
                        lsdb::originate_l2_summary(instance);
                    }
                }
                _ => (),
            }
        }
        TimerMsg::AreaLeaderAttempt => {
            instance.state.tasks.leader_attempt = None;
            area::attempt_fired(instance);
        }
        TimerMsg::InterfaceSync => {
            instance.sync_interfaces();
            if !instance.cfg.interface_sync_interval.is_zero() {
                instance.state.tasks.iface_sync = Some(tasks::schedule(
                    &instance.sys,
                    &instance.sys,
                    instance.cfg.interface_sync_interval,
                    TimerMsg::InterfaceSync,
                ));
            }
        }
    }
}

// Router dead interval expired: the neighbor is gone.
fn process_nbr_dead_timer<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    key: NeighborKey,
) {
    let Some(nbr_idx) = nbr_lookup(instance, ifindex, &key) else {
        return;
    };

    {
        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        Debug::NsmTransition(nbr.router_id, nbr.state, nsm::State::Down)
            .log();
        nbr.state = nsm::State::Down;
        if let Some(handle) = nbr.tasks.dead_timer.take() {
            instance.sys.cancel(handle);
        }
    }
    clear_nbr_timers(instance, nbr_idx);

    Debug::NeighborDelete(key.router_id).log();
    let InstanceArenas {
        interfaces,
        neighbors,
    } = &mut instance.arenas;
    interfaces[ifindex as usize].remove_neighbor(neighbors, &key);

    lsdb::throttled_originate_router_lsa(instance);
}

// Per-neighbor retransmission (DBD or LSR).
fn process_rxmt_interval<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    key: NeighborKey,
) {
    let Some(nbr_idx) = nbr_lookup(instance, ifindex, &key) else {
        return;
    };

    let (state, packet) = {
        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        nbr.tasks.rxmt = None;
        (nbr.state, nbr.rxmt_packet.clone())
    };
    let Some((pkt_type, data)) = packet else {
        return;
    };
    if state < nsm::State::TwoWay {
        instance.arenas.neighbors[nbr_idx].rxmt_packet = None;
        return;
    }

    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        key.addr,
        pkt_type,
        "",
        data,
    );
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
    nbr.tasks.rxmt = Some(tasks::schedule(
        &instance.sys,
        &instance.sys,
        instance.cfg.rxmt_interval,
        TimerMsg::RxmtInterval { ifindex, key },
    ));
}

// Per-(neighbor, key) LS Update retransmission.
fn process_lsa_rxmt_interval<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    key: NeighborKey,
    lsa_key: LsaKey,
) {
    let Some(nbr_idx) = nbr_lookup(instance, ifindex, &key) else {
        return;
    };

    let (state, data) = {
        let nbr = &mut instance.arenas.neighbors[nbr_idx];
        nbr.tasks.ls_rxmt.remove(&lsa_key);
        (nbr.state, nbr.lists.ls_rxmt.get(&lsa_key).cloned())
    };
    let Some(data) = data else {
        return;
    };
    if state < nsm::State::TwoWay {
        instance.arenas.neighbors[nbr_idx].lists.ls_rxmt.remove(&lsa_key);
        return;
    }

    network::send_packet(
        instance,
        ifindex,
        SocketKind::Unicast,
        key.addr,
        PacketType::LsUpdate,
        "",
        data,
    );
    let nbr = &mut instance.arenas.neighbors[nbr_idx];
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
}

// ===== helper functions =====

fn nbr_lookup<S: SystemApi>(
    instance: &Instance<S>,
    ifindex: u32,
    key: &NeighborKey,
) -> Option<NeighborIndex> {
    instance
        .arenas
        .interfaces
        .get(ifindex as usize)?
        .get_neighbor(key)
}
