//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{debug, debug_span};

use crate::neighbor::nsm;
use crate::packet::PacketType;
use crate::packet::lsa::{LsaHdr, LsaKey};
use crate::spf::SpfLevel;

// Debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Instance
    InstanceStart,
    InstanceStop,
    InstanceDisable,
    InstanceEnable,
    // Interfaces
    InterfaceUp(u32),
    InterfaceDown(u32),
    // Neighbors
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmTransition(Ipv4Addr, nsm::State, nsm::State),
    // Network
    PacketRx(u32, &'a Ipv4Addr, PacketType),
    PacketTx(u32, &'a Ipv4Addr, PacketType),
    // LSDB maintenance
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaOriginateDelayed(&'a LsaKey),
    LsaOriginateSuppressed(&'a LsaKey),
    LsaFlood(&'a LsaKey),
    // SPF
    SpfScheduled(SpfLevel),
    SpfRun(SpfLevel),
    // Area leadership
    AreaLeaderBegin(u32),
    AreaLeaderEnd(u32),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart
            | Debug::InstanceStop
            | Debug::InstanceDisable
            | Debug::InstanceEnable => {
                debug!("{}", self);
            }
            Debug::InterfaceUp(ifindex) | Debug::InterfaceDown(ifindex) => {
                debug_span!("interface", %ifindex).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(%old_state, %new_state, "{}", self);
                    })
                })
            }
            Debug::PacketRx(ifindex, source, pkt_type) => {
                debug_span!("input", %ifindex).in_scope(|| {
                    debug!(%source, %pkt_type, "{}", self);
                })
            }
            Debug::PacketTx(ifindex, destination, pkt_type) => {
                debug_span!("output", %ifindex).in_scope(|| {
                    debug!(%destination, %pkt_type, "{}", self);
                })
            }
            Debug::LsaInstall(hdr) | Debug::LsaOriginate(hdr) => {
                debug!(
                    lsa_type = %hdr.lsa_type,
                    lsa_id = %hdr.lsa_id,
                    adv_rtr = %hdr.adv_rtr,
                    seq_no = %hdr.seq_no,
                    "{}", self
                );
            }
            Debug::LsaOriginateDelayed(key)
            | Debug::LsaOriginateSuppressed(key)
            | Debug::LsaFlood(key) => {
                debug!(
                    lsa_type = %key.lsa_type,
                    lsa_id = %key.lsa_id,
                    adv_rtr = %key.adv_rtr,
                    "{}", self
                );
            }
            Debug::SpfScheduled(level) | Debug::SpfRun(level) => {
                debug!(?level, "{}", self);
            }
            Debug::AreaLeaderBegin(area_id) | Debug::AreaLeaderEnd(area_id) => {
                debug!(%area_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop => {
                write!(f, "stopping instance")
            }
            Debug::InstanceDisable => {
                write!(f, "disabling instance")
            }
            Debug::InstanceEnable => {
                write!(f, "enabling instance")
            }
            Debug::InterfaceUp(..) => {
                write!(f, "interface up")
            }
            Debug::InterfaceDown(..) => {
                write!(f, "interface down")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::NsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::PacketRx(..) => {
                write!(f, "packet received")
            }
            Debug::PacketTx(..) => {
                write!(f, "packet sent")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaOriginateDelayed(..) => {
                write!(f, "origination delayed by MinLSInterval")
            }
            Debug::LsaOriginateSuppressed(..) => {
                write!(f, "origination request coalesced")
            }
            Debug::LsaFlood(..) => {
                write!(f, "flooding LSA")
            }
            Debug::SpfScheduled(..) => {
                write!(f, "SPF scheduled")
            }
            Debug::SpfRun(..) => {
                write!(f, "SPF run")
            }
            Debug::AreaLeaderBegin(..) => {
                write!(f, "assuming area leadership")
            }
            Debug::AreaLeaderEnd(..) => {
                write!(f, "ceding area leadership")
            }
        }
    }
}
