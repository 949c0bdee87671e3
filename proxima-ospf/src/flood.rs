//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::debug::Debug;
use crate::instance::{Instance, SystemApi};
use crate::neighbor::nsm;
use crate::output;
use crate::packet::lsa::Lsa;

// Flood one LSA, wrapped in a single-LSA LS Update, to every eligible
// neighbor on every interface except the arrival one (0 for locally
// originated LSAs). L1 LSAs stay inside the area; L2 LSAs cross area
// boundaries. Each copy is retransmitted per (neighbor, key) until
// acknowledged.
pub(crate) fn flood<S: SystemApi>(
    instance: &mut Instance<S>,
    arrival_ifindex: u32,
    lsa: &Lsa,
) {
    let lsa_key = lsa.hdr.key();
    Debug::LsaFlood(&lsa_key).log();

    for ifindex in 1..instance.arenas.interfaces.len() as u32 {
        // Skip the incoming interface.
        if ifindex == arrival_ifindex {
            continue;
        }

        let iface = &instance.arenas.interfaces[ifindex as usize];
        let area_id = iface.area_id;
        let targets: Vec<_> = iface
            .neighbors
            .values()
            .filter_map(|nbr_idx| {
                let nbr = instance.arenas.neighbors.get(*nbr_idx)?;
                // Adjacencies still in progress receive the copy too;
                // their retransmit timers keep it alive until acked.
                if nbr.state < nsm::State::TwoWay {
                    return None;
                }
                // L1 LSAs must not cross the area.
                if lsa.hdr.lsa_type.is_l1()
                    && nbr.area_id != instance.cfg.area_id
                {
                    return None;
                }
                Some(*nbr_idx)
            })
            .collect();

        for nbr_idx in targets {
            let (data, level) = output::build_lsupd(instance, area_id, lsa);
            output::send_to_neighbor_keyed_rxmt(
                instance, ifindex, nbr_idx, lsa_key, level, data,
            );
        }
    }
}
