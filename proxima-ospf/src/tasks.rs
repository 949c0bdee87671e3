//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use proxima_sim::rng::UniformRng;
use proxima_sim::time::{Scheduler, TimerHandle};
use serde::{Deserialize, Serialize};

use crate::collections::NeighborKey;
use crate::packet::lsa::LsaKey;
use crate::spf::SpfLevel;

// Timer messages delivered back through the external scheduler.
//
// Every deferred action in the engine is one of these; the host feeds
// them into `Instance::dispatch` when their time comes. Throttling and
// debouncing follow from keeping at most one outstanding handle per
// key.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TimerMsg {
    // Periodic Hello transmission.
    HelloInterval,
    // Router dead interval expired for one neighbor.
    NbrDeadTimer { ifindex: u32, key: NeighborKey },
    // DBD/LSR retransmission for one neighbor.
    RxmtInterval { ifindex: u32, key: NeighborKey },
    // LS Update retransmission for one (neighbor, LSA key).
    LsaRxmtInterval {
        ifindex: u32,
        key: NeighborKey,
        lsa_key: LsaKey,
    },
    // Debounced shortest-path recomputation.
    SpfDelay(SpfLevel),
    // MinLSInterval-deferred origination.
    DelayedOrig(LsaKey),
    // Initial area-leadership attempt.
    AreaLeaderAttempt,
    // Periodic host interface poll.
    InterfaceSync,
}

// Uniform transmission jitter in [0, 5) ms, applied to every scheduled
// send so bursts do not synchronize across the topology.
pub(crate) fn jitter<R: UniformRng>(rng: &R) -> Duration {
    Duration::from_micros(rng.rand_range(0, 5_000))
}

pub(crate) fn schedule<S, R>(
    sched: &S,
    rng: &R,
    delay: Duration,
    msg: TimerMsg,
) -> TimerHandle
where
    S: Scheduler<TimerMsg>,
    R: UniformRng,
{
    sched.schedule(delay + jitter(rng), msg)
}
