//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use proxima_sim::time::Scheduler;

use crate::debug::Debug;
use crate::instance::{Instance, SystemApi};
use crate::lsdb;
use crate::tasks::{self, TimerMsg};

// Area-leader controller.
//
// The router with the numerically smallest RouterId among the Router
// LSDB entries is the designated leader for the area. Leadership is
// assumed only after a full RouterDeadInterval of stability, so a
// booting topology settles on one leader instead of flapping.

// Arm the initial leadership attempt at startup.
pub(crate) fn schedule_initial_attempt<S: SystemApi>(
    instance: &mut Instance<S>,
) {
    instance.state.is_area_leader = false;
    if let Some(handle) = instance.state.tasks.leader_attempt.take() {
        instance.sys.cancel(handle);
    }
    instance.state.tasks.leader_attempt = Some(tasks::schedule(
        &instance.sys,
        &instance.sys,
        instance.cfg.dead_interval,
        TimerMsg::AreaLeaderAttempt,
    ));
}

// Re-evaluate leadership whenever the Router LSDB changes: the new
// smallest router arms its attempt timer, everyone else cancels theirs
// and a deposed leader stops originating.
pub(crate) fn update_eligibility<S: SystemApi>(instance: &mut Instance<S>) {
    if believes_smallest(instance) {
        if !instance.state.is_area_leader
            && instance.state.tasks.leader_attempt.is_none()
        {
            instance.state.tasks.leader_attempt = Some(tasks::schedule(
                &instance.sys,
                &instance.sys,
                instance.cfg.dead_interval,
                TimerMsg::AreaLeaderAttempt,
            ));
        }
    } else {
        if let Some(handle) = instance.state.tasks.leader_attempt.take() {
            instance.sys.cancel(handle);
        }
        if instance.state.is_area_leader {
            leader_end(instance);
        }
    }
}

// The attempt timer fired; take leadership if still the smallest.
pub(crate) fn attempt_fired<S: SystemApi>(instance: &mut Instance<S>) {
    if !believes_smallest(instance) {
        return;
    }
    leader_begin(instance);
}

pub(crate) fn leader_begin<S: SystemApi>(instance: &mut Instance<S>) {
    Debug::AreaLeaderBegin(instance.cfg.area_id).log();
    instance.state.is_area_leader = true;

    // Start originating the area's view of the inter-area topology and
    // its summarized prefixes.
    lsdb::throttled_originate_area(instance);
    lsdb::throttled_originate_l2_summary(instance);
}

pub(crate) fn leader_end<S: SystemApi>(instance: &mut Instance<S>) {
    Debug::AreaLeaderEnd(instance.cfg.area_id).log();
    instance.state.is_area_leader = false;
}

// An empty Router LSDB counts as "smallest": an isolated router still
// leads its own area.
fn believes_smallest<S: SystemApi>(instance: &Instance<S>) -> bool {
    instance
        .state
        .lsdb
        .router
        .keys()
        .next()
        .is_none_or(|first| *first == instance.cfg.router_id)
}
