//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;
use std::time::Duration;

use proxima_sim::time::{Clock, Scheduler};
use serde::{Deserialize, Serialize};

use crate::area;
use crate::debug::Debug;
use crate::flood;
use crate::instance::{Instance, SystemApi};
use crate::packet::lsa::{
    Lsa, LsaBody, LsaHdr, LsaKey, LsaL1Summary, LsaL2Summary, LsaRouter,
    LsaArea, LsaRouterFlags, LsaTypeCode,
};
use crate::route;
use crate::spf::{self, SpfLevel};
use crate::tasks::TimerMsg;

// The four link-state databases plus the origination bookkeeping.
//
// Entries are mutated only by replacement with a strictly newer LSA
// (or the smaller advertising router on a sequence tie). There is no
// aging: stale entries live until replaced.
#[derive(Debug, Default)]
pub struct LsdbSet {
    // RouterId -> Router-LSA.
    pub router: BTreeMap<Ipv4Addr, Lsa>,
    // RouterId -> L1-Summary-LSA.
    pub l1_summary: BTreeMap<Ipv4Addr, Lsa>,
    // AreaId -> Area-LSA.
    pub area: BTreeMap<u32, Lsa>,
    // AreaId -> L2-Summary-LSA.
    pub l2_summary: BTreeMap<u32, Lsa>,
    // Last-originated sequence number for keys this router originates.
    pub seq_numbers: BTreeMap<LsaKey, u16>,
    // Timestamp of the last origination per key, for MinLSInterval.
    pub(crate) last_origination: BTreeMap<LsaKey, Duration>,
    pub throttle_stats: ThrottleStats,
}

// MinLSInterval throttle counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ThrottleStats {
    pub triggers: u64,
    pub immediate: u64,
    pub deferred: u64,
    pub suppressed: u64,
    pub cancelled_pending: u64,
}

// ===== impl LsdbSet =====

impl LsdbSet {
    // Install-vs-drop decision for one incoming LSA. Returns whether
    // the LSA was installed.
    pub fn install(&mut self, lsa: Lsa) -> bool {
        let hdr = lsa.hdr;
        let installed = match hdr.lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                install_entry(&mut self.router, Ipv4Addr::from(hdr.lsa_id), lsa)
            }
            Some(LsaTypeCode::L1Summary) => install_entry(
                &mut self.l1_summary,
                Ipv4Addr::from(hdr.lsa_id),
                lsa,
            ),
            Some(LsaTypeCode::Area) => {
                install_entry(&mut self.area, hdr.lsa_id, lsa)
            }
            Some(LsaTypeCode::L2Summary) => {
                install_entry(&mut self.l2_summary, hdr.lsa_id, lsa)
            }
            _ => false,
        };
        if installed {
            Debug::LsaInstall(&hdr).log();
        }
        installed
    }

    // Fetch a stored LSA by key, ignoring the advertising router (one
    // entry exists per LSA ID).
    pub fn fetch(&self, key: &LsaKey) -> Option<&Lsa> {
        match key.lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                self.router.get(&Ipv4Addr::from(key.lsa_id))
            }
            Some(LsaTypeCode::L1Summary) => {
                self.l1_summary.get(&Ipv4Addr::from(key.lsa_id))
            }
            Some(LsaTypeCode::Area) => self.area.get(&key.lsa_id),
            Some(LsaTypeCode::L2Summary) => self.l2_summary.get(&key.lsa_id),
            _ => None,
        }
    }

    // All stored LSAs, L1 databases first.
    pub fn iter_all(&self) -> impl Iterator<Item = &Lsa> {
        self.router
            .values()
            .chain(self.l1_summary.values())
            .chain(self.area.values())
            .chain(self.l2_summary.values())
    }

    // Headers a neighbor is eligible to see during database exchange:
    // the L1 databases only when the neighbor shares our area, the L2
    // databases always.
    pub fn dbd_snapshot(&self, same_area: bool) -> Vec<LsaHdr> {
        let mut hdrs = vec![];
        if same_area {
            hdrs.extend(self.router.values().map(|lsa| lsa.hdr));
            hdrs.extend(self.l1_summary.values().map(|lsa| lsa.hdr));
        }
        hdrs.extend(self.area.values().map(|lsa| lsa.hdr));
        hdrs.extend(self.l2_summary.values().map(|lsa| lsa.hdr));
        hdrs
    }

    // Local (key -> sequence number) view with the same eligibility
    // filter, used to compute the request list while Loading.
    pub fn local_seq_nos(
        &self,
        same_area: bool,
    ) -> BTreeMap<LsaKey, u32> {
        self.dbd_snapshot(same_area)
            .into_iter()
            .map(|hdr| (hdr.key(), hdr.seq_no))
            .collect()
    }

    pub fn router_lsdb_hash(&self) -> u64 {
        lsdb_hash(self.router.values())
    }

    pub fn l1_summary_lsdb_hash(&self) -> u64 {
        lsdb_hash(self.l1_summary.values())
    }

    pub fn area_lsdb_hash(&self) -> u64 {
        lsdb_hash(self.area.values())
    }

    pub fn l2_summary_lsdb_hash(&self) -> u64 {
        lsdb_hash(self.l2_summary.values())
    }

    pub fn reset_throttle_stats(&mut self) {
        self.throttle_stats = Default::default();
    }
}

fn install_entry<K: Ord>(
    tree: &mut BTreeMap<K, Lsa>,
    key: K,
    lsa: Lsa,
) -> bool {
    match tree.get(&key) {
        None => {
            tree.insert(key, lsa);
            true
        }
        Some(stored) => {
            let newer = lsa.hdr.seq_no > stored.hdr.seq_no
                || (lsa.hdr.seq_no == stored.hdr.seq_no
                    && lsa.hdr.adv_rtr < stored.hdr.adv_rtr);
            if newer {
                tree.insert(key, lsa);
            }
            newer
        }
    }
}

// Content hash over the canonical rendering of one database, used to
// compare databases across routers and snapshot round-trips.
fn lsdb_hash<'a>(entries: impl Iterator<Item = &'a Lsa>) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for lsa in entries {
        lsa.hdr.lsa_type.0.hash(&mut hasher);
        lsa.hdr.lsa_id.hash(&mut hasher);
        lsa.hdr.adv_rtr.hash(&mut hasher);
        lsa.raw.as_ref().hash(&mut hasher);
    }
    hasher.finish()
}

// ===== origination =====

pub(crate) fn router_lsa_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaTypeCode::Router.into(), router_id, router_id.into())
}

pub(crate) fn l1_summary_lsa_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaTypeCode::L1Summary.into(), router_id, router_id.into())
}

pub(crate) fn area_lsa_key(router_id: Ipv4Addr, area_id: u32) -> LsaKey {
    LsaKey::new(LsaTypeCode::Area.into(), router_id, area_id)
}

pub(crate) fn l2_summary_lsa_key(
    router_id: Ipv4Addr,
    area_id: u32,
) -> LsaKey {
    LsaKey::new(LsaTypeCode::L2Summary.into(), router_id, area_id)
}

// MinLSInterval gate shared by every origination path: run now, defer,
// or coalesce into an already pending regeneration.
fn throttle_gate<S: SystemApi>(
    instance: &mut Instance<S>,
    key: LsaKey,
) -> bool {
    let stats = &mut instance.state.lsdb.throttle_stats;
    stats.triggers += 1;

    let min_interval = instance.cfg.min_ls_interval;
    let delay = if min_interval.is_zero() {
        Duration::ZERO
    } else {
        match instance.state.lsdb.last_origination.get(&key) {
            Some(last) => {
                let elapsed = instance.sys.now().saturating_sub(*last);
                min_interval.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    };

    if delay.is_zero() {
        if let Some(handle) = instance.state.tasks.delayed_orig.remove(&key)
        {
            instance.sys.cancel(handle);
            instance.state.lsdb.throttle_stats.cancelled_pending += 1;
        }
        instance.state.lsdb.throttle_stats.immediate += 1;
        return true;
    }

    if !instance.state.tasks.delayed_orig.contains_key(&key) {
        Debug::LsaOriginateDelayed(&key).log();
        instance.state.lsdb.throttle_stats.deferred += 1;
        let handle = instance
            .sys
            .schedule(delay, TimerMsg::DelayedOrig(key));
        instance.state.tasks.delayed_orig.insert(key, handle);
    } else {
        Debug::LsaOriginateSuppressed(&key).log();
        instance.state.lsdb.throttle_stats.suppressed += 1;
    }
    false
}

pub(crate) fn throttled_originate_router_lsa<S: SystemApi>(
    instance: &mut Instance<S>,
) {
    let key = router_lsa_key(instance.cfg.router_id);
    if throttle_gate(instance, key) {
        originate_router_lsa(instance);
    }
}

pub(crate) fn throttled_originate_l1_summary<S: SystemApi>(
    instance: &mut Instance<S>,
) {
    let key = l1_summary_lsa_key(instance.cfg.router_id);
    if throttle_gate(instance, key) {
        originate_l1_summary(instance);
    }
}

pub(crate) fn throttled_originate_area<S: SystemApi>(
    instance: &mut Instance<S>,
) {
    let key = area_lsa_key(instance.cfg.router_id, instance.cfg.area_id);
    if throttle_gate(instance, key) {
        originate_area(instance);
    }
}

pub(crate) fn throttled_originate_l2_summary<S: SystemApi>(
    instance: &mut Instance<S>,
) {
    let key =
        l2_summary_lsa_key(instance.cfg.router_id, instance.cfg.area_id);
    if throttle_gate(instance, key) {
        originate_l2_summary(instance);
    }
}

// Rebuild the local Router-LSA from the interface adjacencies, bump
// its sequence number and flood it.
pub(crate) fn originate_router_lsa<S: SystemApi>(instance: &mut Instance<S>) {
    let key = router_lsa_key(instance.cfg.router_id);
    record_origination(instance, key);

    let mut links = vec![];
    for iface in instance.arenas.interfaces.iter().skip(1) {
        links.extend(iface.active_router_links(&instance.arenas.neighbors));
    }
    let body = LsaBody::Router(LsaRouter {
        flags: LsaRouterFlags::empty(),
        links,
    });

    let lsa = build_own_lsa(instance, key, body);
    Debug::LsaOriginate(&lsa.hdr).log();
    log_timing(instance, &lsa.hdr);
    instance.state.lsdb.install(lsa.clone());

    spf::schedule(instance, SpfLevel::L1);
    flood::flood(instance, 0, &lsa);

    if instance.cfg.enable_area_proxy {
        if instance.state.is_area_leader {
            throttled_originate_area(instance);
            log_mapping(instance, &lsa.hdr);
        }
        area::update_eligibility(instance);
    }
}

// Rebuild the local L1-Summary-LSA from the injected prefixes and
// flood it.
pub(crate) fn originate_l1_summary<S: SystemApi>(instance: &mut Instance<S>) {
    let key = l1_summary_lsa_key(instance.cfg.router_id);
    record_origination(instance, key);

    let mut body = LsaL1Summary::default();
    for route in &instance.state.external_routes {
        body.routes.insert(crate::packet::lsa::SummaryRoute::new(
            route.network.network(),
            route.network.mask(),
            route.metric,
        ));
    }
    let body = LsaBody::L1Summary(body);

    let lsa = build_own_lsa(instance, key, body);
    Debug::LsaOriginate(&lsa.hdr).log();
    log_timing(instance, &lsa.hdr);
    instance.state.lsdb.install(lsa.clone());

    flood::flood(instance, 0, &lsa);
    route::update_routing(instance);

    if instance.cfg.enable_area_proxy && instance.state.is_area_leader {
        throttled_originate_l2_summary(instance);
        log_mapping(instance, &lsa.hdr);
    }
}

// Project the cross-area links of the whole Router LSDB into a fresh
// Area-LSA. Suppressed when the link set is unchanged. Leader only.
pub(crate) fn originate_area<S: SystemApi>(
    instance: &mut Instance<S>,
) -> bool {
    let mut body = LsaArea::default();
    for lsa in instance.state.lsdb.router.values() {
        if let LsaBody::Router(router) = &lsa.body {
            body.links.extend(router.cross_area_links());
        }
    }

    // Skip regeneration when the stored Area-LSA already reflects the
    // current cross-area links.
    if let Some(stored) = instance.state.lsdb.area.get(&instance.cfg.area_id)
        && let LsaBody::Area(stored) = &stored.body
        && stored.links == body.links
    {
        return false;
    }

    let key = area_lsa_key(instance.cfg.router_id, instance.cfg.area_id);
    record_origination(instance, key);

    let lsa = build_own_lsa(instance, key, LsaBody::Area(body));
    Debug::LsaOriginate(&lsa.hdr).log();
    log_timing(instance, &lsa.hdr);
    instance.state.lsdb.install(lsa.clone());

    flood::flood(instance, 0, &lsa);
    spf::schedule(instance, SpfLevel::L2);
    true
}

// Union every L1 summary into a fresh L2-Summary-LSA. Suppressed when
// the route set is unchanged. Leader only.
pub(crate) fn originate_l2_summary<S: SystemApi>(
    instance: &mut Instance<S>,
) -> bool {
    let mut body = LsaL2Summary::default();
    for lsa in instance.state.lsdb.l1_summary.values() {
        if let LsaBody::L1Summary(summary) = &lsa.body {
            body.routes.extend(summary.routes.iter().copied());
        }
    }

    if let Some(stored) =
        instance.state.lsdb.l2_summary.get(&instance.cfg.area_id)
        && let LsaBody::L2Summary(stored) = &stored.body
        && stored.routes == body.routes
    {
        return false;
    }

    let key =
        l2_summary_lsa_key(instance.cfg.router_id, instance.cfg.area_id);
    record_origination(instance, key);

    let lsa = build_own_lsa(instance, key, LsaBody::L2Summary(body));
    Debug::LsaOriginate(&lsa.hdr).log();
    log_timing(instance, &lsa.hdr);
    instance.state.lsdb.install(lsa.clone());

    flood::flood(instance, 0, &lsa);
    route::update_routing(instance);
    true
}

fn record_origination<S: SystemApi>(instance: &mut Instance<S>, key: LsaKey) {
    if !instance.cfg.min_ls_interval.is_zero() {
        let now = instance.sys.now();
        instance.state.lsdb.last_origination.insert(key, now);
    }
}

fn build_own_lsa<S: SystemApi>(
    instance: &mut Instance<S>,
    key: LsaKey,
    body: LsaBody,
) -> Lsa {
    let seq_no = instance
        .state
        .lsdb
        .seq_numbers
        .entry(key)
        .and_modify(|seq_no| *seq_no += 1)
        .or_insert(1);
    Lsa::new(key.lsa_id, key.adv_rtr, *seq_no as u32, body)
}

fn log_timing<S: SystemApi>(instance: &mut Instance<S>, hdr: &LsaHdr) {
    if instance.cfg.enable_lsa_timing_log {
        let now = instance.sys.now();
        instance.state.logs.log_lsa_timing(now, &hdr.key(), hdr.seq_no);
    }
}

// On an area leader, record which L1 change caused which L2
// origination.
pub(crate) fn log_mapping<S: SystemApi>(
    instance: &mut Instance<S>,
    trigger: &LsaHdr,
) {
    if !instance.cfg.enable_lsa_timing_log {
        return;
    }
    let l2_hdr = match trigger.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => instance
            .state
            .lsdb
            .area
            .get(&instance.cfg.area_id)
            .map(|lsa| lsa.hdr),
        Some(LsaTypeCode::L1Summary) => instance
            .state
            .lsdb
            .l2_summary
            .get(&instance.cfg.area_id)
            .map(|lsa| lsa.hdr),
        _ => None,
    };
    if let Some(l2_hdr) = l2_hdr {
        let l1_token = trigger.key().token(trigger.seq_no);
        let l2_token = l2_hdr.key().token(l2_hdr.seq_no);
        instance.state.logs.log_lsa_mapping(
            instance.cfg.log_dir.as_deref(),
            &l1_token,
            &l2_token,
        );
    }
}
