//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub type NeighborIndex = generational_arena::Index;

// Neighbors are owned by an arena and referenced everywhere else by
// index; interfaces keep an ordered (RouterId, source address) tree
// pointing into it. This breaks the interface <-> neighbor <-> timer
// reference cycle without shared ownership.
#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

// Identity of a neighbor on one interface.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct NeighborKey {
    pub router_id: Ipv4Addr,
    pub addr: Ipv4Addr,
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> NeighborIndex {
        self.0.insert(value)
    }

    pub fn remove(&mut self, index: NeighborIndex) -> Option<T> {
        self.0.remove(index)
    }

    pub fn get(&self, index: NeighborIndex) -> Option<&T> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: NeighborIndex) -> Option<&mut T> {
        self.0.get_mut(index)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (NeighborIndex, &T)> {
        self.0.iter()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<NeighborIndex> for Arena<T> {
    type Output = T;

    fn index(&self, index: NeighborIndex) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<NeighborIndex> for Arena<T> {
    fn index_mut(&mut self, index: NeighborIndex) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl NeighborKey =====

impl std::fmt::Display for NeighborKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.router_id, self.addr)
    }
}
