//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// One entry of the host's IPv4 routing table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteEntry {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub ifindex: u32,
    pub metric: u32,
}

/// The host's static IPv4 routing table.
///
/// The engine appends its computed routes after whatever static entries
/// the host installed at boot, and trims back to that base before every
/// reinstall pass.
pub trait RouteTable {
    /// Append a network route.
    fn add_network_route(&self, entry: RouteEntry);

    /// Remove the route at the given index. Out-of-range indexes are
    /// ignored.
    fn remove_route(&self, index: u32);

    /// Number of installed routes.
    fn n_routes(&self) -> u32;

    /// Read the route at the given index.
    fn route(&self, index: u32) -> Option<RouteEntry>;
}
