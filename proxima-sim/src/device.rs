//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Snapshot of one bound network device as seen by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DeviceInfo {
    pub ifindex: u32,
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mtu: u16,
    pub up: bool,
    pub point_to_point: bool,
    /// Peer address on point-to-point channels, used for gateway
    /// learning. `None` on multi-access devices.
    pub peer: Option<Ipv4Addr>,
}

impl DeviceInfo {
    /// The index-0 loopback placeholder every device table starts with.
    pub fn loopback() -> DeviceInfo {
        DeviceInfo {
            ifindex: 0,
            addr: Ipv4Addr::LOCALHOST,
            mask: Ipv4Addr::new(255, 0, 0, 0),
            mtu: u16::MAX,
            up: true,
            point_to_point: false,
            peer: None,
        }
    }
}

/// Enumeration of the devices bound to this router.
pub trait DeviceSet {
    /// All bound devices, index 0 first.
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Look up a single device by interface index.
    fn device(&self, ifindex: u32) -> Option<DeviceInfo>;
}
