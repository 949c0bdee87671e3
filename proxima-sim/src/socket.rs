//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque identifier of an open raw socket.
pub type SocketHandle = u64;

/// Local binding requested when opening a raw socket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SocketBind {
    /// Bind and connect to a well-known multicast group.
    Multicast(Ipv4Addr),
    /// Bind to the wildcard address (unicast send/receive).
    Any,
}

/// Raw IPv4 socket layer provided by the hosting simulation.
///
/// Sockets carry protocol-89 datagrams with a TTL of 1 and are bound to
/// a single network device. Received datagrams are not read from the
/// socket; the host delivers them to the instance's dispatch entry
/// point together with the arrival interface.
pub trait PacketIo {
    /// Open a raw socket bound to the given device.
    fn open(
        &self,
        ifindex: u32,
        bind: SocketBind,
    ) -> Result<SocketHandle, std::io::Error>;

    /// Transmit a raw IPv4 datagram. Sends on a socket whose underlying
    /// device is down are silently dropped.
    fn send_to(
        &self,
        socket: SocketHandle,
        dst: Ipv4Addr,
        data: Bytes,
    ) -> Result<(), std::io::Error>;

    /// Close the socket. Further sends on the handle fail.
    fn close(&self, socket: SocketHandle);
}
