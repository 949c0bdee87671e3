//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, Bytes, BytesMut};
use proxima_sim::socket::{PacketIo, SocketBind, SocketHandle};
use proxima_sim::time::Clock;

use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::events;
use crate::instance::{Instance, SystemApi};
use crate::logging;
use crate::packet::error::DecodeError;
use crate::packet::{Ipv4Hdr, Packet, PacketHdr, PacketType};

// The three sockets every protocol interface owns: Hello multicast,
// LSA multicast and unicast. Indexed by IfIndex, entry 0 unused.
#[derive(Debug, Default)]
pub struct SocketSet {
    pub hello: Vec<Option<SocketHandle>>,
    pub lsa: Vec<Option<SocketHandle>>,
    pub unicast: Vec<Option<SocketHandle>>,
}

// Which of an interface's sockets a packet leaves through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketKind {
    Hello,
    Lsa,
    Unicast,
}

// ===== global functions =====

// Open the per-interface socket triple for every usable interface.
// A bind failure at this point is a configuration bug and aborts
// startup.
pub(crate) fn start_interfaces<S: SystemApi>(
    instance: &mut Instance<S>,
) -> Result<(), Error> {
    let n_ifaces = instance.arenas.interfaces.len();
    let sockets = &mut instance.state.sockets;
    sockets.hello.resize(n_ifaces, None);
    sockets.lsa.resize(n_ifaces, None);
    sockets.unicast.resize(n_ifaces, None);

    for ifindex in 1..n_ifaces as u32 {
        let iface = &instance.arenas.interfaces[ifindex as usize];
        // In auto-sync mode, down interfaces get no sockets until
        // their up-transition.
        if instance.cfg.auto_sync_interfaces && !iface.up {
            continue;
        }
        open_interface(instance, ifindex)
            .map_err(|error| match error {
                Error::IoError(error) => {
                    Error::InterfaceStartError(ifindex, error)
                }
                error => error,
            })?;
    }

    Ok(())
}

// Open the socket triple for one interface. A no-op when the sockets
// already exist.
pub(crate) fn open_interface<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
) -> Result<(), Error> {
    let n_ifaces = instance.arenas.interfaces.len();
    let sockets = &mut instance.state.sockets;
    sockets.hello.resize(n_ifaces.max(sockets.hello.len()), None);
    sockets.lsa.resize(n_ifaces.max(sockets.lsa.len()), None);
    sockets
        .unicast
        .resize(n_ifaces.max(sockets.unicast.len()), None);
    if sockets
        .hello
        .get(ifindex as usize)
        .is_some_and(|socket| socket.is_some())
    {
        return Ok(());
    }

    let hello = instance
        .sys
        .open(ifindex, SocketBind::Multicast(instance.cfg.hello_addr))
        .map_err(|error| Error::from(IoError::SocketError(error)))?;
    let lsa = instance
        .sys
        .open(ifindex, SocketBind::Multicast(instance.cfg.lsa_addr))
        .map_err(|error| Error::from(IoError::SocketError(error)))?;
    let unicast = instance
        .sys
        .open(ifindex, SocketBind::Any)
        .map_err(|error| Error::from(IoError::SocketError(error)))?;

    let sockets = &mut instance.state.sockets;
    sockets.hello[ifindex as usize] = Some(hello);
    sockets.lsa[ifindex as usize] = Some(lsa);
    sockets.unicast[ifindex as usize] = Some(unicast);

    Ok(())
}

// Close one interface's sockets; pending sends on them become no-ops.
pub(crate) fn close_interface<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
) {
    let sockets = &mut instance.state.sockets;
    for list in [&mut sockets.hello, &mut sockets.lsa, &mut sockets.unicast]
    {
        if let Some(socket) =
            list.get_mut(ifindex as usize).and_then(Option::take)
        {
            instance.sys.close(socket);
        }
    }
}

pub(crate) fn close_sockets<S: SystemApi>(instance: &mut Instance<S>) {
    let sockets = std::mem::take(&mut instance.state.sockets);
    for socket in sockets
        .hello
        .into_iter()
        .chain(sockets.lsa)
        .chain(sockets.unicast)
        .flatten()
    {
        instance.sys.close(socket);
    }
}

// Transmit one encoded OSPF packet through the given interface socket,
// wrapped in a minimal IPv4 header. Sends on interfaces without a
// socket are silently dropped.
pub(crate) fn send_packet<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    kind: SocketKind,
    dst: Ipv4Addr,
    pkt_type: PacketType,
    lsa_level: &'static str,
    data: Bytes,
) {
    let sockets = &instance.state.sockets;
    let socket = match kind {
        SocketKind::Hello => &sockets.hello,
        SocketKind::Lsa => &sockets.lsa,
        SocketKind::Unicast => &sockets.unicast,
    };
    let Some(socket) = socket.get(ifindex as usize).copied().flatten()
    else {
        return;
    };
    let Some(iface) = instance.arenas.interfaces.get(ifindex as usize)
    else {
        return;
    };

    let mut buf =
        BytesMut::with_capacity(Ipv4Hdr::LENGTH as usize + data.len());
    let ip_hdr = Ipv4Hdr {
        total_length: Ipv4Hdr::LENGTH + data.len() as u16,
        ttl: 1,
        protocol: Ipv4Hdr::OSPF_PROTOCOL,
        src: iface.addr,
        dst,
    };
    ip_hdr.encode(&mut buf);
    buf.extend_from_slice(&data);

    Debug::PacketTx(ifindex, &dst, pkt_type).log();
    let log_packet = instance.cfg.enable_packet_log
        && (pkt_type != PacketType::Hello
            || instance.cfg.include_hello_in_packet_log);
    if log_packet {
        let now = instance.sys.now();
        instance
            .state
            .logs
            .log_packet_tx(now, data.len(), pkt_type, lsa_level);
    }

    if let Err(error) = instance.sys.send_to(socket, dst, buf.freeze()) {
        IoError::SendError(error).log();
    }
}

// Encode a packet, filling in the header checksum when enabled.
pub(crate) fn encode_packet<S: SystemApi>(
    instance: &Instance<S>,
    packet: &Packet,
) -> Bytes {
    let data = packet.encode();
    if !instance.cfg.enable_checksum {
        return data;
    }
    let mut data = BytesMut::from(data.as_ref());
    PacketHdr::update_cksum(&mut data);
    data.freeze()
}

// Receive entry point: peel the IPv4 header, filter by destination,
// decode the OSPF packet and hand it to the protocol handlers.
pub(crate) fn read_packet<S: SystemApi>(
    instance: &mut Instance<S>,
    ifindex: u32,
    mut data: Bytes,
) -> Result<(), Error> {
    let iface_addr = instance
        .arenas
        .interfaces
        .get(ifindex as usize)
        .filter(|_| ifindex != 0)
        .map(|iface| iface.addr)
        .ok_or(Error::InterfaceIndexNotFound(ifindex))?;

    let ip_hdr =
        Ipv4Hdr::decode(&mut data).map_err(Error::PacketDecodeError)?;
    if ip_hdr.protocol != Ipv4Hdr::OSPF_PROTOCOL {
        return Err(Error::PacketDecodeError(
            DecodeError::InvalidIpProtocol(ip_hdr.protocol),
        ));
    }

    // Trim to the declared payload.
    let payload_len = ip_hdr.payload_length();
    if payload_len > data.remaining() {
        return Err(Error::PacketDecodeError(DecodeError::InvalidLength(
            ip_hdr.total_length,
        )));
    }
    let mut payload = data.slice(..payload_len);

    // Drop packets not meant for us on multi-access segments.
    if ip_hdr.dst != instance.cfg.hello_addr
        && ip_hdr.dst != instance.cfg.lsa_addr
        && ip_hdr.dst != iface_addr
    {
        return Err(Error::InvalidDstAddr(ip_hdr.dst));
    }

    if instance.cfg.enable_checksum {
        PacketHdr::verify_cksum(payload.as_ref())
            .map_err(Error::PacketDecodeError)?;
    }

    let packet =
        Packet::decode(&mut payload).map_err(Error::PacketDecodeError)?;
    Debug::PacketRx(ifindex, &ip_hdr.src, packet.hdr().pkt_type).log();

    events::process_packet(instance, ifindex, ip_hdr.src, packet)
}

// Level tag recorded in the packet log, derived from the payload.
pub(crate) fn packet_lsa_level(packet: &Packet) -> &'static str {
    logging::lsa_level(packet)
}
