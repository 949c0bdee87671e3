//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod lsa;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use proxima_sim::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};

// Database Description flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// OSPF packet type.
#[derive(Clone, Copy, Debug, Eq, Hash, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    DbDesc = 0x02,
    LsRequest = 0x03,
    LsUpdate = 0x04,
    LsAck = 0x05,
}

// OSPF packet.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

//
// Minimal IPv4 header used by the raw-socket layer.
//
// Only the fields the receive path inspects are retained; options are
// skipped on decode and never emitted on encode.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Ipv4Hdr {
    pub total_length: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

//
// OSPF packet header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Version #   |     Type      |         Packet length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Router ID                            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Area ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Checksum            |             AuType            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Authentication                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// AuType and the authentication field are always zero.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: u32,
}

//
// Hello packet.
//
// Encoding format (packet body): network mask (u32), hello interval in
// milliseconds (u16), options (u8), router priority (u8), router dead
// interval in milliseconds (u32), DR (u32), BDR (u32), then the router
// IDs of every neighbor seen on the interface.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: u8,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Ipv4Addr,
    pub bdr: Ipv4Addr,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

//
// Database Description packet.
//
// Encoding format (packet body): interface MTU (u16), options (u8),
// flags (u8, I/M/MS), DD sequence number (u32), then LSA headers.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: u8,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

//
// Link State Request packet.
//
// Encoding format (packet body): triples of LS type (u32), Link State
// ID (u32) and advertising router (u32).
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

//
// Link State Update packet.
//
// Encoding format (packet body): LSA count (u32) followed by the full
// LSAs.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

//
// Link State Acknowledgment packet.
//
// Encoding format (packet body): LSA headers.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl Ipv4Hdr =====

impl Ipv4Hdr {
    pub const LENGTH: u16 = 20;
    pub const OSPF_PROTOCOL: u8 = 89;

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let version_ihl = buf.try_get_u8()?;
        if version_ihl >> 4 != 4 {
            return Err(DecodeError::InvalidVersion(version_ihl >> 4));
        }
        let ihl = (version_ihl & 0x0f) as usize * 4;
        if ihl < Self::LENGTH as usize {
            return Err(DecodeError::InvalidIpHdrLength(ihl as u16));
        }
        let _tos = buf.try_get_u8()?;
        let total_length = buf.try_get_u16()?;
        if (total_length as usize) < ihl {
            return Err(DecodeError::InvalidIpHdrLength(total_length));
        }
        let _id = buf.try_get_u16()?;
        let _flags_frag = buf.try_get_u16()?;
        let ttl = buf.try_get_u8()?;
        let protocol = buf.try_get_u8()?;
        let _cksum = buf.try_get_u16()?;
        let src = buf.try_get_ipv4()?;
        let dst = buf.try_get_ipv4()?;
        // Skip options.
        let options = ihl - Self::LENGTH as usize;
        if buf.remaining() < options {
            return Err(DecodeError::ReadOutOfBounds);
        }
        buf.advance(options);

        Ok(Ipv4Hdr {
            total_length,
            ttl,
            protocol,
            src,
            dst,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0x45);
        buf.put_u8(0);
        buf.put_u16(self.total_length);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol);
        buf.put_u16(0);
        buf.put_ipv4(&self.src);
        buf.put_ipv4(&self.dst);
    }

    // Number of payload bytes declared by the header.
    pub(crate) fn payload_length(&self) -> usize {
        (self.total_length as usize).saturating_sub(Self::LENGTH as usize)
    }
}

// ===== impl PacketType =====

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Hello => write!(f, "hello"),
            PacketType::DbDesc => write!(f, "database-description"),
            PacketType::LsRequest => write!(f, "link-state-request"),
            PacketType::LsUpdate => write!(f, "link-state-update"),
            PacketType::LsAck => write!(f, "link-state-ack"),
        }
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 2;
    pub const LENGTH: u16 = 24;
    pub const CKSUM_RANGE: std::ops::Range<usize> = 12..14;
    pub const AUTH_RANGE: std::ops::Range<usize> = 16..24;

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16)> {
        // Parse version.
        let version = buf.try_get_u8()?;
        if version != Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        // Parse packet type.
        let pkt_type = buf.try_get_u8()?;
        let Some(pkt_type) = PacketType::from_u8(pkt_type) else {
            return Err(DecodeError::UnknownPacketType(pkt_type));
        };

        // Parse and validate the total length.
        let pkt_len = buf.try_get_u16()?;
        let min_pkt_len = Self::LENGTH
            + match pkt_type {
                PacketType::Hello => Hello::BASE_LENGTH,
                PacketType::DbDesc => DbDesc::BASE_LENGTH,
                PacketType::LsRequest => 0,
                PacketType::LsUpdate => LsUpdate::BASE_LENGTH,
                PacketType::LsAck => 0,
            };
        if pkt_len < min_pkt_len {
            return Err(DecodeError::InvalidLength(pkt_len));
        }

        let router_id = buf.try_get_ipv4()?;
        let area_id = buf.try_get_u32()?;
        // Checksum is zero on the wire and not validated here.
        let _cksum = buf.try_get_u16()?;
        let _au_type = buf.try_get_u16()?;
        let _auth = buf.try_get_u64()?;

        Ok((
            PacketHdr {
                pkt_type,
                router_id,
                area_id,
            },
            pkt_len,
        ))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        // The length will be initialized later.
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_u32(self.area_id);
        // The checksum is written as zero; update_cksum() fills it in
        // when checksumming is enabled.
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u64(0);
    }

    pub(crate) fn update_cksum(buf: &mut BytesMut) {
        let mut cksum = Checksum::new();
        cksum.add_bytes(&buf[0..Self::AUTH_RANGE.start]);
        cksum.add_bytes(&buf[Self::AUTH_RANGE.end..]);
        buf[Self::CKSUM_RANGE].copy_from_slice(&cksum.checksum());
    }

    pub(crate) fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
        if data.len() < Self::LENGTH as usize {
            return Err(DecodeError::InvalidLength(data.len() as u16));
        }
        let mut cksum = Checksum::new();
        cksum.add_bytes(&data[0..Self::AUTH_RANGE.start]);
        cksum.add_bytes(&data[Self::AUTH_RANGE.end..]);
        if cksum.checksum() != [0; 2] {
            return Err(DecodeError::InvalidChecksum);
        }

        Ok(())
    }

    pub(crate) fn generate(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: u32,
    ) -> Self {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
        }
    }
}

// ===== impl Packet =====

impl Packet {
    // Decodes an OSPF packet from a bytes buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        // Ensure we have at least the fixed header length.
        if buf.len() < PacketHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        let buf_orig = buf.clone();
        let (hdr, pkt_len) = PacketHdr::decode(buf)?;

        // The declared length must fit in the received buffer.
        if (pkt_len as usize) > buf_orig.len() {
            return Err(DecodeError::InvalidLength(pkt_len));
        }

        // Decode the packet body.
        let mut buf =
            buf.slice(..pkt_len as usize - PacketHdr::LENGTH as usize);
        let packet = match hdr.pkt_type {
            PacketType::Hello => Packet::Hello(Hello::decode(hdr, &mut buf)?),
            PacketType::DbDesc => {
                Packet::DbDesc(DbDesc::decode(hdr, &mut buf)?)
            }
            PacketType::LsRequest => {
                Packet::LsRequest(LsRequest::decode(hdr, &mut buf)?)
            }
            PacketType::LsUpdate => {
                Packet::LsUpdate(LsUpdate::decode(hdr, &mut buf)?)
            }
            PacketType::LsAck => Packet::LsAck(LsAck::decode(hdr, &mut buf)?),
        };

        Ok(packet)
    }

    // Encodes the packet into a bytes buffer.
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::Hello(pkt) => pkt.encode(),
            Packet::DbDesc(pkt) => pkt.encode(),
            Packet::LsRequest(pkt) => pkt.encode(),
            Packet::LsUpdate(pkt) => pkt.encode(),
            Packet::LsAck(pkt) => pkt.encode(),
        }
    }

    pub(crate) fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let network_mask = buf.try_get_ipv4()?;
        let hello_interval = buf.try_get_u16()?;
        let options = buf.try_get_u8()?;
        let priority = buf.try_get_u8()?;
        let dead_interval = buf.try_get_u32()?;
        let dr = buf.try_get_ipv4()?;
        let bdr = buf.try_get_ipv4()?;

        // Parse list of neighbors.
        let mut neighbors = BTreeSet::new();
        let nbrs_cnt = buf.remaining() / 4;
        for _ in 0..nbrs_cnt {
            let nbr = buf.try_get_ipv4()?;
            neighbors.insert(nbr);
        }

        Ok(Hello {
            hdr,
            network_mask,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_ipv4(&self.network_mask);
            buf.put_u16(self.hello_interval);
            buf.put_u8(self.options);
            buf.put_u8(self.priority);
            buf.put_u32(self.dead_interval);
            buf.put_ipv4(&self.dr);
            buf.put_ipv4(&self.bdr);
            for nbr in &self.neighbors {
                buf.put_ipv4(nbr);
            }

            packet_encode_end(buf)
        })
    }
}

// ===== impl DbDesc =====

impl DbDesc {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        let mtu = buf.try_get_u16()?;
        let options = buf.try_get_u8()?;
        let dd_flags = DbDescFlags::from_bits_truncate(buf.try_get_u8()?);
        let dd_seq_no = buf.try_get_u32()?;

        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            let lsa_hdr = LsaHdr::decode(buf)?;
            lsa_hdrs.push(lsa_hdr);
        }

        Ok(DbDesc {
            hdr,
            mtu,
            options,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
        })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_u16(self.mtu);
            buf.put_u8(self.options);
            buf.put_u8(self.dd_flags.bits());
            buf.put_u32(self.dd_seq_no);
            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf)
        })
    }
}

// ===== impl LsRequest =====

impl LsRequest {
    pub const ENTRY_LENGTH: u16 = 12;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        // Parse list of LSA global IDs. Entries of unknown LS type are
        // skipped, the rest of the packet is kept.
        let mut entries = vec![];
        let entries_cnt = buf.remaining() / Self::ENTRY_LENGTH as usize;
        for _ in 0..entries_cnt {
            let lsa_type = LsaType(buf.try_get_u32()? as u8);
            let lsa_id = buf.try_get_u32()?;
            let adv_rtr = buf.try_get_ipv4()?;
            if lsa_type.type_code().is_none() {
                continue;
            }
            entries.push(LsaKey {
                lsa_type,
                adv_rtr,
                lsa_id,
            });
        }

        Ok(LsRequest { hdr, entries })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            for entry in &self.entries {
                buf.put_u32(entry.lsa_type.0 as u32);
                buf.put_u32(entry.lsa_id);
                buf.put_ipv4(&entry.adv_rtr);
            }

            packet_encode_end(buf)
        })
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        // Parse list of LSAs. Whole LSAs that fit are kept; the first
        // truncated or malformed one stops the parse.
        let mut lsas = vec![];
        let lsas_cnt = buf.try_get_u32()?;
        for _ in 0..lsas_cnt {
            match Lsa::decode(buf) {
                Ok(lsa) => lsas.push(lsa),
                Err(error) => {
                    error.log();
                    break;
                }
            }
        }

        Ok(LsUpdate { hdr, lsas })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_u32(self.lsas.len() as u32);
            for lsa in &self.lsas {
                buf.put_slice(&lsa.raw);
            }

            packet_encode_end(buf)
        })
    }
}

// ===== impl LsAck =====

impl LsAck {
    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<Self> {
        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            let lsa_hdr = LsaHdr::decode(buf)?;
            lsa_hdrs.push(lsa_hdr);
        }

        Ok(LsAck { hdr, lsa_hdrs })
    }

    fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf)
        })
    }
}

// ===== helper functions =====

pub(crate) fn packet_encode_start<'a>(
    buf: &'a RefCell<BytesMut>,
    hdr: &PacketHdr,
) -> RefMut<'a, BytesMut> {
    let mut buf = buf.borrow_mut();
    buf.clear();
    hdr.encode(&mut buf);
    buf
}

pub(crate) fn packet_encode_end(mut buf: RefMut<'_, BytesMut>) -> Bytes {
    // Initialize packet length.
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());
    buf.clone().freeze()
}
