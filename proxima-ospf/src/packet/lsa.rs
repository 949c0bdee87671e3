//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use proxima_sim::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};

// LSA type.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u8);

// LSA type code.
//
// Types 1-5 keep their RFC 2328 code points; 6-8 are the area-proxy
// extension. Only Router, Area, L1Summary and L2Summary are originated
// and processed; the rest exist for wire compatibility.
#[derive(Clone, Copy, Debug, Eq, Ord, FromPrimitive, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaTypeCode {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryRouter = 4,
    AsExternal = 5,
    Area = 6,
    L1Summary = 7,
    L2Summary = 8,
}

// Global LSA identifier, also the LSDB storage key.
//
// The LSA ID is a RouterId for per-router types and an AreaId for
// per-area types, hence the plain 32-bit representation.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub adv_rtr: Ipv4Addr,
    pub lsa_id: u32,
}

//
// LSA header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            LS age             |    Options    |    LS type    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Link State ID                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Advertising Router                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     LS sequence number                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |         LS checksum           |             length            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    pub age: u16,
    pub options: u8,
    pub lsa_type: LsaType,
    pub lsa_id: u32,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    pub cksum: u16,
    pub length: u16,
}

// Full LSA: raw bytes plus the decoded header and body.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lsa {
    // LSA raw bytes, reused verbatim when the LSA is reflooded.
    pub raw: Bytes,
    pub hdr: LsaHdr,
    pub body: LsaBody,
}

// LSA body variants.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    L1Summary(LsaL1Summary),
    Area(LsaArea),
    L2Summary(LsaL2Summary),
    Unknown(LsaUnknown),
}

//
// Router-LSA.
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        0        |V|E|B|  0    |            # links            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Link ID                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Link Data                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Type      |      TOS      |            Metric             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaRouterFlags: u16 {
        const B = 0x0020;
        const E = 0x0040;
        const V = 0x0080;
    }
}

// Router-LSA link type.
//
// Type 1 is an intra-area point-to-point link (LinkId = peer RouterId);
// type 5 is the area-proxy extension for links whose far end sits in a
// different area (LinkId = peer AreaId).
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 0x01,
    CrossArea = 0x05,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: u32,
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

//
// L1-Summary-LSA: the prefixes a single router injects into its area.
//
// Encoding format (LSA body): route count (u32), then per route the
// address, mask and metric as u32 each. Routes carry set semantics.
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaL1Summary {
    pub routes: BTreeSet<SummaryRoute>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct SummaryRoute {
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub metric: u32,
}

//
// Area-LSA: the inter-area topology as seen by one area leader.
//
// Encoding format (LSA body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |              0                |            # links            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Area ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          IP Address                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |              0                |            Metric             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                              ...                              |
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaArea {
    pub links: Vec<AreaLink>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct AreaLink {
    pub area_id: u32,
    pub addr: Ipv4Addr,
    pub metric: u16,
}

//
// L2-Summary-LSA: the union of an area's L1 summaries, originated by
// the area leader. Same body layout as the L1-Summary-LSA.
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaL2Summary {
    pub routes: BTreeSet<SummaryRoute>,
}

// LSA of an unrecognized type. The body is consumed and ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknown {}

// ===== impl LsaType =====

impl LsaType {
    pub(crate) fn type_code(&self) -> Option<LsaTypeCode> {
        LsaTypeCode::from_u8(self.0)
    }

    // L1 LSAs never cross an area boundary when flooded.
    pub(crate) fn is_l1(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::Router
                    | LsaTypeCode::Network
                    | LsaTypeCode::L1Summary
            )
        )
    }

    pub(crate) fn is_l2(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::SummaryNetwork
                    | LsaTypeCode::SummaryRouter
                    | LsaTypeCode::AsExternal
                    | LsaTypeCode::Area
                    | LsaTypeCode::L2Summary
            )
        )
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LsaTypeCode> for LsaType {
    fn from(code: LsaTypeCode) -> LsaType {
        LsaType(code as u8)
    }
}

// ===== impl LsaKey =====

impl LsaKey {
    // Canonical rendering used by the CSV logs.
    pub(crate) fn token(&self, seq_no: u32) -> String {
        format!(
            "{}:{}:{}:{}",
            self.lsa_type.0, self.lsa_id, self.adv_rtr, seq_no
        )
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let age = buf.try_get_u16()?;
        let options = buf.try_get_u8()?;
        let lsa_type = LsaType(buf.try_get_u8()?);
        let lsa_id = buf.try_get_u32()?;
        let adv_rtr = buf.try_get_ipv4()?;
        let seq_no = buf.try_get_u32()?;
        let cksum = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;

        Ok(LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options);
        buf.put_u8(self.lsa_type.0);
        buf.put_u32(self.lsa_id);
        buf.put_ipv4(&self.adv_rtr);
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    pub fn key(&self) -> LsaKey {
        LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr: self.adv_rtr,
            lsa_id: self.lsa_id,
        }
    }
}

// ===== impl Lsa =====

impl Lsa {
    pub fn new(
        lsa_id: u32,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: LsaBody,
    ) -> Self {
        let hdr = LsaHdr {
            age: 0,
            options: 0,
            lsa_type: body.lsa_type(),
            lsa_id,
            adv_rtr,
            seq_no,
            cksum: 0,
            length: 0,
        };

        let mut lsa = Lsa {
            raw: Default::default(),
            hdr,
            body,
        };
        lsa.encode();
        lsa
    }

    // (Re)encode the LSA, fixing up the header length.
    fn encode(&mut self) {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();
            self.hdr.encode(&mut buf);
            self.body.encode(&mut buf);
            let length = buf.len() as u16;
            self.hdr.length = length;
            buf[18..20].copy_from_slice(&length.to_be_bytes());
            self.raw = buf.clone().freeze();
        })
    }

    // Decodes one LSA (header plus body) from a bytes buffer, advancing
    // it by the header's declared length.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let buf_orig = buf.clone();
        if buf.remaining() < LsaHdr::LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let hdr = LsaHdr::decode(buf)?;
        let lsa_len = hdr.length;
        if lsa_len < LsaHdr::LENGTH {
            return Err(DecodeError::InvalidLsaLength);
        }
        let body_len = (lsa_len - LsaHdr::LENGTH) as usize;
        if buf.remaining() < body_len {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mut body_buf = buf.slice(..body_len);
        buf.advance(body_len);
        let body = LsaBody::decode(hdr.lsa_type, &mut body_buf)?;

        Ok(Lsa {
            raw: buf_orig.slice(..lsa_len as usize),
            hdr,
            body,
        })
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub(crate) fn decode(
        lsa_type: LsaType,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let body = match lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                LsaBody::Router(LsaRouter::decode(buf)?)
            }
            Some(LsaTypeCode::L1Summary) => {
                LsaBody::L1Summary(LsaL1Summary::decode(buf)?)
            }
            Some(LsaTypeCode::Area) => LsaBody::Area(LsaArea::decode(buf)?),
            Some(LsaTypeCode::L2Summary) => {
                LsaBody::L2Summary(LsaL2Summary::decode(buf)?)
            }
            _ => LsaBody::Unknown(LsaUnknown::decode(buf)?),
        };

        Ok(body)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::L1Summary(lsa) => lsa.encode(buf),
            LsaBody::Area(lsa) => lsa.encode(buf),
            LsaBody::L2Summary(lsa) => lsa.encode(buf),
            LsaBody::Unknown(lsa) => lsa.encode(buf),
        }
    }

    pub(crate) fn lsa_type(&self) -> LsaType {
        match self {
            LsaBody::Router(_) => LsaTypeCode::Router.into(),
            LsaBody::L1Summary(_) => LsaTypeCode::L1Summary.into(),
            LsaBody::Area(_) => LsaTypeCode::Area.into(),
            LsaBody::L2Summary(_) => LsaTypeCode::L2Summary.into(),
            LsaBody::Unknown(_) => LsaType(0),
        }
    }

}

// ===== impl LsaRouter =====

impl LsaRouter {
    pub const BASE_LENGTH: u16 = 4;
    pub const LINK_LENGTH: u16 = 12;

    // The cross-area subset, projected into Area-LSA links.
    pub(crate) fn cross_area_links(&self) -> impl Iterator<Item = AreaLink> {
        self.links.iter().filter_map(|link| {
            (link.link_type == LsaRouterLinkType::CrossArea).then_some(
                AreaLink::new(link.link_id, link.link_data, link.metric),
            )
        })
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let flags = LsaRouterFlags::from_bits_truncate(buf.try_get_u16()?);
        let links_cnt = buf.try_get_u16()?;

        let mut links = vec![];
        for _ in 0..links_cnt {
            // Drop trailing partial records.
            if buf.remaining() < Self::LINK_LENGTH as usize {
                break;
            }
            let link_id = buf.try_get_u32()?;
            let link_data = buf.try_get_ipv4()?;
            let link_type = buf.try_get_u8()?;
            let link_type = LsaRouterLinkType::from_u8(link_type)
                .ok_or(DecodeError::UnknownRouterLinkType(link_type))?;
            let _tos = buf.try_get_u8()?;
            let metric = buf.try_get_u16()?;

            links.push(LsaRouterLink::new(
                link_type, link_id, link_data, metric,
            ));
        }

        Ok(LsaRouter { flags, links })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.flags.bits());
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_u32(link.link_id);
            buf.put_ipv4(&link.link_data);
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
        }
    }
}

// ===== impl LsaL1Summary =====

impl LsaL1Summary {
    pub const BASE_LENGTH: u16 = 4;
    pub const ROUTE_LENGTH: u16 = 12;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let routes = decode_summary_routes(buf)?;
        Ok(LsaL1Summary { routes })
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_summary_routes(&self.routes, buf);
    }
}

// ===== impl LsaArea =====

impl LsaArea {
    pub const BASE_LENGTH: u16 = 4;
    pub const LINK_LENGTH: u16 = 12;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let _reserved = buf.try_get_u16()?;
        let links_cnt = buf.try_get_u16()?;

        let mut links = vec![];
        for _ in 0..links_cnt {
            if buf.remaining() < Self::LINK_LENGTH as usize {
                break;
            }
            let area_id = buf.try_get_u32()?;
            let addr = buf.try_get_ipv4()?;
            let _reserved = buf.try_get_u16()?;
            let metric = buf.try_get_u16()?;
            links.push(AreaLink::new(area_id, addr, metric));
        }

        Ok(LsaArea { links })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(0);
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_u32(link.area_id);
            buf.put_ipv4(&link.addr);
            buf.put_u16(0);
            buf.put_u16(link.metric);
        }
    }
}

// ===== impl LsaL2Summary =====

impl LsaL2Summary {
    pub const BASE_LENGTH: u16 = 4;
    pub const ROUTE_LENGTH: u16 = 12;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let routes = decode_summary_routes(buf)?;
        Ok(LsaL2Summary { routes })
    }

    fn encode(&self, buf: &mut BytesMut) {
        encode_summary_routes(&self.routes, buf);
    }
}

// ===== impl LsaUnknown =====

impl LsaUnknown {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        buf.advance(buf.remaining());
        Ok(LsaUnknown {})
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

// ===== helper functions =====

fn decode_summary_routes(
    buf: &mut Bytes,
) -> DecodeResult<BTreeSet<SummaryRoute>> {
    if buf.remaining() < 4 {
        return Err(DecodeError::InvalidLsaLength);
    }
    let routes_cnt = buf.try_get_u32()?;

    let mut routes = BTreeSet::new();
    for _ in 0..routes_cnt {
        if buf.remaining() < LsaL1Summary::ROUTE_LENGTH as usize {
            break;
        }
        let address = buf.try_get_ipv4()?;
        let mask = buf.try_get_ipv4()?;
        let metric = buf.try_get_u32()?;
        routes.insert(SummaryRoute::new(address, mask, metric));
    }

    Ok(routes)
}

fn encode_summary_routes(
    routes: &BTreeSet<SummaryRoute>,
    buf: &mut BytesMut,
) {
    buf.put_u32(routes.len() as u32);
    for route in routes {
        buf.put_ipv4(&route.address);
        buf.put_ipv4(&route.mask);
        buf.put_u32(route.metric);
    }
}
