//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use maplit::btreeset;
use proxima_ospf::packet::lsa::*;
use proxima_ospf::packet::*;

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut buf).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

fn router_lsa() -> Lsa {
    Lsa::new(
        0x02020202,
        Ipv4Addr::new(2, 2, 2, 2),
        1,
        LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::empty(),
            links: vec![LsaRouterLink::new(
                LsaRouterLinkType::PointToPoint,
                0x01010101,
                Ipv4Addr::new(10, 1, 1, 2),
                1,
            )],
        }),
    )
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x01, 0x00, 0x30, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xfc, 0x27, 0x10,
            0x00, 0x00, 0x00, 0x00, 0x75, 0x30, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: 0,
            },
            network_mask: Ipv4Addr::new(255, 255, 255, 252),
            hello_interval: 10000,
            options: 0,
            priority: 0,
            dead_interval: 30000,
            dr: Ipv4Addr::UNSPECIFIED,
            bdr: Ipv4Addr::UNSPECIFIED,
            neighbors: btreeset![Ipv4Addr::new(2, 2, 2, 2)],
        }),
    )
});

static DBDESC1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x02, 0x00, 0x20, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x05, 0xdc, 0x00, 0x07, 0x01, 0x02,
            0x03, 0x04,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: 0,
            },
            mtu: 1500,
            options: 0,
            dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
            dd_seq_no: 0x01020304,
            lsa_hdrs: vec![],
        }),
    )
});

static LSREQUEST1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x03, 0x00, 0x24, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: 0,
            },
            entries: vec![LsaKey::new(
                LsaTypeCode::Router.into(),
                Ipv4Addr::new(2, 2, 2, 2),
                0x02020202,
            )],
        }),
    )
});

static LSUPDATE1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x04, 0x00, 0x40, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00,
            0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x0a, 0x01, 0x01, 0x02,
            0x01, 0x00, 0x00, 0x01,
        ],
        Packet::LsUpdate(LsUpdate {
            hdr: PacketHdr {
                pkt_type: PacketType::LsUpdate,
                router_id: Ipv4Addr::new(2, 2, 2, 2),
                area_id: 0,
            },
            lsas: vec![router_lsa()],
        }),
    )
});

static LSACK1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x05, 0x00, 0x2c, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x02,
            0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x24,
        ],
        Packet::LsAck(LsAck {
            hdr: PacketHdr {
                pkt_type: PacketType::LsAck,
                router_id: Ipv4Addr::new(1, 1, 1, 1),
                area_id: 0,
            },
            lsa_hdrs: vec![router_lsa().hdr],
        }),
    )
});

static L1_SUMMARY_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x00, 0x07, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
            0x02, 0x02, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x24,
            0x00, 0x00, 0x00, 0x01, 0x0a, 0x63, 0x00, 0x00, 0xff, 0xff,
            0xff, 0xfc, 0x00, 0x00, 0x00, 0x02,
        ],
        Lsa::new(
            0x02020202,
            Ipv4Addr::new(2, 2, 2, 2),
            3,
            LsaBody::L1Summary(LsaL1Summary {
                routes: btreeset![SummaryRoute::new(
                    Ipv4Addr::new(10, 99, 0, 0),
                    Ipv4Addr::new(255, 255, 255, 252),
                    2,
                )],
            }),
        ),
    )
});

static AREA_LSA1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01,
            0x01, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x24,
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x0a, 0x01,
            0x01, 0x01, 0x00, 0x00, 0x00, 0x01,
        ],
        Lsa::new(
            1,
            Ipv4Addr::new(1, 1, 1, 1),
            2,
            LsaBody::Area(LsaArea {
                links: vec![AreaLink::new(2, Ipv4Addr::new(10, 1, 1, 1), 1)],
            }),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref hello) = *HELLO1;
    test_encode_packet(bytes, hello);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref hello) = *HELLO1;
    test_decode_packet(bytes, hello);
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref dbdesc) = *DBDESC1;
    test_encode_packet(bytes, dbdesc);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref dbdesc) = *DBDESC1;
    test_decode_packet(bytes, dbdesc);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref request) = *LSREQUEST1;
    test_encode_packet(bytes, request);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref request) = *LSREQUEST1;
    test_decode_packet(bytes, request);
}

#[test]
fn test_encode_lsupdate1() {
    let (ref bytes, ref lsupdate) = *LSUPDATE1;
    test_encode_packet(bytes, lsupdate);
}

#[test]
fn test_decode_lsupdate1() {
    let (ref bytes, ref lsupdate) = *LSUPDATE1;
    test_decode_packet(bytes, lsupdate);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref lsack) = *LSACK1;
    test_encode_packet(bytes, lsack);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref lsack) = *LSACK1;
    test_decode_packet(bytes, lsack);
}

#[test]
fn test_encode_l1_summary_lsa1() {
    let (ref bytes, ref lsa) = *L1_SUMMARY_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_l1_summary_lsa1() {
    let (ref bytes, ref lsa) = *L1_SUMMARY_LSA1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_encode_area_lsa1() {
    let (ref bytes, ref lsa) = *AREA_LSA1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_area_lsa1() {
    let (ref bytes, ref lsa) = *AREA_LSA1;
    test_decode_lsa(bytes, lsa);
}

//
// Boundary behaviors.
//

#[test]
fn test_decode_bad_version() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[0] = 3;
    let mut buf = Bytes::from(bytes);
    assert!(Packet::decode(&mut buf).is_err());
}

#[test]
fn test_decode_truncated_header() {
    let (ref bytes, _) = *HELLO1;
    let mut buf = Bytes::copy_from_slice(&bytes[..16]);
    assert!(Packet::decode(&mut buf).is_err());
}

#[test]
fn test_decode_length_below_minimum() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    // Declared length smaller than the fixed header.
    bytes[2] = 0;
    bytes[3] = 16;
    let mut buf = Bytes::from(bytes);
    assert!(Packet::decode(&mut buf).is_err());
}

#[test]
fn test_decode_length_beyond_available() {
    let (ref bytes, _) = *HELLO1;
    let mut bytes = bytes.clone();
    bytes[2] = 0x40;
    let mut buf = Bytes::from(bytes);
    assert!(Packet::decode(&mut buf).is_err());
}

#[test]
fn test_decode_lsupdate_short_count() {
    // Declared LSA count exceeds the available bytes: parse what fits.
    let (ref bytes, _) = *LSUPDATE1;
    let mut bytes = bytes.clone();
    bytes[27] = 2;
    let mut buf = Bytes::from(bytes);
    let packet = Packet::decode(&mut buf).unwrap();
    let Packet::LsUpdate(lsupdate) = packet else {
        panic!("unexpected packet type");
    };
    assert_eq!(lsupdate.lsas.len(), 1);
}

#[test]
fn test_decode_lsrequest_unknown_type() {
    // An unknown LS type skips that entry, keeping the valid ones.
    let mut bytes = LSREQUEST1.0.clone();
    let valid_entry = bytes[24..36].to_vec();
    bytes[27] = 99;
    bytes.extend(valid_entry);
    bytes[3] = 48;
    let mut buf = Bytes::from(bytes);
    let packet = Packet::decode(&mut buf).unwrap();
    let Packet::LsRequest(request) = packet else {
        panic!("unexpected packet type");
    };
    assert_eq!(request.entries.len(), 1);
}

#[test]
fn test_decode_router_lsa_partial_record() {
    // Two declared links, body room for one: the partial trailing
    // record is dropped.
    let mut bytes = router_lsa().raw.to_vec();
    bytes[23] = 2;
    let mut buf = Bytes::from(bytes);
    let lsa = Lsa::decode(&mut buf).unwrap();
    let LsaBody::Router(router) = lsa.body else {
        panic!("unexpected LSA body");
    };
    assert_eq!(router.links.len(), 1);
}

//
// Round-trip property over bounded pseudo-random inputs.
//

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn addr(&mut self) -> Ipv4Addr {
        Ipv4Addr::from(self.next() as u32)
    }
}

fn random_lsa(rng: &mut XorShift) -> Lsa {
    let body = match rng.next() % 4 {
        0 => LsaBody::Router(LsaRouter {
            flags: LsaRouterFlags::from_bits_truncate(rng.next() as u16),
            links: (0..rng.next() % 4)
                .map(|_| {
                    LsaRouterLink::new(
                        if rng.next() % 2 == 0 {
                            LsaRouterLinkType::PointToPoint
                        } else {
                            LsaRouterLinkType::CrossArea
                        },
                        rng.next() as u32,
                        rng.addr(),
                        rng.next() as u16,
                    )
                })
                .collect(),
        }),
        1 => LsaBody::L1Summary(LsaL1Summary {
            routes: (0..rng.next() % 4)
                .map(|_| {
                    SummaryRoute::new(
                        rng.addr(),
                        rng.addr(),
                        rng.next() as u32,
                    )
                })
                .collect(),
        }),
        2 => LsaBody::Area(LsaArea {
            links: (0..rng.next() % 4)
                .map(|_| {
                    AreaLink::new(
                        rng.next() as u32,
                        rng.addr(),
                        rng.next() as u16,
                    )
                })
                .collect(),
        }),
        _ => LsaBody::L2Summary(LsaL2Summary {
            routes: (0..rng.next() % 4)
                .map(|_| {
                    SummaryRoute::new(
                        rng.addr(),
                        rng.addr(),
                        rng.next() as u32,
                    )
                })
                .collect(),
        }),
    };
    Lsa::new(rng.next() as u32, rng.addr(), rng.next() as u32, body)
}

#[test]
fn test_round_trip() {
    let mut rng = XorShift(0x9e3779b97f4a7c15);
    for _ in 0..256 {
        let hdr = PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: rng.addr(),
            area_id: rng.next() as u32,
        };
        let packet = match rng.next() % 3 {
            0 => Packet::Hello(Hello {
                hdr: PacketHdr {
                    pkt_type: PacketType::Hello,
                    ..hdr
                },
                network_mask: rng.addr(),
                hello_interval: rng.next() as u16,
                options: rng.next() as u8,
                priority: rng.next() as u8,
                dead_interval: rng.next() as u32,
                dr: rng.addr(),
                bdr: rng.addr(),
                neighbors: (0..rng.next() % 8).map(|_| rng.addr()).collect(),
            }),
            1 => Packet::LsUpdate(LsUpdate {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsUpdate,
                    ..hdr
                },
                lsas: (0..rng.next() % 4)
                    .map(|_| random_lsa(&mut rng))
                    .collect(),
            }),
            _ => Packet::LsAck(LsAck {
                hdr: PacketHdr {
                    pkt_type: PacketType::LsAck,
                    ..hdr
                },
                lsa_hdrs: (0..rng.next() % 4)
                    .map(|_| random_lsa(&mut rng).hdr)
                    .collect(),
            }),
        };

        let encoded = packet.encode();
        let mut buf = encoded.clone();
        let decoded = Packet::decode(&mut buf).unwrap();
        assert_eq!(packet, decoded);
        assert_eq!(encoded, decoded.encode());
    }
}
