//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::Ipv4Network;
use proxima_sim::bytes::{BytesExt, BytesMutExt};
use proxima_sim::rng::UniformRng;

use crate::collections::NeighborKey;
use crate::error::{Error, IoError};
use crate::instance::{ExternalRoute, Instance, InstanceArenas, SystemApi};
use crate::neighbor::nsm;
use crate::packet::lsa::Lsa;
use crate::tasks::{self, TimerMsg};

// Snapshot I/O: four binary files per node.
//
//   <node>.meta       u32 isAreaLeader
//   <node>.lsdb       one LS Update body holding every stored LSA
//   <node>.neighbors  per-interface (RouterId, Ip, Area) triples
//   <node>.prefixes   the injected external routes, 5 x u32 each
//
// Import parses everything into a staged form first and refuses to
// touch instance state when any file is truncated or inconsistent.

struct Staged {
    is_area_leader: bool,
    lsas: Vec<Lsa>,
    // Outer index: interface; inner: (router id, address, area).
    neighbors: Vec<Vec<(Ipv4Addr, Ipv4Addr, u32)>>,
    external_routes: Vec<ExternalRoute>,
}

// ===== export =====

pub(crate) fn export_ospf<S: SystemApi>(
    instance: &Instance<S>,
    dir: &Path,
) -> Result<(), Error> {
    std::fs::create_dir_all(dir)
        .map_err(|error| Error::from(IoError::FileError(error)))?;
    let node_name = &instance.cfg.node_name;
    write_file(&dir.join(format!("{node_name}.meta")), export_meta(instance))?;
    write_file(&dir.join(format!("{node_name}.lsdb")), export_lsdb(instance))?;
    write_file(
        &dir.join(format!("{node_name}.neighbors")),
        export_neighbors(instance),
    )?;
    write_file(
        &dir.join(format!("{node_name}.prefixes")),
        export_prefixes(instance),
    )?;
    Ok(())
}

fn export_meta<S: SystemApi>(instance: &Instance<S>) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(instance.state.is_area_leader as u32);
    buf.freeze()
}

fn export_lsdb<S: SystemApi>(instance: &Instance<S>) -> Bytes {
    let mut buf = BytesMut::new();
    let count = instance.state.lsdb.iter_all().count() as u32;
    buf.put_u32(count);
    for lsa in instance.state.lsdb.iter_all() {
        buf.put_slice(&lsa.raw);
    }
    buf.freeze()
}

fn export_neighbors<S: SystemApi>(instance: &Instance<S>) -> Bytes {
    let mut buf = BytesMut::new();
    let interfaces = &instance.arenas.interfaces;
    buf.put_u32(interfaces.len() as u32 - 1);
    for iface in interfaces.iter().skip(1) {
        buf.put_u32(iface.neighbors.len() as u32);
        for (key, nbr_idx) in &iface.neighbors {
            let area_id = instance
                .arenas
                .neighbors
                .get(*nbr_idx)
                .map(|nbr| nbr.area_id)
                .unwrap_or_default();
            buf.put_ipv4(&key.router_id);
            buf.put_ipv4(&key.addr);
            buf.put_u32(area_id);
        }
    }
    buf.freeze()
}

fn export_prefixes<S: SystemApi>(instance: &Instance<S>) -> Bytes {
    let mut buf = BytesMut::new();
    let routes = &instance.state.external_routes;
    buf.put_u32(routes.len() as u32);
    for route in routes {
        buf.put_u32(route.ifindex);
        buf.put_ipv4(&route.network.network());
        buf.put_ipv4(&route.network.mask());
        buf.put_ipv4(&route.gateway);
        buf.put_u32(route.metric);
    }
    buf.freeze()
}

// ===== import =====

pub(crate) fn import_ospf<S: SystemApi>(
    instance: &mut Instance<S>,
    dir: &Path,
) -> Result<(), Error> {
    let node_name = instance.cfg.node_name.clone();
    let staged = Staged {
        is_area_leader: parse_meta(&read_file(
            &dir.join(format!("{node_name}.meta")),
        )?)?,
        lsas: parse_lsdb(&read_file(
            &dir.join(format!("{node_name}.lsdb")),
        )?)?,
        neighbors: parse_neighbors(
            &read_file(&dir.join(format!("{node_name}.neighbors")))?,
            instance.arenas.interfaces.len(),
        )?,
        external_routes: parse_prefixes(&read_file(
            &dir.join(format!("{node_name}.prefixes")),
        )?)?,
    };

    apply(instance, staged);
    Ok(())
}

fn apply<S: SystemApi>(instance: &mut Instance<S>, staged: Staged) {
    instance.state.is_area_leader = staged.is_area_leader;
    instance.state.external_routes = staged.external_routes;

    for lsa in staged.lsas {
        // Keys this router originated continue from the imported
        // sequence number.
        if lsa.hdr.adv_rtr == instance.cfg.router_id {
            instance
                .state
                .lsdb
                .seq_numbers
                .insert(lsa.hdr.key(), lsa.hdr.seq_no as u16);
        }
        instance.state.lsdb.install(lsa);
    }

    for (position, nbr_list) in staged.neighbors.into_iter().enumerate() {
        let ifindex = position as u32 + 1;
        for (router_id, addr, area_id) in nbr_list {
            let InstanceArenas {
                interfaces,
                neighbors,
            } = &mut instance.arenas;
            let iface = &mut interfaces[ifindex as usize];
            let dead_interval =
                Duration::from_millis(iface.dead_interval as u64);
            // Imported neighbors start out Full, with a fresh dead
            // timer in case the peer is gone.
            let nbr_idx = iface.add_neighbor(
                neighbors,
                router_id,
                addr,
                area_id,
                nsm::State::Full,
                instance.sys.rand_u32(),
            );
            let key = NeighborKey::new(router_id, addr);
            instance.arenas.neighbors[nbr_idx].tasks.dead_timer =
                Some(tasks::schedule(
                    &instance.sys,
                    &instance.sys,
                    dead_interval,
                    TimerMsg::NbrDeadTimer { ifindex, key },
                ));
        }
    }

    // Skip initial origination: the imported databases are the
    // starting point.
    instance.state.do_initialize = false;
}

fn parse_meta(data: &Bytes) -> Result<bool, Error> {
    let mut buf = data.clone();
    if buf.remaining() < 4 {
        return Err(Error::from(IoError::TruncatedFile));
    }
    Ok(buf.get_u32() != 0)
}

fn parse_lsdb(data: &Bytes) -> Result<Vec<Lsa>, Error> {
    let mut buf = data.clone();
    if buf.remaining() < 4 {
        return Err(Error::from(IoError::TruncatedFile));
    }
    let count = buf.get_u32();
    let mut lsas = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let lsa = Lsa::decode(&mut buf)
            .map_err(|_| Error::from(IoError::TruncatedFile))?;
        lsas.push(lsa);
    }
    Ok(lsas)
}

fn parse_neighbors(
    data: &Bytes,
    n_interfaces: usize,
) -> Result<Vec<Vec<(Ipv4Addr, Ipv4Addr, u32)>>, Error> {
    let mut buf = data.clone();
    if buf.remaining() < 4 {
        return Err(Error::from(IoError::TruncatedFile));
    }
    let count = buf.get_u32() as usize;
    // The snapshot must describe the same interface layout.
    if count + 1 != n_interfaces {
        return Err(Error::from(IoError::TruncatedFile));
    }

    let mut interfaces = Vec::with_capacity(count);
    for _ in 0..count {
        let nbr_count = buf
            .try_get_u32()
            .map_err(|_| Error::from(IoError::TruncatedFile))?;
        let mut nbr_list = Vec::with_capacity(nbr_count as usize);
        for _ in 0..nbr_count {
            let router_id = buf
                .try_get_ipv4()
                .map_err(|_| Error::from(IoError::TruncatedFile))?;
            let addr = buf
                .try_get_ipv4()
                .map_err(|_| Error::from(IoError::TruncatedFile))?;
            let area_id = buf
                .try_get_u32()
                .map_err(|_| Error::from(IoError::TruncatedFile))?;
            nbr_list.push((router_id, addr, area_id));
        }
        interfaces.push(nbr_list);
    }
    Ok(interfaces)
}

fn parse_prefixes(data: &Bytes) -> Result<Vec<ExternalRoute>, Error> {
    let mut buf = data.clone();
    if buf.remaining() < 4 {
        return Err(Error::from(IoError::TruncatedFile));
    }
    let count = buf.get_u32();
    let mut routes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut next_u32 = || -> Result<u32, Error> {
            buf.try_get_u32()
                .map_err(|_| Error::from(IoError::TruncatedFile))
        };
        let ifindex = next_u32()?;
        let address = Ipv4Addr::from(next_u32()?);
        let mask = Ipv4Addr::from(next_u32()?);
        let gateway = Ipv4Addr::from(next_u32()?);
        let metric = next_u32()?;
        let network = Ipv4Network::with_netmask(address, mask)
            .map_err(|_| Error::from(IoError::TruncatedFile))?;
        routes.push(ExternalRoute {
            ifindex,
            network,
            gateway,
            metric,
        });
    }
    Ok(routes)
}

// ===== helper functions =====

fn write_file(path: &Path, data: Bytes) -> Result<(), Error> {
    std::fs::write(path, &data)
        .map_err(|error| Error::from(IoError::FileError(error)))
}

fn read_file(path: &Path) -> Result<Bytes, Error> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|error| {
            Error::SnapshotImportError(
                path.to_path_buf(),
                IoError::FileError(error),
            )
        })
}
