//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{error, warn, warn_span};

use crate::neighbor::nsm;
use crate::packet::error::DecodeError;

// Protocol errors.
//
// None of these is fatal after startup: the offending packet or event
// is dropped and state is left intact.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    // Packet input
    InterfaceIndexNotFound(u32),
    PacketDecodeError(DecodeError),
    InvalidDstAddr(Ipv4Addr),
    UnknownNeighbor(Ipv4Addr, Ipv4Addr),
    InterfaceCfgError(u32, InterfaceCfgError),
    OwnRouterId(Ipv4Addr),
    // Database exchange
    DbDescReject(Ipv4Addr, nsm::State),
    DbDescMasterConflict(Ipv4Addr),
    DbDescSlaveConflict(Ipv4Addr),
    DbDescOutOfOrder(Ipv4Addr, u32, u32),
    // SPF
    SpfNexthopNotFound(Ipv4Addr),
    // Snapshot
    SnapshotImportError(std::path::PathBuf, IoError),
    // Startup
    InterfaceStartError(u32, IoError),
}

// I/O errors.
#[derive(Debug)]
pub enum IoError {
    SocketError(std::io::Error),
    SendError(std::io::Error),
    FileError(std::io::Error),
    TruncatedFile,
}

// Hello parameter mismatches; the Hello is dropped with no state
// change.
#[derive(Debug)]
pub enum InterfaceCfgError {
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u32, u32),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::InterfaceIndexNotFound(ifindex) => {
                warn!(%ifindex, "{}", self);
            }
            Error::PacketDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::InvalidDstAddr(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::UnknownNeighbor(source, router_id) => {
                warn!(%source, %router_id, "{}", self);
            }
            Error::InterfaceCfgError(ifindex, error) => {
                warn_span!("interface", %ifindex).in_scope(|| {
                    error.log();
                })
            }
            Error::OwnRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
            Error::DbDescReject(router_id, state) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(%state, "{}", self);
                })
            }
            Error::DbDescMasterConflict(router_id)
            | Error::DbDescSlaveConflict(router_id) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!("{}", self);
                })
            }
            Error::DbDescOutOfOrder(router_id, expected, actual) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(%expected, %actual, "{}", self);
                })
            }
            Error::SpfNexthopNotFound(router_id) => {
                warn!(%router_id, "{}", self);
            }
            Error::SnapshotImportError(path, error) => {
                error!(path = %path.display(), error = %error, "{}", self);
            }
            Error::InterfaceStartError(ifindex, error) => {
                error!(%ifindex, error = %error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::InterfaceIndexNotFound(..) => {
                write!(f, "interface index not found")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::InvalidDstAddr(..) => {
                write!(f, "invalid destination address")
            }
            Error::UnknownNeighbor(..) => {
                write!(f, "unknown neighbor")
            }
            Error::InterfaceCfgError(_, error) => error.fmt(f),
            Error::OwnRouterId(..) => {
                write!(f, "packet carries this router's own router-id")
            }
            Error::DbDescReject(..) => {
                write!(f, "database description packet rejected")
            }
            Error::DbDescMasterConflict(..) => {
                write!(f, "both routers claim the master role")
            }
            Error::DbDescSlaveConflict(..) => {
                write!(f, "both routers claim the slave role")
            }
            Error::DbDescOutOfOrder(..) => {
                write!(f, "out-of-order DD sequence number")
            }
            Error::SpfNexthopNotFound(..) => {
                write!(f, "no full adjacency toward first-hop router")
            }
            Error::SnapshotImportError(..) => {
                write!(f, "refusing partial snapshot import")
            }
            Error::InterfaceStartError(..) => {
                write!(f, "failed to start interface")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::SocketError(error)
            | IoError::SendError(error)
            | IoError::FileError(error) => {
                warn!(%error, "{}", self);
            }
            IoError::TruncatedFile => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::SocketError(..) => {
                write!(f, "socket error")
            }
            IoError::SendError(..) => {
                write!(f, "failed to send packet")
            }
            IoError::FileError(..) => {
                write!(f, "file I/O error")
            }
            IoError::TruncatedFile => {
                write!(f, "truncated file")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::SocketError(error)
            | IoError::SendError(error)
            | IoError::FileError(error) => Some(error),
            IoError::TruncatedFile => None,
        }
    }
}

// ===== impl InterfaceCfgError =====

impl InterfaceCfgError {
    pub(crate) fn log(&self) {
        match self {
            InterfaceCfgError::HelloIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::DeadIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for InterfaceCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceCfgError::HelloIntervalMismatch(..) => {
                write!(f, "hello interval mismatch")
            }
            InterfaceCfgError::DeadIntervalMismatch(..) => {
                write!(f, "router dead interval mismatch")
            }
        }
    }
}

impl std::error::Error for InterfaceCfgError {}
