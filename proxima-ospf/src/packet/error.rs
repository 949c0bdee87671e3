//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::TryGetError;
use serde::{Deserialize, Serialize};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// Wire decode errors.
//
// Any of these causes the offending packet (or LSA, for the in-LSU
// variants) to be dropped without touching protocol state.
#[derive(Debug, Deserialize, Serialize)]
pub enum DecodeError {
    ReadOutOfBounds,
    InvalidIpHdrLength(u16),
    InvalidIpProtocol(u8),
    InvalidVersion(u8),
    UnknownPacketType(u8),
    InvalidLength(u16),
    InvalidChecksum,
    InvalidLsaLength,
    UnknownRouterLinkType(u8),
}

// ===== impl DecodeError =====

impl DecodeError {
    pub(crate) fn log(&self) {
        tracing::warn!(error = %self, "packet decode error");
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            DecodeError::InvalidIpHdrLength(length) => {
                write!(f, "invalid IP header length: {}", length)
            }
            DecodeError::InvalidIpProtocol(proto) => {
                write!(f, "unexpected IP protocol: {}", proto)
            }
            DecodeError::InvalidVersion(version) => {
                write!(f, "invalid packet version: {}", version)
            }
            DecodeError::UnknownPacketType(pkt_type) => {
                write!(f, "unknown packet type: {}", pkt_type)
            }
            DecodeError::InvalidLength(pkt_len) => {
                write!(f, "invalid packet length: {}", pkt_len)
            }
            DecodeError::InvalidChecksum => {
                write!(f, "invalid checksum")
            }
            DecodeError::InvalidLsaLength => {
                write!(f, "invalid LSA length")
            }
            DecodeError::UnknownRouterLinkType(link_type) => {
                write!(f, "unknown router link type: {}", link_type)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}
