//
// Copyright (c) The Proxima Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::instance::InstanceCfg;
use crate::packet::lsa::LsaKey;
use crate::packet::{Packet, PacketType};

// CSV measurement logs, written per node under the configured log
// directory:
//   lsa-timings/<node>.csv  timestamp,lsa_key        (nanoseconds)
//   ospf-packets/<node>.csv timestamp,size,type,lsa_level (seconds)
//   lsa_mapping.csv         l1_key,l2_key            (leaders only)
#[derive(Debug, Default)]
pub struct LogFiles {
    lsa_timing: Option<File>,
    packet: Option<File>,
}

// ===== impl LogFiles =====

impl LogFiles {
    pub(crate) fn init(cfg: &InstanceCfg) -> LogFiles {
        let mut logs = LogFiles::default();
        let Some(log_dir) = &cfg.log_dir else {
            return logs;
        };

        if cfg.enable_lsa_timing_log {
            logs.lsa_timing = create_csv(
                &log_dir.join("lsa-timings").join(format!(
                    "{}.csv",
                    cfg.node_name
                )),
                "timestamp,lsa_key",
            );
            // The mapping log is shared per run; truncate it with its
            // header once per instance start.
            create_csv(&log_dir.join("lsa_mapping.csv"), "l1_key,l2_key");
        }

        if cfg.enable_packet_log {
            logs.packet = create_csv(
                &log_dir.join("ospf-packets").join(format!(
                    "{}.csv",
                    cfg.node_name
                )),
                "timestamp,size,type,lsa_level",
            );
        }

        logs
    }

    pub(crate) fn close(&mut self) {
        self.lsa_timing = None;
        self.packet = None;
    }

    pub(crate) fn log_lsa_timing(
        &mut self,
        now: Duration,
        key: &LsaKey,
        seq_no: u32,
    ) {
        if let Some(file) = &mut self.lsa_timing {
            let _ = writeln!(
                file,
                "{},{}",
                now.as_nanos(),
                key.token(seq_no)
            );
        }
    }

    pub(crate) fn log_packet_tx(
        &mut self,
        now: Duration,
        size: usize,
        pkt_type: PacketType,
        lsa_level: &str,
    ) {
        if let Some(file) = &mut self.packet {
            let _ = writeln!(
                file,
                "{},{},{},{}",
                now.as_secs_f64(),
                size,
                pkt_type as u8,
                lsa_level
            );
        }
    }

    pub(crate) fn log_lsa_mapping(
        &mut self,
        log_dir: Option<&Path>,
        l1_token: &str,
        l2_token: &str,
    ) {
        let Some(log_dir) = log_dir else {
            return;
        };
        let path = log_dir.join("lsa_mapping.csv");
        match OpenOptions::new().append(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{},{}", l1_token, l2_token);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "cannot append mapping log");
            }
        }
    }
}

// L1/L2 classification of the first LSA carried by an LS Update or LS
// Ack; other packet types carry no level tag.
pub(crate) fn lsa_level(packet: &Packet) -> &'static str {
    let lsa_type = match packet {
        Packet::LsUpdate(lsu) => {
            lsu.lsas.first().map(|lsa| lsa.hdr.lsa_type)
        }
        Packet::LsAck(lsack) => {
            lsack.lsa_hdrs.first().map(|hdr| hdr.lsa_type)
        }
        _ => None,
    };
    match lsa_type {
        Some(lsa_type) if lsa_type.is_l1() => "L1",
        Some(lsa_type) if lsa_type.is_l2() => "L2",
        _ => "",
    }
}

fn create_csv(path: &Path, header: &str) -> Option<File> {
    if let Some(parent) = path.parent()
        && let Err(error) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), %error, "cannot create log directory");
        return None;
    }
    match File::create(path) {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", header);
            Some(file)
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "cannot create log file");
            None
        }
    }
}
