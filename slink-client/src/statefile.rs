//! Saving and recovering stream resume state across process restarts.
//!
//! The state file is plain ASCII, one line per entry:
//! `NET STA SEQHEX TIMESTAMP`, where `SEQHEX` is 6 hex digits and the
//! timestamp is `YYYY,MM,DD,HH,MM,SS`. Rewrites go through a sibling
//! temporary file and an atomic rename.

use std::fs;
use std::io;
use std::path::Path;

use slink_protocol::SequenceNumber;
use tracing::{debug, warn};

use crate::registry::StreamRegistry;

/// Write the resume points of all entries that have received data.
pub fn save_state(registry: &StreamRegistry, path: impl AsRef<Path>) -> io::Result<usize> {
    let path = path.as_ref();
    let mut contents = String::new();
    let mut saved = 0;

    for entry in registry.iter() {
        if entry.seqnum.is_unset() {
            continue;
        }
        contents.push_str(&format!(
            "{} {} {} {}\n",
            entry.net,
            entry.sta,
            entry.seqnum.to_hex(),
            entry.timestamp
        ));
        saved += 1;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, &contents)?;
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), saved, "state saved");
    Ok(saved)
}

/// Restore resume points onto matching registry entries.
///
/// Lines for unknown stations are ignored; malformed lines are logged
/// and skipped. Returns the number of entries updated.
pub fn recover_state(registry: &mut StreamRegistry, path: impl AsRef<Path>) -> io::Result<usize> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut recovered = 0;

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(net), Some(sta), Some(seq)) = (fields.next(), fields.next(), fields.next())
        else {
            warn!(line, "malformed state file line, skipping");
            continue;
        };
        let timestamp = fields.next().unwrap_or("");

        let seqnum = if seq == "-1" {
            SequenceNumber::UNSET
        } else {
            match SequenceNumber::from_hex(seq) {
                Ok(seqnum) => seqnum,
                Err(_) => {
                    warn!(line, "bad sequence in state file line, skipping");
                    continue;
                }
            }
        };

        for entry in registry.entries_mut() {
            if entry.net == net && entry.sta == sta {
                entry.seqnum = seqnum;
                entry.timestamp = timestamp.to_owned();
                recovered += 1;
            }
        }
    }

    debug!(path = %path.display(), recovered, "state recovered");
    Ok(recovered)
}
