use slink_protocol::SequenceNumber;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Network code reserved for uni-station mode.
pub const UNI_NETWORK: &str = "XX";
/// Station code reserved for uni-station mode.
pub const UNI_STATION: &str = "UNI";

/// One stream subscription: a (network, station) pair with optional
/// selectors and the resume point of the last received packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    /// Network code, up to 2 characters, `*`/`?` wildcards allowed.
    pub net: String,
    /// Station code, up to 5 characters, `*`/`?` wildcards allowed.
    pub sta: String,
    /// Selector tokens forwarded to the server, one `SELECT` each.
    pub selectors: Vec<String>,
    /// Sequence number of the last packet received for this entry.
    pub seqnum: SequenceNumber,
    /// Start time of the last packet, `YYYY,MM,DD,HH,MM,SS`, or empty.
    pub timestamp: String,
}

impl StreamEntry {
    pub fn is_uni(&self) -> bool {
        self.net == UNI_NETWORK && self.sta == UNI_STATION
    }
}

/// Ordered collection of stream subscriptions.
///
/// The registry is either empty, a single uni-station entry, or a list
/// of ordinary entries, never a mix. Insertion order is preserved
/// because it dictates command order during negotiation.
#[derive(Clone, Debug, Default)]
pub struct StreamRegistry {
    entries: Vec<StreamEntry>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a multi-station subscription.
    ///
    /// `seqnum: None` starts at the next available data. Fails with
    /// [`EngineError::ModeConflict`] when uni-station mode is already
    /// configured.
    pub fn add_stream(
        &mut self,
        net: &str,
        sta: &str,
        selectors: Vec<String>,
        seqnum: Option<SequenceNumber>,
        timestamp: &str,
    ) -> Result<()> {
        if self.is_uni() {
            return Err(EngineError::ModeConflict);
        }

        self.entries.push(StreamEntry {
            net: net.to_owned(),
            sta: sta.to_owned(),
            selectors,
            seqnum: seqnum.unwrap_or(SequenceNumber::UNSET),
            timestamp: timestamp.to_owned(),
        });
        Ok(())
    }

    /// Configure (or overwrite) the single uni-station subscription.
    ///
    /// Fails with [`EngineError::ModeConflict`] when multi-station
    /// entries already exist.
    pub fn set_uni(
        &mut self,
        selectors: Vec<String>,
        seqnum: Option<SequenceNumber>,
        timestamp: &str,
    ) -> Result<()> {
        if !self.entries.is_empty() && !self.is_uni() {
            return Err(EngineError::ModeConflict);
        }

        self.entries.clear();
        self.entries.push(StreamEntry {
            net: UNI_NETWORK.to_owned(),
            sta: UNI_STATION.to_owned(),
            selectors,
            seqnum: seqnum.unwrap_or(SequenceNumber::UNSET),
            timestamp: timestamp.to_owned(),
        });
        Ok(())
    }

    pub fn is_uni(&self) -> bool {
        matches!(self.entries.first(), Some(entry) if entry.is_uni())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamEntry> {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut StreamEntry> {
        self.entries.iter_mut()
    }

    /// Update the resume point of every entry matching a received
    /// record.
    ///
    /// The record's codes are matched against each entry's (possibly
    /// wildcarded) codes; the uni-station entry matches everything.
    /// Returns the number of entries updated; zero means the record was
    /// not subscribed.
    pub fn match_and_update(
        &mut self,
        net: &str,
        sta: &str,
        seqnum: SequenceNumber,
        timestamp: &str,
    ) -> usize {
        let net = net.trim();
        let sta = sta.trim();
        let mut updates = 0;

        for entry in &mut self.entries {
            if entry.is_uni() || (glob_match(&entry.net, net) && glob_match(&entry.sta, sta)) {
                entry.seqnum = seqnum;
                entry.timestamp = timestamp.to_owned();
                updates += 1;
            }
        }

        debug!(net, sta, %seqnum, updates, "stream update");
        updates
    }
}

/// Case-sensitive glob match supporting only `*` (any run) and `?`
/// (exactly one character). No character classes, no escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Backtrack: let the last * swallow one more character.
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
