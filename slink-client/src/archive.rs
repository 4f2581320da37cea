//! Archiving router: demultiplex received records into append-only
//! files named by a path template.
//!
//! Templates mix literal text with `%X` (defining) and `#X`
//! (non-defining) tokens. All records sharing one expansion of the
//! defining tokens land in the same file; non-defining tokens take
//! their value from the record that created the file. Recognized
//! tokens: `n` network, `s` station, `l` location, `c` channel, `Y`
//! 4-digit year, `y` 2-digit year, `j` day-of-year, `H` `M` `S` time
//! components, `F` fractional seconds, `t` record type code, and `%%`
//! / `##` literals.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use slink_protocol::mseed::{PacketType, RecordIdent};
use tracing::{debug, warn};

/// Idle archive files are closed after this long without an append.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound on simultaneously open archive files.
pub const MAX_OPEN_FILES: usize = 50;

struct OpenEntry {
    key: String,
    file: File,
    modtime: Instant,
}

/// An LRU-bounded table of open archive files keyed by the expanded
/// defining tokens of a path template.
///
/// Records are appended raw, exactly as received, with no buffering
/// above the file handle. A stream whose file cannot be opened or
/// written is reported once and disabled for the session.
pub struct ArchiveSink {
    format: String,
    idle_timeout: Duration,
    waveform_only: bool,
    open: Vec<OpenEntry>,
    failed: HashSet<String>,
}

impl ArchiveSink {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            waveform_only: false,
            open: Vec::new(),
            failed: HashSet::new(),
        }
    }

    /// SDS layout:
    /// `<root>/YEAR/NET/STA/CHAN.TYPE/NET.STA.LOC.CHAN.TYPE.YEAR.DAY`.
    pub fn sds(root: impl AsRef<Path>) -> Self {
        Self::new(format!(
            "{}/%Y/%n/%s/%c.%t/%n.%s.%l.%c.%t.%Y.%j",
            root.as_ref().display()
        ))
    }

    /// BUD layout: `<root>/NET/STA/STA.NET.LOC.CHAN.YEAR.DAY`.
    ///
    /// A legacy structure, kept for existing installations; archives
    /// waveform records only.
    pub fn bud(root: impl AsRef<Path>) -> Self {
        let mut sink = Self::new(format!(
            "{}/%n/%s/%s.%n.%l.%c.%Y.%j",
            root.as_ref().display()
        ));
        sink.waveform_only = true;
        sink
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of currently open archive files.
    pub fn open_file_count(&self) -> usize {
        self.open.len()
    }

    /// Route one record to its archive file.
    pub fn archive(&mut self, record: &[u8], ident: &RecordIdent, ptype: PacketType) {
        if self.waveform_only && ptype != PacketType::Data {
            return;
        }

        self.sweep_idle();

        let (path, key) = expand_template(&self.format, ident, ptype);
        if self.failed.contains(&key) {
            return;
        }

        if let Some(entry) = self.open.iter_mut().find(|e| e.key == key) {
            if let Err(e) = entry.file.write_all(record) {
                warn!(key, error = %e, "archive write failed, disabling stream");
                self.failed.insert(key.clone());
                self.open.retain(|e| e.key != key);
                return;
            }
            entry.modtime = Instant::now();
            return;
        }

        if self.open.len() >= MAX_OPEN_FILES
            && let Some(oldest) = self
                .open
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.modtime)
                .map(|(i, _)| i)
        {
            let evicted = self.open.swap_remove(oldest);
            debug!(key = evicted.key, "closing least recently used archive file");
        }

        match open_append(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(record) {
                    warn!(path = %path.display(), error = %e, "archive write failed, disabling stream");
                    self.failed.insert(key);
                    return;
                }
                debug!(key, path = %path.display(), "archive file opened");
                self.open.push(OpenEntry {
                    key,
                    file,
                    modtime: Instant::now(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "archive open failed, disabling stream");
                self.failed.insert(key);
            }
        }
    }

    /// Close every open file.
    pub fn close_all(&mut self) {
        if !self.open.is_empty() {
            debug!(count = self.open.len(), "closing archive files");
        }
        self.open.clear();
    }

    fn sweep_idle(&mut self) {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        self.open.retain(|entry| {
            let keep = now.duration_since(entry.modtime) <= idle_timeout;
            if !keep {
                debug!(key = entry.key, "closing idle archive file");
            }
            keep
        });
    }
}

impl Drop for ArchiveSink {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().append(true).create(true).open(path)
}

/// Expand a path template for one record. Returns the file path and
/// the defining key (the concatenated defining expansions).
fn expand_template(format: &str, ident: &RecordIdent, ptype: PacketType) -> (PathBuf, String) {
    let mut filename = String::new();
    let mut defkey = String::new();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' && c != '#' {
            filename.push(c);
            continue;
        }
        let defining = c == '%';

        let Some(token) = chars.next() else {
            filename.push(c);
            break;
        };

        let expansion = match token {
            'n' => ident.network.clone(),
            's' => ident.station.clone(),
            'l' => ident.location.clone(),
            'c' => ident.channel.clone(),
            'Y' => format!("{:04}", ident.year),
            'y' => format!("{:02}", ident.year % 100),
            'j' => format!("{:03}", ident.day),
            'H' => format!("{:02}", ident.hour),
            'M' => format!("{:02}", ident.minute),
            'S' => format!("{:02}", ident.second),
            'F' => format!("{:04}", ident.fract),
            't' => ptype.code().to_string(),
            '%' => {
                filename.push('%');
                continue;
            }
            '#' => {
                filename.push('#');
                continue;
            }
            other => {
                warn!(token = %other, "unknown archive format token, skipping");
                continue;
            }
        };

        filename.push_str(&expansion);
        if defining {
            defkey.push_str(&expansion);
        }
    }

    (PathBuf::from(filename), defkey)
}
