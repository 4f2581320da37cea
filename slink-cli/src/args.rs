//! Command line interface of the `slink` binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Command line arguments for the `slink` binary.
#[derive(Debug, Parser)]
#[command(
    name = "slink",
    version,
    about = "SeedLink client: stream, print, dump, and archive miniSEED records"
)]
pub struct Cli {
    /// Address of the SeedLink server, host[:port]. Port defaults to
    /// 18000; a bare ':port' means localhost.
    pub address: String,

    /// Be more verbose (repeatable).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print details of received packets (repeat for more detail).
    #[arg(short = 'p', action = ArgAction::Count)]
    pub print_packets: u8,

    // -- Connection --
    /// Network timeout in seconds: reconnect if no data or keepalive
    /// acks arrive in this time. 0 disables.
    #[arg(long = "nt", value_name = "SECONDS", default_value_t = 600)]
    pub network_timeout: u64,

    /// Delay between reconnection attempts, in seconds.
    #[arg(long = "nd", value_name = "SECONDS", default_value_t = 30)]
    pub reconnect_delay: u64,

    /// Send keepalive (heartbeat) requests this often, in seconds.
    #[arg(short = 'k', long = "keepalive", value_name = "SECONDS")]
    pub keepalive: Option<u64>,

    /// Dial-up mode: fetch buffered data, then exit when the server
    /// finishes.
    #[arg(short = 'd', long)]
    pub dialup: bool,

    /// Request batch mode for subscription commands (SeedLink >= 3.0).
    #[arg(short = 'b', long)]
    pub batch: bool,

    // -- Stream selection --
    /// Select streams for multi-station mode:
    /// 'NET_STA[:selectors],...', e.g. "IU_KONO:BHE BHN,GE_WLF".
    #[arg(short = 'S', value_name = "STREAMS")]
    pub streams: Option<String>,

    /// Read a multi-station stream list from this file
    /// (one 'NET STA [selectors...]' per line).
    #[arg(short = 'l', value_name = "FILE")]
    pub stream_file: Option<PathBuf>,

    /// Selectors for uni-station mode, or defaults for multi-station
    /// entries without their own.
    #[arg(short = 's', value_name = "SELECTORS")]
    pub selectors: Option<String>,

    /// Server-side time window 'start[:end]', times as
    /// YYYY,MM,DD,HH,MM,SS. Overrides sequence-number resume.
    #[arg(long = "tw", value_name = "WINDOW")]
    pub time_window: Option<String>,

    // -- State --
    /// Save/restore stream state to this file, optionally every
    /// INTERVAL packets.
    #[arg(short = 'x', long = "statefile", value_name = "FILE[:INTERVAL]")]
    pub statefile: Option<String>,

    // -- Record sinks --
    /// Append received records to this file ('-' for stdout).
    #[arg(short = 'o', long = "outfile", value_name = "FILE")]
    pub dumpfile: Option<String>,

    /// Archive records into a custom directory/file template with
    /// %n %s %l %c %Y %y %j %H %M %S %F %t tokens ('#' variants are
    /// non-defining).
    #[arg(short = 'A', value_name = "FORMAT")]
    pub archive_format: Option<String>,

    /// Archive records into an SDS structure rooted at this directory.
    #[arg(long = "sds", value_name = "DIR")]
    pub sds: Option<PathBuf>,

    /// Archive records into a BUD structure rooted at this directory
    /// (legacy layout, waveform records only).
    #[arg(long = "bud", value_name = "DIR")]
    pub bud: Option<PathBuf>,

    /// Close idle archive files after this many seconds.
    #[arg(long = "idle-timeout", value_name = "SECONDS", default_value_t = 120)]
    pub idle_timeout: u64,

    // -- Server queries --
    /// Ping the server: print its identification lines and exit.
    #[arg(short = 'P', long)]
    pub ping: bool,

    /// Request server information at this level and print the XML
    /// response (ID, CAPABILITIES, STATIONS, STREAMS, GAPS,
    /// CONNECTIONS, ALL).
    #[arg(short = 'i', long = "info", value_name = "LEVEL")]
    pub info: Option<String>,
}

/// Split a `file[:interval]` state-file argument.
pub fn parse_statefile_arg(arg: &str) -> (PathBuf, Option<u32>) {
    if let Some((path, interval)) = arg.rsplit_once(':')
        && let Ok(interval) = interval.parse::<u32>()
        && interval > 0
        && !path.is_empty()
    {
        return (PathBuf::from(path), Some(interval));
    }
    (PathBuf::from(arg), None)
}

/// Split a `start[:end]` time window argument.
pub fn parse_time_window(arg: &str) -> (String, Option<String>) {
    match arg.split_once(':') {
        Some((start, end)) if !end.is_empty() => (start.to_owned(), Some(end.to_owned())),
        Some((start, _)) => (start.to_owned(), None),
        None => (arg.to_owned(), None),
    }
}
