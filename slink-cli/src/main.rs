//! `slink`, a command-line SeedLink client.
//!
//! Connects to a SeedLink server, subscribes to streams in uni- or
//! multi-station mode, and prints, dumps, or archives the received
//! miniSEED records. Stream state can be saved across runs for
//! sequence-number resume.

mod args;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slink_client::{
    ArchiveSink, Collected, EngineConfig, SeedLinkEngine, SlPacket, StreamRegistry, statefile,
    streamlist,
};
use slink_protocol::InfoLevel;
use slink_protocol::selector::split_selectors;

use args::{Cli, parse_statefile_arg, parse_time_window};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = engine_config(&cli);
    let mut registry = build_registry(&cli)?;

    let state = cli.statefile.as_deref().map(parse_statefile_arg);
    if let Some((path, _)) = &state
        && path.exists()
    {
        match statefile::recover_state(&mut registry, path) {
            Ok(n) => info!(recovered = n, "stream state recovered"),
            Err(e) => warn!(error = %e, "state recovery failed"),
        }
    }

    let mut engine = SeedLinkEngine::new(config, registry)?;

    if cli.ping {
        let (line1, line2) = engine.ping().await?;
        println!("{line1}");
        println!("{line2}");
        return Ok(());
    }

    if let Some(level) = &cli.info {
        let level = InfoLevel::parse(level)?;
        return run_info_query(&mut engine, level).await;
    }

    run_stream_loop(&mut engine, &cli, state).await
}

/// One INFO request: print the XML response and shut down.
async fn run_info_query(
    engine: &mut SeedLinkEngine,
    level: InfoLevel,
) -> Result<(), Box<dyn std::error::Error>> {
    engine.request_info(level)?;

    loop {
        match engine.collect().await? {
            Collected::Info(xml) => {
                println!("{xml}");
                break;
            }
            Collected::Terminated => return Ok(()),
            _ => {}
        }
    }

    engine.terminate();
    while !matches!(engine.collect().await?, Collected::Terminated) {}
    Ok(())
}

/// The main collection loop: deliver packets to the configured sinks
/// until the stream ends or an interrupt arrives.
async fn run_stream_loop(
    engine: &mut SeedLinkEngine,
    cli: &Cli,
    state: Option<(PathBuf, Option<u32>)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut dump = open_dump(cli.dumpfile.as_deref())?;
    let mut sink = archive_sink(cli);
    let mut since_save = 0u32;

    let result = loop {
        let collected = tokio::select! {
            collected = engine.collect() => Some(collected),
            _ = tokio::signal::ctrl_c() => None,
        };

        match collected {
            None => {
                info!("interrupt received, shutting down");
                engine.terminate();
            }
            Some(Ok(Collected::Packet(packet))) => {
                handle_packet(&packet, cli.print_packets, dump.as_mut(), sink.as_mut());

                since_save += 1;
                if let Some((path, Some(interval))) = &state
                    && since_save >= *interval
                {
                    if let Err(e) = statefile::save_state(engine.registry(), path) {
                        warn!(error = %e, "state save failed");
                    }
                    since_save = 0;
                }
            }
            Some(Ok(Collected::Info(xml))) => println!("{xml}"),
            Some(Ok(Collected::NoPacket)) => {}
            Some(Ok(Collected::Terminated)) => break Ok(()),
            Some(Err(e)) => break Err(e),
        }
    };

    if let Some(sink) = sink.as_mut() {
        sink.close_all();
    }
    if let Some((path, _)) = &state {
        match statefile::save_state(engine.registry(), path) {
            Ok(n) => info!(saved = n, "stream state saved"),
            Err(e) => warn!(error = %e, "state save failed"),
        }
    }

    result.map_err(Into::into)
}

fn handle_packet(
    packet: &SlPacket,
    detail: u8,
    dump: Option<&mut DumpSink>,
    sink: Option<&mut ArchiveSink>,
) {
    let ident = match packet.ident() {
        Ok(ident) => ident,
        Err(e) => {
            warn!(error = %e, "unreadable record header");
            return;
        }
    };

    if detail > 0 {
        println!(
            "{}_{}_{}_{}, seq {}, type {}, {} bytes",
            ident.network,
            ident.station,
            ident.location,
            ident.channel,
            packet.sequence,
            packet.packet_type().code(),
            packet.payload.len()
        );
        if detail > 1 {
            println!("  start time: {}.{:04}", ident.start_time_string(), ident.fract);
        }
    }

    if let Some(dump) = dump
        && let Err(e) = dump.write(&packet.payload)
    {
        warn!(error = %e, "dump write failed");
    }

    if let Some(sink) = sink {
        sink.archive(&packet.payload, &ident, packet.packet_type());
    }
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let (begin_time, end_time) = match cli.time_window.as_deref() {
        Some(window) => {
            let (begin, end) = parse_time_window(window);
            (Some(begin), end)
        }
        None => (None, None),
    };

    EngineConfig {
        address: cli.address.clone(),
        netto: (cli.network_timeout > 0).then(|| Duration::from_secs(cli.network_timeout)),
        netdly: Duration::from_secs(cli.reconnect_delay),
        keepalive: cli.keepalive.map(Duration::from_secs),
        dialup: cli.dialup,
        batch: cli.batch,
        begin_time,
        end_time,
        ..EngineConfig::default()
    }
}

/// Build the subscription registry from `-S`/`-l`, falling back to
/// uni-station mode when neither is given.
fn build_registry(cli: &Cli) -> Result<StreamRegistry, Box<dyn std::error::Error>> {
    let mut registry = StreamRegistry::new();
    let defaults = cli.selectors.as_deref();

    if let Some(path) = &cli.stream_file {
        streamlist::read_stream_list(&mut registry, path, defaults)?;
    }
    if let Some(list) = &cli.streams {
        streamlist::parse_stream_list(&mut registry, list, defaults)?;
    }

    if registry.is_empty() && !cli.ping && cli.info.is_none() {
        let selectors = split_selectors(defaults.unwrap_or(""))?;
        registry.set_uni(selectors, None, "")?;
    }

    Ok(registry)
}

fn archive_sink(cli: &Cli) -> Option<ArchiveSink> {
    let idle = Duration::from_secs(cli.idle_timeout);
    if let Some(format) = &cli.archive_format {
        Some(ArchiveSink::new(format.clone()).with_idle_timeout(idle))
    } else if let Some(root) = &cli.sds {
        Some(ArchiveSink::sds(root).with_idle_timeout(idle))
    } else if let Some(root) = &cli.bud {
        Some(ArchiveSink::bud(root).with_idle_timeout(idle))
    } else {
        None
    }
}

enum DumpSink {
    Stdout,
    File(File),
}

impl DumpSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()
            }
            Self::File(file) => file.write_all(bytes),
        }
    }
}

fn open_dump(arg: Option<&str>) -> io::Result<Option<DumpSink>> {
    match arg {
        None => Ok(None),
        Some("-") => Ok(Some(DumpSink::Stdout)),
        Some(path) => {
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            Ok(Some(DumpSink::File(file)))
        }
    }
}
