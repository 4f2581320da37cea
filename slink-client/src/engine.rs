use std::time::Instant;

use futures_core::Stream;
use slink_protocol::frame::{FrameHeader, HEADER_LEN};
use slink_protocol::mseed::{self, Detection, FormatVersion, MIN_RECORD_LEN, PacketType, RecordIdent};
use slink_protocol::{Command, InfoLevel, Response, SequenceNumber, ServerVersion};
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::RecvBuffer;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::registry::StreamRegistry;
use crate::timer::IntervalTimer;
use crate::transport::{Filled, READ_WAIT, ReadMode, Transport};

/// High-level connection state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// No socket.
    Down,
    /// Socket open, negotiating.
    Up,
    /// Streaming data.
    Data,
}

/// What kind of INFO response is currently in flight.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum QueryMode {
    None,
    Info,
    KeepAlive,
}

/// Batch negotiation state. `Requested` means `BATCH` was asked for;
/// only `Activated` (server acknowledged) suppresses per-command acks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchMode {
    Disabled,
    Requested,
    Activated,
}

/// Server identification from the HELLO exchange.
#[derive(Clone, Debug)]
pub struct ServerId {
    pub software: String,
    pub organization: String,
    pub version: Option<ServerVersion>,
}

/// A data packet delivered to the caller: the raw miniSEED record as
/// received, plus its frame sequence number and detected format.
#[derive(Clone, Debug)]
pub struct SlPacket {
    pub sequence: SequenceNumber,
    pub format: FormatVersion,
    pub payload: Vec<u8>,
}

impl SlPacket {
    /// Parse the record's identification fields (codes and start time).
    pub fn ident(&self) -> slink_protocol::Result<RecordIdent> {
        RecordIdent::parse(&self.payload, self.format)
    }

    /// Classify the record for archiving and display.
    pub fn packet_type(&self) -> PacketType {
        match self.format {
            FormatVersion::V2 => mseed::packet_type(&self.payload),
            FormatVersion::V3 => PacketType::Data,
        }
    }
}

/// Outcome of a collect call.
#[derive(Debug)]
pub enum Collected {
    /// A data packet passed through from the wire.
    Packet(SlPacket),
    /// A complete INFO response; XML reassembled across frames.
    Info(String),
    /// Nothing available right now (non-blocking variant only).
    NoPacket,
    /// The connection terminated cleanly.
    Terminated,
}

/// The SeedLink connection engine.
///
/// A single long-lived state machine (`DOWN` → `UP` → `DATA`) that
/// negotiates subscriptions from its [`StreamRegistry`], ingests the
/// framed record stream, and reconnects indefinitely on network
/// failures, resuming from the per-stream sequence numbers.
///
/// Drive it from one task; [`collect`](Self::collect) blocks at most
/// ~500 ms per internal socket wait and returns on every delivered
/// packet. [`terminate`](Self::terminate) requests cooperative
/// shutdown, honored within one tick.
pub struct SeedLinkEngine {
    config: EngineConfig,
    addr: String,
    registry: StreamRegistry,
    transport: Option<Transport>,
    buf: RecvBuffer,
    state: State,
    query_mode: QueryMode,
    batch: BatchMode,
    pending_info: Option<InfoLevel>,
    expect_info: bool,
    info_accumulator: Vec<u8>,
    terminate: bool,
    server: Option<ServerId>,
    netto: IntervalTimer,
    netdly: IntervalTimer,
    keepalive: IntervalTimer,
}

impl SeedLinkEngine {
    /// Create an engine for the given configuration and subscriptions.
    ///
    /// Configuration problems are reported here or on the first collect
    /// call, always before any connection attempt.
    pub fn new(config: EngineConfig, registry: StreamRegistry) -> Result<Self> {
        let addr = config.validate()?;

        Ok(Self {
            netto: IntervalTimer::new(config.netto),
            // Pre-fired so the first connect happens immediately.
            netdly: IntervalTimer::expired(Some(config.netdly)),
            keepalive: IntervalTimer::new(config.keepalive),
            config,
            addr,
            registry,
            transport: None,
            buf: RecvBuffer::new(),
            state: State::Down,
            query_mode: QueryMode::None,
            batch: BatchMode::Disabled,
            pending_info: None,
            expect_info: false,
            info_accumulator: Vec::new(),
            terminate: false,
            server: None,
        })
    }

    // -- Accessors --

    pub fn state(&self) -> State {
        self.state
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch
    }

    /// Identification of the connected server, once HELLO completed.
    pub fn server(&self) -> Option<&ServerId> {
        self.server.as_ref()
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StreamRegistry {
        &mut self.registry
    }

    // -- Control --

    /// Queue an INFO request, sent at the next opportunity while
    /// streaming. Only one may be in flight at a time.
    pub fn request_info(&mut self, level: InfoLevel) -> Result<()> {
        if self.pending_info.is_some() || self.expect_info {
            return Err(EngineError::InfoPending);
        }
        self.pending_info = Some(level);
        Ok(())
    }

    /// Request cooperative termination. The next collect step sends
    /// `BYE` (unless batch mode is active or the link is dial-up),
    /// closes the socket, drains buffered packets, and returns
    /// [`Collected::Terminated`].
    pub fn terminate(&mut self) {
        info!("terminating connection");
        self.terminate = true;
    }

    // -- Collecting --

    /// Collect the next packet, blocking variant.
    ///
    /// Drives the connection state machine until a packet or INFO
    /// response is available or the connection terminates. Each
    /// internal socket wait is bounded by ~500 ms, so a terminate
    /// request is honored promptly.
    pub async fn collect(&mut self) -> Result<Collected> {
        loop {
            if let Some(collected) = self.step(ReadMode::Wait).await? {
                return Ok(collected);
            }
        }
    }

    /// Collect without blocking: one state-machine step with a single
    /// non-blocking read attempt. Returns [`Collected::NoPacket`] when
    /// nothing is available.
    pub async fn collect_nb(&mut self) -> Result<Collected> {
        Ok(self
            .step(ReadMode::NonBlocking)
            .await?
            .unwrap_or(Collected::NoPacket))
    }

    /// Consume the engine and yield data packets as a [`Stream`].
    ///
    /// INFO responses are dropped; the stream ends on clean
    /// termination.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<SlPacket>> {
        async_stream::try_stream! {
            loop {
                match self.collect().await? {
                    Collected::Packet(packet) => yield packet,
                    Collected::Terminated => break,
                    Collected::Info(_) | Collected::NoPacket => {}
                }
            }
        }
    }

    /// One-shot server ping: connect, HELLO, return the two
    /// identification lines, disconnect. Independent of the engine's
    /// streaming state.
    pub async fn ping(&mut self) -> Result<(String, String)> {
        let mut transport = Transport::connect(&self.addr, self.config.iotimeout).await?;
        let mut buf = RecvBuffer::new();

        transport.send_command(&Command::Hello).await?;
        let line1 = transport.read_line(&mut buf, self.config.iotimeout).await?;
        let line2 = transport.read_line(&mut buf, self.config.iotimeout).await?;

        let _ = transport.send_command(&Command::Bye).await;
        transport.shutdown().await;

        Ok((line1.trim().to_owned(), line2.trim().to_owned()))
    }

    // -- State machine --

    /// Perform one step of the connection state machine.
    ///
    /// Returns `Some` when a packet, INFO response, or termination is
    /// to be surfaced, `None` when the caller should step again (or
    /// report no-packet, in the non-blocking variant).
    async fn step(&mut self, mode: ReadMode) -> Result<Option<Collected>> {
        if self.terminate {
            self.close_link(true).await;
        } else {
            if self.transport.is_none() {
                self.state = State::Down;
            }

            let now = Instant::now();
            self.netto.evaluate(now);
            self.netdly.evaluate(now);
            self.keepalive.evaluate(now);

            // Network timeout: tear down and schedule a reconnect.
            if self.state == State::Data && self.netto.is_fired() {
                warn!(
                    netto = ?self.config.netto,
                    netdly = ?self.config.netdly,
                    "network timeout, reconnecting"
                );
                self.close_link(false).await;
                self.netto.reset();
            }

            // Keepalive probe while streaming.
            if self.state == State::Data && !self.expect_info && self.keepalive.is_fired() {
                debug!("sending keepalive request");
                match self.send_to_server(&Command::Info { level: InfoLevel::Id }).await {
                    Ok(()) => {
                        self.query_mode = QueryMode::KeepAlive;
                        self.expect_info = true;
                        self.keepalive.reset();
                    }
                    Err(e) => {
                        warn!(error = %e, "keepalive send failed");
                        self.close_link(false).await;
                    }
                }
            }

            // Pending in-stream INFO request.
            if self.state == State::Data
                && !self.expect_info
                && let Some(level) = self.pending_info
            {
                match self.send_to_server(&Command::Info { level }).await {
                    Ok(()) => {
                        self.query_mode = QueryMode::Info;
                        self.expect_info = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "INFO send failed");
                        self.close_link(false).await;
                    }
                }
                self.pending_info = None;
            }

            // Throttle while the reconnect delay runs.
            if self.state == State::Down && self.netdly.is_running() {
                sleep(READ_WAIT).await;
            }

            // Connect once the reconnect delay has passed.
            if self.state == State::Down && self.netdly.is_fired() {
                self.check_startup()?;
                match self.open_connection().await {
                    Ok(()) => self.state = State::Up,
                    Err(e) => warn!(addr = %self.addr, error = %e, "connection failed"),
                }
                self.netto.reset();
                self.keepalive.reset();
                self.netdly.reset();
            }

            // Negotiate subscriptions.
            if self.state == State::Up {
                match self.negotiate().await {
                    Ok(()) => {
                        self.state = State::Data;
                    }
                    Err(e @ EngineError::ConfigInvalid(_)) => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "negotiation failed");
                        self.close_link(false).await;
                    }
                }
            }
        }

        // Deliver every complete frame already buffered.
        if let Some(collected) = self.drain_frames()? {
            return Ok(Some(collected));
        }

        // Trap door: buffered packets have all been delivered.
        if self.terminate {
            return Ok(Some(Collected::Terminated));
        }

        self.buf.compact();

        // End-of-stream sentinels arrive as bare text, not frames.
        if self.buf.pending() == b"ERROR\r\n" {
            error!("server reported an error with the last command");
            self.close_link(false).await;
            return Err(EngineError::ServerError(
                "stream terminated by server".into(),
            ));
        }
        if self.buf.pending() == b"END" {
            info!("end of buffered data");
            self.close_link(false).await;
            return Ok(Some(Collected::Terminated));
        }

        // Pull in more bytes.
        if self.state == State::Data
            && let Some(transport) = self.transport.as_mut()
        {
            match transport.fill(&mut self.buf, mode).await {
                Ok(Filled::Bytes(n)) => {
                    trace!(bytes = n, "received");
                    self.netto.reset();
                    self.keepalive.reset();
                }
                Ok(Filled::Idle) => return Ok(None),
                Ok(Filled::Eof) => {
                    warn!("server closed connection");
                    self.close_link(false).await;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    self.close_link(false).await;
                }
            }
        }

        Ok(None)
    }

    /// Reject hopeless configurations before the first connect.
    fn check_startup(&self) -> Result<()> {
        if self.registry.is_empty() && self.pending_info.is_none() {
            return Err(EngineError::ConfigInvalid(
                "no streams configured and no INFO request pending".into(),
            ));
        }
        Ok(())
    }

    /// Open the TCP connection and perform the HELLO exchange.
    async fn open_connection(&mut self) -> Result<()> {
        let mut transport = Transport::connect(&self.addr, self.config.iotimeout).await?;
        self.buf.clear();
        self.batch = BatchMode::Disabled;
        self.query_mode = QueryMode::None;
        self.expect_info = false;
        self.info_accumulator.clear();

        transport.send_command(&Command::Hello).await?;
        let line1 = transport.read_line(&mut self.buf, self.config.iotimeout).await?;
        let line2 = transport.read_line(&mut self.buf, self.config.iotimeout).await?;

        let Response::Hello {
            software,
            organization,
            version,
        } = Response::parse_hello(&line1, &line2)?
        else {
            return Err(EngineError::NegotiationFailed(
                "malformed HELLO response".into(),
            ));
        };

        info!(%software, %organization, version = ?version, "connected");
        self.server = Some(ServerId {
            software,
            organization,
            version,
        });
        self.transport = Some(transport);
        Ok(())
    }

    /// Configure the negotiated link: batch request, then the
    /// subscription commands in registry order, then `END`.
    async fn negotiate(&mut self) -> Result<()> {
        if self.registry.is_empty() {
            // INFO-only connection: no subscriptions to configure.
            let level = self.pending_info.take().ok_or_else(|| {
                EngineError::ConfigInvalid("no streams configured and no INFO request".into())
            })?;
            self.send_to_server(&Command::Info { level }).await?;
            self.query_mode = QueryMode::Info;
            self.expect_info = true;
            return Ok(());
        }

        if self.config.batch {
            self.negotiate_batch().await?;
        }

        self.expect_info = false;

        if self.registry.is_uni() {
            self.negotiate_uni().await?;
        } else {
            self.negotiate_multi().await?;
        }

        // END triggers streaming and gets no text reply.
        self.send_to_server(&Command::End).await?;
        Ok(())
    }

    async fn negotiate_batch(&mut self) -> Result<()> {
        if !self.server_version().at_least(3, 0) {
            warn!("server does not support batch mode, continuing without");
            return Ok(());
        }

        self.batch = BatchMode::Requested;
        match self.command_roundtrip(Command::Batch).await {
            Ok(()) => {
                debug!("batch mode activated");
                self.batch = BatchMode::Activated;
            }
            Err(e) => {
                warn!(error = %e, "batch request refused, continuing without");
                self.batch = BatchMode::Disabled;
            }
        }
        Ok(())
    }

    async fn negotiate_uni(&mut self) -> Result<()> {
        let entry = self
            .registry
            .iter()
            .next()
            .cloned()
            .ok_or_else(|| EngineError::ConfigInvalid("empty registry".into()))?;

        for selector in &entry.selectors {
            self.command_roundtrip(Command::Select {
                pattern: Some(selector.clone()),
            })
            .await?;
        }

        let arm = self.arming_command(&entry);
        self.command_roundtrip(arm).await?;
        Ok(())
    }

    async fn negotiate_multi(&mut self) -> Result<()> {
        if !self.server_version().at_least(2, 5) {
            return Err(EngineError::NegotiationFailed(format!(
                "multi-station mode requires protocol >= 2.5, server has {}",
                self.server_version()
            )));
        }

        let entries: Vec<_> = self.registry.iter().cloned().collect();
        for entry in entries {
            self.command_roundtrip(Command::Station {
                station: entry.sta.clone(),
                network: entry.net.clone(),
            })
            .await?;

            for selector in &entry.selectors {
                self.command_roundtrip(Command::Select {
                    pattern: Some(selector.clone()),
                })
                .await?;
            }

            let arm = self.arming_command(&entry);
            self.command_roundtrip(arm).await?;
        }
        Ok(())
    }

    /// The per-entry arming command: `TIME` when a window is
    /// configured (overriding resume), otherwise `DATA`/`FETCH` with
    /// the entry's resume point.
    fn arming_command(&self, entry: &crate::registry::StreamEntry) -> Command {
        if let Some(begin) = &self.config.begin_time {
            return Command::Time {
                start: begin.clone(),
                end: self.config.end_time.clone(),
            };
        }

        let sequence = if self.config.resume && !entry.seqnum.is_unset() {
            Some(entry.seqnum)
        } else {
            None
        };
        let time = if sequence.is_some() && !entry.timestamp.is_empty() {
            Some(entry.timestamp.clone())
        } else {
            None
        };

        if self.config.dialup {
            Command::Fetch { sequence, time }
        } else {
            Command::Data { sequence, time }
        }
    }

    fn server_version(&self) -> ServerVersion {
        self.server
            .as_ref()
            .and_then(|s| s.version)
            .unwrap_or_default()
    }

    async fn send_to_server(&mut self, cmd: &Command) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(EngineError::Disconnected)?;
        transport.send_command(cmd).await
    }

    /// Send a command and, unless batch mode is active, await its
    /// `OK`/`ERROR` acknowledgement.
    async fn command_roundtrip(&mut self, cmd: Command) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(EngineError::Disconnected)?;
        transport.send_command(&cmd).await?;

        if self.batch == BatchMode::Activated {
            return Ok(());
        }

        let line = transport
            .read_line(&mut self.buf, self.config.iotimeout)
            .await?;
        match Response::parse_line(&line)? {
            Response::Ok => Ok(()),
            Response::Error(description) => Err(EngineError::NegotiationFailed(format!(
                "{}: server error {description:?}",
                cmd.to_line()
            ))),
            other => Err(EngineError::NegotiationFailed(format!(
                "{}: unexpected reply {other:?}",
                cmd.to_line()
            ))),
        }
    }

    /// Deliver complete frames from the receive buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete frame.
    /// Non-miniSEED content is fatal for the context.
    fn drain_frames(&mut self) -> Result<Option<Collected>> {
        loop {
            if self.buf.len() < HEADER_LEN + MIN_RECORD_LEN {
                return Ok(None);
            }

            let header = FrameHeader::parse(&self.buf.pending()[..HEADER_LEN])
                .map_err(EngineError::DecodeFatal)?;

            let (length, format) = match mseed::detect(&self.buf.pending()[HEADER_LEN..])
                .map_err(EngineError::DecodeFatal)?
            {
                Detection::Incomplete => return Ok(None),
                Detection::Record { length, format } => (length, format),
            };

            if self.buf.len() < HEADER_LEN + length {
                return Ok(None);
            }

            let record = self.buf.pending()[HEADER_LEN..HEADER_LEN + length].to_vec();
            self.buf.consume(HEADER_LEN + length);

            match header {
                FrameHeader::Info { terminated } => {
                    if let Some(xml) = self.process_info_frame(&record, terminated) {
                        return Ok(Some(Collected::Info(xml)));
                    }
                }
                FrameHeader::Data { sequence } => {
                    if let Some(packet) = self.process_data_frame(record, sequence, format) {
                        return Ok(Some(Collected::Packet(packet)));
                    }
                }
            }
        }
    }

    /// Accumulate one INFO frame; returns the reassembled XML once the
    /// terminator arrives on a caller-requested query.
    fn process_info_frame(&mut self, record: &[u8], terminated: bool) -> Option<String> {
        if !self.expect_info {
            warn!("unexpected INFO packet received, skipping");
            return None;
        }

        match mseed::log_payload(record) {
            Some(payload) => self.info_accumulator.extend_from_slice(payload),
            None => warn!("INFO record carries no readable payload"),
        }

        if !terminated {
            if self.query_mode == QueryMode::KeepAlive {
                warn!("non-terminated keepalive response received");
            }
            return None;
        }

        self.expect_info = false;
        let was_keepalive = self.query_mode == QueryMode::KeepAlive;
        self.query_mode = QueryMode::None;

        let xml = String::from_utf8_lossy(&self.info_accumulator).into_owned();
        self.info_accumulator.clear();

        if was_keepalive {
            debug!("keepalive response received");
            return None;
        }
        Some(xml)
    }

    /// Update the registry for a data frame and hand it to the caller.
    /// Records matching no subscription are logged and skipped.
    fn process_data_frame(
        &mut self,
        record: Vec<u8>,
        sequence: SequenceNumber,
        format: FormatVersion,
    ) -> Option<SlPacket> {
        match RecordIdent::parse(&record, format) {
            Ok(ident) => {
                let updates = self.registry.match_and_update(
                    &ident.network,
                    &ident.station,
                    sequence,
                    &ident.start_time_string(),
                );
                if updates == 0 {
                    warn!(
                        net = %ident.network,
                        sta = %ident.station,
                        "unexpected data received, skipping"
                    );
                    return None;
                }
            }
            Err(e) => {
                warn!(error = %e, "could not read record identification, skipping");
                return None;
            }
        }

        Some(SlPacket {
            sequence,
            format,
            payload: record,
        })
    }

    /// Close the socket. A graceful close says `BYE` first, unless the
    /// link is dial-up or batch mode suppressed the dialog. A
    /// non-graceful close arms the reconnect delay.
    async fn close_link(&mut self, graceful: bool) {
        if let Some(mut transport) = self.transport.take() {
            if graceful && !self.config.dialup && self.batch != BatchMode::Activated {
                let _ = transport.send_command(&Command::Bye).await;
            }
            transport.shutdown().await;
        }
        self.state = State::Down;
        if !graceful {
            self.netdly.reset();
        }
    }
}
