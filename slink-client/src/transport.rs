use std::io;
use std::time::{Duration, Instant};

use slink_protocol::Command;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::buffer::RecvBuffer;
use crate::error::{EngineError, Result};

/// How long a blocking collect step waits for socket readability.
pub const READ_WAIT: Duration = Duration::from_millis(500);

/// Whether a fill waits for data or returns immediately.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Wait up to [`READ_WAIT`] for data.
    Wait,
    /// One non-blocking read attempt.
    NonBlocking,
}

/// Outcome of a fill attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Filled {
    Bytes(usize),
    /// No data available within the wait window.
    Idle,
    /// Peer closed the connection.
    Eof,
}

/// A connected SeedLink socket.
///
/// All buffering happens in the engine's [`RecvBuffer`]; the transport
/// only moves bytes and lines in and out of it.
pub struct Transport {
    stream: TcpStream,
}

impl Transport {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EngineError::Timeout(timeout))??;

        stream.set_nodelay(true).ok();

        Ok(Self { stream })
    }

    pub async fn send_command(&mut self, cmd: &Command) -> Result<()> {
        trace!(line = %cmd.to_line(), "sending");
        self.stream.write_all(&cmd.to_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one CRLF-terminated response line through the receive
    /// buffer. Bytes after the line (early data frames) stay buffered.
    pub async fn read_line(&mut self, buf: &mut RecvBuffer, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(pos) = buf.pending().iter().position(|&b| b == b'\n') {
                let line = String::from_utf8_lossy(&buf.pending()[..=pos]).into_owned();
                buf.consume(pos + 1);
                return Ok(line);
            }

            buf.compact();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EngineError::Timeout(timeout));
            }

            let n = tokio::time::timeout(remaining, self.stream.read(buf.spare()))
                .await
                .map_err(|_| EngineError::Timeout(timeout))??;
            if n == 0 {
                return Err(EngineError::Disconnected);
            }
            buf.advance(n);
        }
    }

    /// Pull available bytes into the receive buffer.
    pub async fn fill(&mut self, buf: &mut RecvBuffer, mode: ReadMode) -> io::Result<Filled> {
        buf.compact();
        if buf.spare().is_empty() {
            return Ok(Filled::Idle);
        }

        match mode {
            ReadMode::Wait => {
                match tokio::time::timeout(READ_WAIT, self.stream.read(buf.spare())).await {
                    Err(_elapsed) => Ok(Filled::Idle),
                    Ok(Ok(0)) => Ok(Filled::Eof),
                    Ok(Ok(n)) => {
                        buf.advance(n);
                        Ok(Filled::Bytes(n))
                    }
                    Ok(Err(e)) => Err(e),
                }
            }
            ReadMode::NonBlocking => match self.stream.try_read(buf.spare()) {
                Ok(0) => Ok(Filled::Eof),
                Ok(n) => {
                    buf.advance(n);
                    Ok(Filled::Bytes(n))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Filled::Idle),
                Err(e) => Err(e),
            },
        }
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
