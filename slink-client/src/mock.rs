//! Scripted SeedLink server for engine tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use slink_protocol::frame::FrameHeader;
use slink_protocol::SequenceNumber;

pub struct MockConfig {
    pub hello_line1: String,
    pub hello_line2: String,
    /// Frames streamed after `END`/`FETCH`.
    pub frames: Vec<Vec<u8>>,
    /// Per-connection frame overrides; connections beyond the list fall
    /// back to `frames`.
    pub connection_frames: Option<Vec<Vec<Vec<u8>>>>,
    /// Frames sent in response to `INFO`.
    pub info_frames: Vec<Vec<u8>>,
    /// Raw bytes appended after the streamed frames (e.g. `b"END"` for
    /// a dial-up server, `b"ERROR\r\n"` for a stream-level error).
    pub stream_tail: Option<Vec<u8>>,
    /// Close the connection once the frames (and tail) are sent.
    pub close_after_stream: bool,
    /// Acknowledge `BATCH` and stop sending per-command acks.
    pub accept_batch: bool,
    /// Reply `ERROR` to commands with this prefix on this connection
    /// index.
    pub error_on: Option<(String, usize)>,
    /// How many sequential connections to accept.
    pub max_connections: usize,
}

impl MockConfig {
    pub fn v3(frames: Vec<Vec<u8>>) -> Self {
        Self {
            hello_line1: "SeedLink v3.1 (2020.075)".to_owned(),
            hello_line2: "Mock Server".to_owned(),
            frames,
            connection_frames: None,
            info_frames: Vec::new(),
            stream_tail: None,
            close_after_stream: false,
            accept_batch: false,
            error_on: None,
            max_connections: 1,
        }
    }
}

/// Commands received, grouped per connection in arrival order.
#[derive(Clone, Default)]
pub struct CapturedCommands(Arc<Mutex<Vec<Vec<String>>>>);

impl CapturedCommands {
    pub fn connection(&self, idx: usize) -> Vec<String> {
        self.0.lock().unwrap().get(idx).cloned().unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn start_connection(&self) {
        self.0.lock().unwrap().push(Vec::new());
    }

    fn push(&self, cmd: String) {
        let mut guard = self.0.lock().unwrap();
        if let Some(last) = guard.last_mut() {
            last.push(cmd);
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
    captured: CapturedCommands,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = CapturedCommands::default();

        let captured_clone = captured.clone();
        tokio::spawn(async move {
            Self::handle_connections(listener, config, captured_clone).await;
        });

        Self { addr, captured }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn captured(&self) -> &CapturedCommands {
        &self.captured
    }

    async fn handle_connections(
        listener: TcpListener,
        config: MockConfig,
        captured: CapturedCommands,
    ) {
        for conn_idx in 0..config.max_connections {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            captured.start_connection();
            Self::handle_one_connection(stream, &config, &captured, conn_idx).await;
        }
    }

    async fn handle_one_connection(
        stream: tokio::net::TcpStream,
        config: &MockConfig,
        captured: &CapturedCommands,
        conn_idx: usize,
    ) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let mut batch_active = false;

        let frames = config
            .connection_frames
            .as_ref()
            .and_then(|cf| cf.get(conn_idx))
            .unwrap_or(&config.frames);

        loop {
            line.clear();
            let n = match reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }

            let trimmed = line.trim().to_uppercase();
            captured.push(trimmed.clone());

            let scripted_error = matches!(
                &config.error_on,
                Some((prefix, idx)) if *idx == conn_idx && trimmed.starts_with(prefix.as_str())
            );

            if trimmed == "HELLO" {
                let response = format!("{}\r\n{}\r\n", config.hello_line1, config.hello_line2);
                if write_half.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
            } else if trimmed == "BATCH" {
                if scripted_error || !config.accept_batch {
                    if write_half.write_all(b"ERROR\r\n").await.is_err() {
                        break;
                    }
                } else {
                    batch_active = true;
                    if write_half.write_all(b"OK\r\n").await.is_err() {
                        break;
                    }
                }
            } else if trimmed.starts_with("STATION")
                || trimmed.starts_with("SELECT")
                || trimmed.starts_with("DATA")
                || trimmed.starts_with("FETCH")
                || trimmed.starts_with("TIME")
            {
                if scripted_error {
                    if write_half.write_all(b"ERROR\r\n").await.is_err() {
                        break;
                    }
                } else if !batch_active && write_half.write_all(b"OK\r\n").await.is_err() {
                    break;
                }
            } else if trimmed == "END" {
                for frame in frames {
                    if write_half.write_all(frame).await.is_err() {
                        break;
                    }
                }
                if let Some(tail) = &config.stream_tail {
                    let _ = write_half.write_all(tail).await;
                }
                let _ = write_half.flush().await;
                if config.close_after_stream {
                    break;
                }
            } else if trimmed.starts_with("INFO") {
                for frame in &config.info_frames {
                    if write_half.write_all(frame).await.is_err() {
                        break;
                    }
                }
            } else if trimmed == "BYE" {
                break;
            }

            let _ = write_half.flush().await;
        }

        let _ = write_half.shutdown().await;
    }
}

// -- Record and frame builders --

/// Build a 512-byte big-endian miniSEED 2.x data record with a B1000.
pub fn ms2_record(net: &str, sta: &str) -> Vec<u8> {
    let mut rec = vec![0u8; 512];
    rec[0..6].copy_from_slice(b"000001");
    rec[6] = b'D';
    rec[7] = b' ';
    pad_code(&mut rec[8..13], sta);
    rec[13..15].copy_from_slice(b"  ");
    rec[15..18].copy_from_slice(b"BHZ");
    pad_code(&mut rec[18..20], net);
    rec[20..22].copy_from_slice(&2024u16.to_be_bytes()); // year
    rec[22..24].copy_from_slice(&46u16.to_be_bytes()); // Feb 15
    rec[24] = 10;
    rec[25] = 30;
    rec[26] = 5;
    rec[30..32].copy_from_slice(&100u16.to_be_bytes()); // num_samples
    rec[32..34].copy_from_slice(&20u16.to_be_bytes()); // samprate factor
    rec[39] = 1; // one blockette
    rec[44..46].copy_from_slice(&64u16.to_be_bytes()); // begin_data
    rec[46..48].copy_from_slice(&48u16.to_be_bytes()); // begin_blockette
    // B1000: type, next, encoding, word order, record length 2^9
    rec[48..50].copy_from_slice(&1000u16.to_be_bytes());
    rec[50..52].copy_from_slice(&0u16.to_be_bytes());
    rec[52] = 10;
    rec[53] = 1;
    rec[54] = 9;
    rec
}

/// A complete data frame: 8-byte header plus a 512-byte record.
pub fn data_frame(seq: u32, net: &str, sta: &str) -> Vec<u8> {
    let mut frame = FrameHeader::encode_data(SequenceNumber::new(seq)).to_vec();
    frame.extend_from_slice(&ms2_record(net, sta));
    frame
}

/// An INFO frame: `SLINFO` header plus a 512-byte log record whose
/// payload is `xml`.
pub fn info_frame(terminated: bool, xml: &str) -> Vec<u8> {
    let mut rec = ms2_record("SL", "INFO");
    rec[32..34].copy_from_slice(&0u16.to_be_bytes()); // no sample rate: log record
    rec[30..32].copy_from_slice(&(xml.len() as u16).to_be_bytes());
    rec[64..64 + xml.len()].copy_from_slice(xml.as_bytes());

    let mut frame = FrameHeader::encode_info(terminated).to_vec();
    frame.extend_from_slice(&rec);
    frame
}

fn pad_code(dest: &mut [u8], code: &str) {
    let bytes = code.as_bytes();
    for (i, slot) in dest.iter_mut().enumerate() {
        *slot = bytes.get(i).copied().unwrap_or(b' ');
    }
}
