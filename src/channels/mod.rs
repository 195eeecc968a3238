//! Local textual channel ingest/egress (spec §4.G, §6).
//!
//! Line-oriented UTF-8, one message per line, trimmed of CR/LF on ingest;
//! egress appends LF. The physical serial transport is an out-of-scope
//! external collaborator (spec §1); [`LineTransport`] stands in for it.

use crate::message::{Message, Origin};
use crate::queue::{InputSender, OutputReceiver};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

/// Blocking-send bound for ingest, per spec §4.G.
const INGEST_SEND_TIMEOUT: Duration = Duration::from_millis(100);

#[async_trait]
pub trait LineTransport: Send {
    /// Returns `Ok(None)` at end of stream.
    async fn read_line(&mut self) -> std::io::Result<Option<String>>;
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;
}

pub struct StdioTransport {
    reader: BufReader<Stdin>,
    writer: Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineTransport for StdioTransport {
    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

/// Reads lines from `transport`, trims CR/LF, drops empties, and enqueues
/// with a 100 ms blocking-send bound (spec §4.G).
pub async fn run_ingest(mut transport: impl LineTransport, input: InputSender) {
    loop {
        match transport.read_line().await {
            Ok(Some(raw)) => {
                let trimmed = raw.trim_end_matches(['\r', '\n']).trim();
                if trimmed.is_empty() {
                    continue;
                }
                let message = Message::new(trimmed, Origin::Local);
                input.send_with_timeout(message, INGEST_SEND_TIMEOUT).await;
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("local channel read error: {e}");
                break;
            }
        }
    }
}

/// Dequeues agent replies and writes them to `transport`.
pub async fn run_egress(mut transport: impl LineTransport, mut output: OutputReceiver) {
    while let Some(text) = output.recv().await {
        if let Err(e) = transport.write_line(&text).await {
            log::error!("local channel write error: {e}");
        }
    }
}
