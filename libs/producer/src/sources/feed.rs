use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

use relay_api::{PacketStream, SourceError, TelemetryPacket, TelemetrySource};

use crate::config::default_max_line_bytes;

/// Live feed client: newline-delimited JSON packets over TCP.
///
/// The feed is expected to run forever, so upstream EOF is reported as
/// [`SourceError::Closed`]. Строки читаются как байты: не-UTF-8 мусор и
/// строки длиннее `max_line_bytes` становятся bad packet, а не обрывом.
pub struct FeedSource {
    addr: String,
    max_line_bytes: usize,
}

impl FeedSource {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_line_bytes: default_max_line_bytes(),
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }
}

impl TelemetrySource for FeedSource {
    fn name(&self) -> &str {
        "feed"
    }

    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PacketStream>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| SourceError::Connect {
                    addr: self.addr.clone(),
                    source: e,
                })?;
            tracing::info!(source = "feed", addr = %self.addr, "connected");
            Ok(Box::new(FeedStream {
                reader: BufReader::new(stream),
                buf: Vec::new(),
                max_line_bytes: self.max_line_bytes,
            }) as Box<dyn PacketStream>)
        })
    }
}

struct FeedStream {
    reader: BufReader<TcpStream>,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl FeedStream {
    /// Прочитать одну строку, но не больше `max_line_bytes + 1` байт.
    /// `Ok(false)` на EOF без данных.
    async fn read_line(&mut self) -> std::io::Result<bool> {
        self.buf.clear();
        let limit = (self.max_line_bytes as u64).saturating_add(1);
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        Ok(n > 0)
    }

    /// Отбросить остаток слишком длинной строки, включая `\n`.
    async fn discard_rest_of_line(&mut self) -> std::io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            let newline = available.iter().position(|&b| b == b'\n');
            let len = available.len();
            match newline {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => self.reader.consume(len),
            }
        }
    }
}

impl PacketStream for FeedStream {
    fn next_packet(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<TelemetryPacket, SourceError>>> + Send + '_>> {
        Box::pin(async move {
            loop {
                match self.read_line().await {
                    Ok(true) => {}
                    Ok(false) => return Some(Err(SourceError::Closed)),
                    Err(e) => return Some(Err(SourceError::Io(e))),
                }

                if !self.buf.ends_with(b"\n") && self.buf.len() > self.max_line_bytes {
                    if let Err(e) = self.discard_rest_of_line().await {
                        return Some(Err(SourceError::Io(e)));
                    }
                    return Some(Err(SourceError::Oversized {
                        limit: self.max_line_bytes,
                    }));
                }

                let line = self.buf.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                return Some(
                    serde_json::from_slice::<serde_json::Value>(line)
                        .map(TelemetryPacket::new)
                        .map_err(SourceError::from),
                );
            }
        })
    }
}
