use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use relay_api::{PacketStream, SourceError, TelemetryPacket, TelemetrySource};

/// Session replay: JSON-lines file, one packet per line, emitted at a
/// fixed interval.
///
/// The whole session is loaded and validated on `open()`, so a missing or
/// corrupt file fails acquisition rather than surfacing halfway through.
pub struct ReplaySource {
    path: String,
    interval: Duration,
    looped: bool,
}

impl ReplaySource {
    pub fn new(path: impl Into<String>, interval: Duration, looped: bool) -> Self {
        Self {
            path: path.into(),
            interval,
            looped,
        }
    }
}

/// Распарсить содержимое файла сессии. Пустые строки пропускаются.
fn parse_session(path: &str, content: &str) -> Result<Vec<TelemetryPacket>, SourceError> {
    let mut packets = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| SourceError::Session(format!("{path}:{}: {e}", i + 1)))?;
        packets.push(TelemetryPacket::new(value));
    }
    if packets.is_empty() {
        return Err(SourceError::Session(format!("session file is empty: {path}")));
    }
    Ok(packets)
}

impl TelemetrySource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PacketStream>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| SourceError::Session(format!("cannot read {}: {e}", self.path)))?;
            let packets = parse_session(&self.path, &content)?;
            tracing::info!(source = "replay", path = %self.path, packets = packets.len(), looped = self.looped, "session loaded");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Ok(Box::new(ReplayStream {
                packets,
                pos: 0,
                looped: self.looped,
                ticker,
            }) as Box<dyn PacketStream>)
        })
    }
}

struct ReplayStream {
    packets: Vec<TelemetryPacket>,
    pos: usize,
    looped: bool,
    ticker: Interval,
}

impl PacketStream for ReplayStream {
    fn next_packet(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<TelemetryPacket, SourceError>>> + Send + '_>> {
        Box::pin(async move {
            if self.pos >= self.packets.len() {
                if !self.looped {
                    return None;
                }
                tracing::debug!(source = "replay", "session restarted");
                self.pos = 0;
            }
            self.ticker.tick().await;
            let packet = self.packets[self.pos].clone();
            self.pos += 1;
            Some(Ok(packet))
        })
    }
}
