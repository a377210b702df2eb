mod error;
mod types;
mod util;

use std::future::Future;
use std::pin::Pin;

pub use error::{ErrorKind, SourceError};
pub use types::{CarIndex, ERROR_KEY, Snapshot, StoreStatus, TelemetryPacket};
pub use util::{now_ms, resolve_path};

// ════════════════════════════════════════════════════════════════
//  Source Traits
// ════════════════════════════════════════════════════════════════

/// Открытый поток пакетов от upstream источника.
///
/// Реализуется каждым source'ом (feed, replay, simulate). Producer
/// вызывает `next_packet()` в цикле и пишет результат в store.
pub trait PacketStream: Send {
    /// Следующий пакет.
    ///
    /// - `Some(Ok(packet))`: очередной пакет
    /// - `Some(Err(e))`: ошибка; `e.is_skippable()` решает, продолжать ли
    /// - `None`: конечный источник исчерпан
    fn next_packet(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<TelemetryPacket, SourceError>>> + Send + '_>>;
}

/// Upstream telemetry source: live feed, session replay, or a synthetic
/// generator. Only the capability to yield packets matters to the relay.
pub trait TelemetrySource: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Acquisition step: connect to the feed or load the session.
    ///
    /// Errors here are subject to the producer's retry policy.
    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PacketStream>, SourceError>> + Send + '_>>;
}
