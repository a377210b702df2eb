use std::collections::BTreeMap;

use tokio::sync::RwLock;

use relay_api::{CarIndex, Snapshot, StoreStatus, TelemetryPacket, now_ms};

// ═══════════════════════════════════════════════════════════════
//  Inner state
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Inner {
    cars: BTreeMap<CarIndex, TelemetryPacket>,
    error: Option<String>,
    updates: u64,
    last_update_ms: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════
//  TelemetryStore
// ═══════════════════════════════════════════════════════════════

/// Последний пакет телеметрии по каждой машине.
///
/// Один writer (producer), сколько угодно readers (HTTP/WS запросы).
/// Все поля под одним RwLock: upsert берёт write, snapshot/status берут
/// read ровно на время копирования. Lock никогда не держится через
/// I/O или сериализацию: медленный клиент не тормозит producer.
///
/// Создаётся один раз при старте и передаётся как `Arc<TelemetryStore>`.
pub struct TelemetryStore {
    inner: RwLock<Inner>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    /// Empty store. Entries appear lazily with the first packet per car.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or replace the packet for `car`.
    pub async fn upsert(&self, car: CarIndex, packet: TelemetryPacket) {
        let ts = now_ms();
        let mut inner = self.inner.write().await;
        inner.cars.insert(car, packet);
        inner.updates += 1;
        inner.last_update_ms = Some(ts);
    }

    /// Consistent copy of the whole store.
    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().await;
        Snapshot {
            cars: inner.cars.clone(),
            error: inner.error.clone(),
        }
    }

    /// Record a producer failure under the `"error"` key.
    ///
    /// Never cleared; a later call replaces the message. Car data is kept.
    pub async fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "producer error recorded");
        let mut inner = self.inner.write().await;
        inner.error = Some(message);
    }

    pub async fn status(&self) -> StoreStatus {
        let inner = self.inner.read().await;
        StoreStatus {
            cars: inner.cars.len(),
            updates: inner.updates,
            last_update_ms: inner.last_update_ms,
            error: inner.error.clone(),
        }
    }

    /// Number of cars currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.cars.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.cars.is_empty()
    }
}
