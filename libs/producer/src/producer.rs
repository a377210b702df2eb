use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relay_api::TelemetrySource;
use telemetry_store::TelemetryStore;

use crate::retry::{RetryPolicy, acquire};

/// Why the producer loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerExit {
    /// A finite source ran out of packets.
    Exhausted,
    /// Terminal failure; the message is in the store's `"error"` entry.
    Failed(String),
    /// Shutdown requested.
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════
//  Producer task: source → store.upsert()
// ═══════════════════════════════════════════════════════════════

/// Запустить producer: acquisition (с retry) → цикл next_packet → upsert.
///
/// Любая terminal ошибка записывается в store через `set_error` и
/// завершает задачу. Store при этом не очищается.
pub fn spawn_producer(
    source: Arc<dyn TelemetrySource>,
    store: Arc<TelemetryStore>,
    key_field: String,
    retry: RetryPolicy,
    token: CancellationToken,
) -> JoinHandle<ProducerExit> {
    tokio::spawn(async move {
        let name = source.name().to_string();
        tracing::info!(source = %name, key_field = %key_field, retry = ?retry, "producer starting");

        let exit = tokio::select! {
            exit = run(&*source, &store, &key_field, &retry) => exit,
            _ = token.cancelled() => {
                tracing::info!(source = %name, "producer cancellation requested");
                ProducerExit::Cancelled
            }
        };

        tracing::info!(source = %name, exit = ?exit, "producer stopped");
        exit
    })
}

async fn run(
    source: &dyn TelemetrySource,
    store: &TelemetryStore,
    key_field: &str,
    retry: &RetryPolicy,
) -> ProducerExit {
    let name = source.name();

    let mut stream = match acquire(source, retry).await {
        Ok(stream) => stream,
        Err(msg) => {
            store.set_error(msg.clone()).await;
            return ProducerExit::Failed(msg);
        }
    };

    let mut applied = 0u64;
    let mut dropped = 0u64;

    loop {
        match stream.next_packet().await {
            Some(Ok(packet)) => match packet.car_index(key_field) {
                Some(car) => {
                    store.upsert(car, packet).await;
                    applied += 1;
                    if applied % 1000 == 0 {
                        tracing::debug!(source = %name, applied, dropped, "packet count");
                    }
                }
                None => {
                    dropped += 1;
                    tracing::trace!(source = %name, "packet without car index, dropped");
                }
            },
            Some(Err(e)) if e.is_skippable() => {
                tracing::warn!(source = %name, error = %e, "bad packet, skipping");
            }
            Some(Err(e)) => {
                tracing::error!(source = %name, error = %e, applied, "source failed");
                let msg = e.to_string();
                store.set_error(msg.clone()).await;
                return ProducerExit::Failed(msg);
            }
            None => {
                tracing::info!(source = %name, applied, dropped, "source exhausted");
                return ProducerExit::Exhausted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::sources::{FeedSource, ReplaySource};
    use relay_api::{CarIndex, PacketStream, SourceError, TelemetryPacket};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const KEY: &str = "m_header.m_playerCarIndex";

    type Step = Result<TelemetryPacket, SourceError>;

    /// Yields a fixed script, then either ends or blocks forever.
    struct Scripted {
        steps: Mutex<Option<VecDeque<Step>>>,
        then_block: bool,
    }

    impl Scripted {
        fn new(steps: Vec<Step>, then_block: bool) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(Some(steps.into())),
                then_block,
            })
        }
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
        then_block: bool,
    }

    impl PacketStream for ScriptedStream {
        fn next_packet(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Option<Step>> + Send + '_>> {
            Box::pin(async move {
                match self.steps.pop_front() {
                    Some(step) => Some(step),
                    None if self.then_block => std::future::pending().await,
                    None => None,
                }
            })
        }
    }

    impl TelemetrySource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PacketStream>, SourceError>> + Send + '_>>
        {
            let steps = self.steps.lock().unwrap().take().unwrap_or_default();
            let then_block = self.then_block;
            Box::pin(async move {
                Ok(Box::new(ScriptedStream { steps, then_block }) as Box<dyn PacketStream>)
            })
        }
    }

    fn car(index: u32, speed: u64) -> Step {
        Ok(TelemetryPacket::new(json!({
            "m_header": {"m_playerCarIndex": index},
            "m_carTelemetryData": {"m_speed": speed},
        })))
    }

    fn speed_of(snap: &relay_api::Snapshot, index: u32) -> Option<u64> {
        snap.get(CarIndex(index))
            .and_then(|p| p.as_value()["m_carTelemetryData"]["m_speed"].as_u64())
    }

    fn spawn(source: Arc<dyn TelemetrySource>, store: &Arc<TelemetryStore>) -> JoinHandle<ProducerExit> {
        spawn_producer(
            source,
            store.clone(),
            KEY.to_string(),
            RetryPolicy::Never,
            CancellationToken::new(),
        )
    }

    async fn wait_for<F>(store: &TelemetryStore, mut cond: F)
    where
        F: FnMut(&relay_api::Snapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if cond(&store.snapshot().await) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("store never reached expected state");
    }

    #[tokio::test]
    async fn test_upserts_in_emission_order() {
        let store = Arc::new(TelemetryStore::new());
        let source = Scripted::new(vec![car(1, 300), car(2, 280), car(1, 310)], false);

        let exit = spawn(source, &store).await.unwrap();
        assert_eq!(exit, ProducerExit::Exhausted);

        let snap = store.snapshot().await;
        assert_eq!(speed_of(&snap, 1), Some(310));
        assert_eq!(speed_of(&snap, 2), Some(280));
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_packets_without_car_index_are_dropped() {
        let store = Arc::new(TelemetryStore::new());
        let source = Scripted::new(
            vec![
                car(1, 300),
                Ok(TelemetryPacket::new(json!({"m_carTelemetryData": {"m_speed": 1}}))),
                Ok(TelemetryPacket::new(json!({"m_header": {"m_playerCarIndex": null}}))),
                Ok(TelemetryPacket::new(json!({"m_header": {"m_playerCarIndex": -4}}))),
            ],
            false,
        );

        spawn(source, &store).await.unwrap();

        let status = store.status().await;
        assert_eq!(status.cars, 1);
        assert_eq!(status.updates, 1);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_format_errors_are_skipped() {
        let store = Arc::new(TelemetryStore::new());
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let source = Scripted::new(vec![car(1, 300), Err(bad.into()), car(1, 305)], false);

        assert_eq!(spawn(source, &store).await.unwrap(), ProducerExit::Exhausted);
        let snap = store.snapshot().await;
        assert_eq!(speed_of(&snap, 1), Some(305));
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_terminal_error_keeps_last_data() {
        let store = Arc::new(TelemetryStore::new());
        let source = Scripted::new(
            vec![car(1, 310), Err(SourceError::Closed), car(1, 999)],
            false,
        );

        let exit = spawn(source, &store).await.unwrap();
        assert_eq!(exit, ProducerExit::Failed("connection lost".into()));

        let v = serde_json::to_value(store.snapshot().await).unwrap();
        assert_eq!(
            v,
            json!({
                "1": {"m_header": {"m_playerCarIndex": 1}, "m_carTelemetryData": {"m_speed": 310}},
                "error": "connection lost",
            })
        );
    }

    #[tokio::test]
    async fn test_cancellation_records_no_error() {
        let store = Arc::new(TelemetryStore::new());
        let token = CancellationToken::new();
        let source = Scripted::new(vec![car(3, 200)], true);

        let handle = spawn_producer(source, store.clone(), KEY.into(), RetryPolicy::Never, token.clone());
        wait_for(&store, |s| speed_of(s, 3) == Some(200)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), ProducerExit::Cancelled);
        assert!(store.snapshot().await.error.is_none());
    }

    #[tokio::test]
    async fn test_feed_scenario() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"{\"m_header\":{\"m_playerCarIndex\":1},\"m_carTelemetryData\":{\"m_speed\":300}}\n")
                .await
                .unwrap();
            go_rx.await.unwrap();
            sock.write_all(b"{\"m_header\":{\"m_playerCarIndex\":1},\"m_carTelemetryData\":{\"m_speed\":310}}\n")
                .await
                .unwrap();
            // Dropping the socket kills the feed.
        });

        let store = Arc::new(TelemetryStore::new());
        let handle = spawn(Arc::new(FeedSource::new(addr.to_string())), &store);

        wait_for(&store, |s| speed_of(s, 1) == Some(300)).await;
        assert!(store.snapshot().await.error.is_none());

        go_tx.send(()).unwrap();
        peer.await.unwrap();

        assert_eq!(
            handle.await.unwrap(),
            ProducerExit::Failed("connection lost".into())
        );
        let snap = store.snapshot().await;
        assert_eq!(speed_of(&snap, 1), Some(310));
        assert_eq!(snap.error.as_deref(), Some("connection lost"));
    }

    #[tokio::test]
    async fn test_feed_survives_garbled_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();

        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"{\"m_header\":{\"m_playerCarIndex\":1},\"m_carTelemetryData\":{\"m_speed\":300}}\n")
                .await
                .unwrap();
            sock.write_all(b"\xff\xfe garbage\n").await.unwrap();
            sock.write_all(b"{\"m_header\":{\"m_playerCarIndex\":2},\"m_carTelemetryData\":{\"m_speed\":280}}\n")
                .await
                .unwrap();
            // Keep the connection open until the store has car 2.
            go_rx.await.unwrap();
        });

        let store = Arc::new(TelemetryStore::new());
        let token = CancellationToken::new();
        let handle = spawn_producer(
            Arc::new(FeedSource::new(addr.to_string())),
            store.clone(),
            KEY.to_string(),
            RetryPolicy::Never,
            token.clone(),
        );

        wait_for(&store, |s| speed_of(s, 2) == Some(280)).await;
        let snap = store.snapshot().await;
        assert_eq!(speed_of(&snap, 1), Some(300));
        assert!(snap.error.is_none());

        token.cancel();
        assert_eq!(handle.await.unwrap(), ProducerExit::Cancelled);
        go_tx.send(()).unwrap();
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_feed_records_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(TelemetryStore::new());
        let exit = spawn(Arc::new(FeedSource::new(addr.to_string())), &store)
            .await
            .unwrap();

        let error = store.snapshot().await.error.unwrap();
        assert!(error.starts_with(&format!("connect {addr}")), "{error}");
        assert_eq!(exit, ProducerExit::Failed(error));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_session_records_error() {
        let store = Arc::new(TelemetryStore::new());
        let source = ReplaySource::new("/nonexistent/session.jsonl", Duration::from_millis(1), false);

        let exit = spawn(Arc::new(source), &store).await.unwrap();
        assert!(matches!(exit, ProducerExit::Failed(_)));

        let error = store.snapshot().await.error.unwrap();
        assert!(error.starts_with("session: cannot read /nonexistent/session.jsonl"), "{error}");
    }

    #[tokio::test]
    async fn test_backoff_gives_up_on_dead_feed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(TelemetryStore::new());
        let retry = RetryPolicy::Backoff {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        };
        let exit = spawn_producer(
            Arc::new(FeedSource::new(addr.to_string())),
            store.clone(),
            KEY.into(),
            retry,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(exit, ProducerExit::Failed(_)));
        let error = store.snapshot().await.error.unwrap();
        assert!(error.ends_with("(gave up after 3 attempts)"), "{error}");
    }
}
