//! WebSocket Round-Trip Tests
//!
//! Serves the control router on an ephemeral port and drives it with a
//! real `tokio-tungstenite` client: greeting, subscription acks, pushes,
//! ping/pong and duplicate id refusal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use strategy_gateway::adapters::http::{self, AppState};
use strategy_gateway::ports::telemetry::{NoopTelemetry, Telemetry};
use strategy_gateway::ports::worker::{WorkerExit, WorkerLauncher, WorkerProcess};
use strategy_gateway::usecases::broadcaster::BroadcastRouter;
use strategy_gateway::usecases::connection_registry::ConnectionRegistry;
use strategy_gateway::usecases::lifecycle::StrategyControl;
use strategy_gateway::usecases::orchestrator::ProcessOrchestrator;
use strategy_gateway::usecases::push::PushService;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---- Test Helpers ----

struct SleepyProcess;

#[async_trait::async_trait]
impl WorkerProcess for SleepyProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn terminate(&mut self, _grace: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    fn try_exit(&mut self) -> anyhow::Result<Option<WorkerExit>> {
        Ok(None)
    }
}

struct SleepyLauncher;

#[async_trait::async_trait]
impl WorkerLauncher for SleepyLauncher {
    async fn launch(&self, _id: u32, _port: u16) -> anyhow::Result<Box<dyn WorkerProcess>> {
        Ok(Box::new(SleepyProcess))
    }
}

struct Harness {
    url: String,
    registry: Arc<ConnectionRegistry>,
    push: PushService,
    control: Arc<StrategyControl>,
}

async fn serve() -> Harness {
    let telemetry: Arc<dyn Telemetry> = Arc::new(NoopTelemetry);
    let registry = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(BroadcastRouter::new(
        Arc::clone(&registry),
        Arc::clone(&telemetry),
    ));
    let push = PushService::new(router);
    let orchestrator = Arc::new(ProcessOrchestrator::with_range(
        Arc::new(SleepyLauncher),
        40_000,
        8,
        Duration::from_millis(50),
    ));
    let control = Arc::new(StrategyControl::new(
        orchestrator,
        push.clone(),
        Arc::clone(&telemetry),
    ));
    let state = Arc::new(AppState {
        control: Arc::clone(&control),
        registry: Arc::clone(&registry),
        telemetry,
        client_buffer: 32,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::router(state)).await.unwrap();
    });

    Harness {
        url: format!("ws://{addr}/ws"),
        registry,
        push,
        control,
    }
}

async fn connect(url: &str, client_id: &str) -> Client {
    let (socket, _) = connect_async(format!("{url}?client_id={client_id}"))
        .await
        .unwrap();
    socket
}

/// Next JSON text frame, failing the test after two seconds.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(_) => panic!("connection closed"),
            _ => {}
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

// ---- Round Trips ----

#[tokio::test]
async fn test_greeting_carries_requested_client_id() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "alpha").await;

    let greeting = next_json(&mut client).await;
    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["client_id"], "alpha");
    assert!(harness.registry.is_connected("alpha").await);
}

#[tokio::test]
async fn test_subscribed_client_receives_push() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "beta").await;
    next_json(&mut client).await;

    send_json(&mut client, json!({"type": "subscribe", "topic": "signals"})).await;
    let ack = next_json(&mut client).await;
    assert_eq!(ack, json!({"type": "subscribed", "topic": "signals"}));

    let report = harness.push.push_signal(json!({"symbol": "BTC", "side": "buy"})).await;
    assert_eq!(report.delivered, 1);

    let push = next_json(&mut client).await;
    assert_eq!(push["type"], "signal");
    assert_eq!(push["topic"], "signals");
    assert_eq!(push["data"]["symbol"], "BTC");
}

#[tokio::test]
async fn test_unknown_topic_is_reported() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "gamma").await;
    next_json(&mut client).await;

    send_json(&mut client, json!({"type": "subscribe", "topic": "weather"})).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert!(harness.registry.topics_of("gamma").await.is_empty());
}

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "delta").await;
    next_json(&mut client).await;

    send_json(&mut client, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    send_json(&mut client, json!({"type": "heartbeat"})).await;
    assert_eq!(next_json(&mut client).await["type"], "heartbeat_ack");
}

#[tokio::test]
async fn test_strategy_start_reaches_strategy_observers() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "epsilon").await;
    next_json(&mut client).await;

    send_json(&mut client, json!({"type": "subscribe", "topic": "strategies"})).await;
    next_json(&mut client).await;

    let worker = harness.control.start(3).await.unwrap();
    assert_eq!(worker.port, 40_003);

    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "strategy_status");
    assert_eq!(update["event_type"], "strategy_started");
    assert_eq!(update["data"]["strategy_id"], 3);
    assert_eq!(update["data"]["port"], 40_003);
}

#[tokio::test]
async fn test_duplicate_client_id_refused() {
    let harness = serve().await;
    let mut first = connect(&harness.url, "zeta").await;
    next_json(&mut first).await;

    let mut second = connect(&harness.url, "zeta").await;
    let refusal = next_json(&mut second).await;
    assert_eq!(refusal["type"], "error");

    // The original connection is untouched.
    send_json(&mut first, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut first).await["type"], "pong");
    assert_eq!(harness.registry.connection_count().await, 1);
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let harness = serve().await;
    let mut client = connect(&harness.url, "eta").await;
    next_json(&mut client).await;

    client.close(None).await.unwrap();

    let mut gone = false;
    for _ in 0..50 {
        if !harness.registry.is_connected("eta").await {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gone, "registry still holds a closed client");
}
