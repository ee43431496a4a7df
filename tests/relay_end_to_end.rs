//! End-to-end tests over real TCP sockets

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use telemetry_relay::client::{AgentClient, SubscriberClient};
use telemetry_relay::protocol::{Endpoint, Frame, FrameCodec};
use telemetry_relay::{Broadcaster, Error, MetricSample, RelayServer, ServerConfig, WorkloadMetrics};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

struct TestRelay {
    addr: std::net::SocketAddr,
    server: Arc<RelayServer>,
    stop: CancellationToken,
    handle: JoinHandle<telemetry_relay::Result<()>>,
}

impl TestRelay {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(config));
        let stop = CancellationToken::new();

        let handle = {
            let server = Arc::clone(&server);
            let stop = stop.clone();
            tokio::spawn(async move { server.serve(listener, async move { stop.cancelled().await }).await })
        };

        Self {
            addr,
            server,
            stop,
            handle,
        }
    }

    fn broadcaster(&self) -> &Arc<Broadcaster> {
        self.server.broadcaster()
    }

    async fn wait_for_subscribers(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.broadcaster().subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count not reached");
    }

    async fn shutdown(self) {
        self.stop.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

fn sample(host: &str, seq: u64) -> MetricSample {
    MetricSample::new(host, seq)
        .with_workload(WorkloadMetrics::new("api", "prod", 120.0, 256 << 20))
        .with_workload(WorkloadMetrics::new("db", "prod", 900.0, 2 << 30))
}

async fn next(subscriber: &mut SubscriberClient) -> MetricSample {
    tokio::time::timeout(Duration::from_secs(5), subscriber.next_sample())
        .await
        .expect("timed out waiting for sample")
        .unwrap()
        .expect("stream ended")
}

#[tokio::test]
async fn agent_samples_reach_every_subscriber_in_order() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let mut first = SubscriberClient::connect(relay.addr).await.unwrap();
    let mut second = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(2).await;

    let mut agent = AgentClient::connect(relay.addr).await.unwrap();
    for seq in 1..=5 {
        agent.send(&sample("node-a", seq)).await.unwrap();
    }
    agent.finish().await.unwrap();

    for subscriber in [&mut first, &mut second] {
        for seq in 1..=5 {
            assert_eq!(next(subscriber).await, sample("node-a", seq));
        }
    }

    assert_eq!(relay.broadcaster().stats().broadcasts, 5);
    relay.shutdown().await;
}

#[tokio::test]
async fn subscriber_hangup_unregisters() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let subscriber = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(1).await;

    subscriber.close().await.unwrap();
    relay.wait_for_subscribers(0).await;

    assert_eq!(relay.broadcaster().stats().unregistered, 1);
    relay.shutdown().await;
}

#[tokio::test]
async fn agents_are_independent() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let mut subscriber = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(1).await;

    // An agent that vanishes mid-stream gets no ack and affects nobody else
    let mut broken = AgentClient::connect(relay.addr).await.unwrap();
    broken.send(&sample("node-broken", 1)).await.unwrap();
    drop(broken);

    assert_eq!(next(&mut subscriber).await.host, "node-broken");

    let mut healthy = AgentClient::connect(relay.addr).await.unwrap();
    healthy.send(&sample("node-ok", 1)).await.unwrap();
    healthy.finish().await.unwrap();

    assert_eq!(next(&mut subscriber).await.host, "node-ok");
    assert_eq!(relay.broadcaster().subscriber_count(), 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn late_subscriber_gets_no_replay() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let mut agent = AgentClient::connect(relay.addr).await.unwrap();
    agent.send(&sample("node-a", 1)).await.unwrap();
    agent.finish().await.unwrap();

    let mut subscriber = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(1).await;

    let mut agent = AgentClient::connect(relay.addr).await.unwrap();
    agent.send(&sample("node-a", 2)).await.unwrap();
    agent.finish().await.unwrap();

    assert_eq!(next(&mut subscriber).await.timestamp_ms, 2);
    relay.shutdown().await;
}

#[tokio::test]
async fn shutdown_ends_subscriptions() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let mut subscriber = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(1).await;

    let broadcaster = Arc::clone(relay.broadcaster());
    relay.shutdown().await;

    let end = tokio::time::timeout(Duration::from_secs(5), subscriber.next_sample())
        .await
        .unwrap();
    assert!(matches!(end, Ok(None) | Err(Error::Io(_))));

    tokio::time::timeout(Duration::from_secs(5), async {
        while broadcaster.subscriber_count() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let relay = TestRelay::start(ServerConfig::default().max_connections(1)).await;

    let _subscriber = SubscriberClient::connect(relay.addr).await.unwrap();
    relay.wait_for_subscribers(1).await;

    let mut extra = SubscriberClient::connect(relay.addr).await.unwrap();
    let result = extra.next_sample().await;
    assert!(matches!(
        result,
        Err(Error::Protocol(telemetry_relay::error::ProtocolError::Rejected(_)))
    ));

    relay.shutdown().await;
}

#[tokio::test]
async fn raw_protocol_ack_exactly_once() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let socket = TcpStream::connect(relay.addr).await.unwrap();
    let mut framed = Framed::new(socket, FrameCodec::new());

    framed.send(Frame::call(Endpoint::SendMetrics)).await.unwrap();
    framed.send(Frame::EndOfStream).await.unwrap();

    assert_eq!(framed.next().await.unwrap().unwrap(), Frame::Ack);
    // Relay closes the stream after the single ack
    assert!(framed.next().await.is_none());

    relay.shutdown().await;
}
