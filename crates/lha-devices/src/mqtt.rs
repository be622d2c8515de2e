//! MQTT transport.
//!
//! One broker connection is created at startup and shared by all requests.
//! Commands are published with QoS 1 and the broker's PUBACK is the delivery
//! acknowledgment.
//!
//! ## Acknowledgment correlation
//!
//! `rumqttc` does not hand back the packet id of a publish. It does emit
//! `Outgoing::Publish(pkid)` for every publish it writes, in the order the
//! requests were queued. Each publish therefore registers a waiter in the
//! same critical section that queues the request; the event loop binds the
//! oldest unbound waiter to each new outgoing packet id and resolves it when
//! the matching PUBACK arrives.
//!
//! ```text
//! request A ─┐ queued: [A, B]    Outgoing(7) → A   PubAck(8) → B
//! request B ─┘                   Outgoing(8) → B   PubAck(7) → A
//! ```
//!
//! Packets re-sent after a reconnect keep their packet id, so an outgoing id
//! that is already bound is a retransmission and leaves the queue alone.
//!
//! Packet ids wrap at `max_inflight`. When the next id is still unacknowledged
//! the client parks the new publish and reports `Outgoing::AwaitAck(pkid)`
//! instead. The oldest waiter is parked with it and takes over the id once
//! the earlier PUBACK for that id has been delivered:
//!
//! ```text
//! A → pkid 1 (no PUBACK yet) ... B collides on 1
//! AwaitAck(1)  → B parked        PubAck(1) → A, then B bound to 1
//! Outgoing(1)  → still A's id    PubAck(1) → B
//! ```
//!
//! A parked publish does not survive a lost connection, so its waiter is
//! dropped with it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lha_core::config::MqttSettings;
use lha_core::EncodedCommand;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};
use crate::publisher::{Ack, ConnectionStatus, TransportPublisher};

/// Broker connection options.
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// Pause between failed connection attempts.
    pub reconnect_delay: Duration,
    /// Requests the client can queue while the connection is down.
    pub channel_capacity: usize,
    /// Unacknowledged publishes before packet ids wrap.
    pub max_inflight: u16,
}

impl PublisherOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: format!("lha-relay-{}", Uuid::new_v4()),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(1),
            channel_capacity: 32,
            max_inflight: 100,
        }
    }

    pub fn from_settings(settings: &MqttSettings) -> Self {
        let mut options = Self::new(settings.host.clone(), settings.port);
        if let Some(client_id) = &settings.client_id {
            options.client_id = client_id.clone();
        }
        options.username = settings.username.clone();
        options.password = settings.password.clone();
        options.keep_alive = Duration::from_secs(settings.keep_alive_secs.max(5));
        options
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_inflight(mut self, max_inflight: u16) -> Self {
        self.max_inflight = max_inflight.max(1);
        self
    }

    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_inflight(self.max_inflight.max(1));
        // Brokers accept a username with an empty password.
        if let Some(user) = &self.username {
            options.set_credentials(user, self.password.clone().unwrap_or_default());
        }
        options
    }
}

/// Waiters for broker acknowledgments.
#[derive(Default)]
pub(crate) struct AckTracker {
    state: Mutex<AckState>,
}

#[derive(Default)]
struct AckState {
    /// Queued on the client, packet id not yet known. Oldest first.
    queued: VecDeque<oneshot::Sender<u16>>,
    /// Written to the socket, waiting for PUBACK.
    inflight: HashMap<u16, oneshot::Sender<u16>>,
    /// Parked by the client until the earlier publish holding the same id is acknowledged.
    colliding: HashMap<u16, oneshot::Sender<u16>>,
}

impl AckTracker {
    fn lock(&self) -> std::sync::MutexGuard<'_, AckState> {
        // A panic while holding the lock leaves plain collections behind; keep using them.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a request with `submit` and register its waiter atomically.
    pub(crate) fn submit<E>(
        &self,
        submit: impl FnOnce() -> Result<(), E>,
    ) -> Result<oneshot::Receiver<u16>, E> {
        let mut state = self.lock();
        submit()?;
        let (tx, rx) = oneshot::channel();
        state.queued.push_back(tx);
        Ok(rx)
    }

    /// The client wrote a publish with `pkid`.
    pub(crate) fn bind(&self, pkid: u16) {
        let mut state = self.lock();
        if state.inflight.contains_key(&pkid) {
            if state.colliding.contains_key(&pkid) {
                debug!(category = "mqtt", pkid, "Parked publish written ahead of its predecessor's PUBACK");
            } else {
                debug!(category = "mqtt", pkid, "Retransmitting unacknowledged publish");
            }
            return;
        }
        match state.queued.pop_front() {
            Some(tx) => {
                state.inflight.insert(pkid, tx);
            }
            None => debug!(category = "mqtt", pkid, "Outgoing publish without a waiter"),
        }
    }

    /// The client parked the next publish because `pkid` is still unacknowledged.
    pub(crate) fn collide(&self, pkid: u16) {
        let mut state = self.lock();
        match state.queued.pop_front() {
            Some(tx) => {
                if state.colliding.insert(pkid, tx).is_some() {
                    warn!(category = "mqtt", pkid, "Replaced a parked publish waiter");
                }
            }
            None => debug!(category = "mqtt", pkid, "Packet id collision without a waiter"),
        }
    }

    /// PUBACK for `pkid`. Returns false if nobody was waiting anymore.
    ///
    /// A publish parked on `pkid` becomes the new owner of the id.
    pub(crate) fn acknowledge(&self, pkid: u16) -> bool {
        let tx = {
            let mut state = self.lock();
            let tx = state.inflight.remove(&pkid);
            if let Some(parked) = state.colliding.remove(&pkid) {
                state.inflight.insert(pkid, parked);
            }
            tx
        };
        match tx {
            Some(tx) => tx.send(pkid).is_ok(),
            None => false,
        }
    }

    /// The session was lost; parked publishes are discarded by the client.
    /// Returns how many waiters were dropped.
    pub(crate) fn drop_collisions(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.colliding.len();
        state.colliding.clear();
        dropped
    }

    /// (queued, inflight). Parked publishes count as queued.
    pub(crate) fn pending(&self) -> (usize, usize) {
        let state = self.lock();
        (state.queued.len() + state.colliding.len(), state.inflight.len())
    }
}

/// Publishes `Switch.Toggle` RPCs on a shared broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
    acks: Arc<AckTracker>,
    status: Arc<RwLock<ConnectionStatus>>,
    broker_addr: String,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Create the client and spawn its event loop. Must run inside a Tokio runtime.
    pub fn connect(options: PublisherOptions) -> Self {
        let broker_addr = options.broker_addr();
        let (client, eventloop) = AsyncClient::new(options.mqtt_options(), options.channel_capacity);
        let acks = Arc::new(AckTracker::default());
        let status = Arc::new(RwLock::new(ConnectionStatus::Connecting));

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            acks.clone(),
            status.clone(),
            broker_addr.clone(),
            options.reconnect_delay,
        ));

        info!(
            category = "mqtt",
            broker = %broker_addr,
            client_id = %options.client_id,
            "MQTT publisher started"
        );

        Self {
            client,
            acks,
            status,
            broker_addr,
            event_loop: Mutex::new(Some(handle)),
        }
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }

    /// (queued, inflight) acknowledgment waiters.
    pub fn pending_acks(&self) -> (usize, usize) {
        self.acks.pending()
    }

    fn take_event_loop(&self) -> Option<JoinHandle<()>> {
        self.event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl TransportPublisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, command: &EncodedCommand) -> TransportResult<Ack> {
        let EncodedCommand::Rpc {
            target,
            topic,
            payload,
        } = command
        else {
            return Err(TransportError::Unsupported(format!(
                "pulse command for '{}' on mqtt transport",
                command.target()
            )));
        };

        let started = Instant::now();
        let body = payload.to_bytes();
        let ack = self
            .acks
            .submit(|| {
                self.client
                    .try_publish(topic.as_str(), QoS::AtLeastOnce, false, body)
            })
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        debug!(category = "mqtt", side = %target, topic = %topic, "Toggle queued");

        let pkid = ack.await.map_err(|_| {
            TransportError::Connection("publish dropped before acknowledgment".to_string())
        })?;

        info!(
            category = "mqtt",
            side = %target,
            topic = %topic,
            pkid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Toggle acknowledged by broker"
        );

        Ok(Ack {
            target: target.clone(),
            detail: format!("puback pkid={}", pkid),
            elapsed: started.elapsed(),
        })
    }

    async fn connection_status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    async fn shutdown(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(category = "mqtt", error = %e, "Disconnect request not queued");
        }
        if let Some(handle) = self.take_event_loop() {
            // Give the event loop a moment to flush the DISCONNECT.
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.abort();
        }
        *self.status.write().await = ConnectionStatus::Disconnected;
        info!(category = "mqtt", broker = %self.broker_addr, "MQTT publisher stopped");
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(handle) = self.take_event_loop() {
            handle.abort();
        }
    }
}

/// Drive the connection forever. Lifecycle events are logged and reflected in
/// `status`; they never complete a request.
async fn run_event_loop(
    mut eventloop: EventLoop,
    acks: Arc<AckTracker>,
    status: Arc<RwLock<ConnectionStatus>>,
    broker: String,
    reconnect_delay: Duration,
) {
    let mut failures: u32 = 0;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                failures = 0;
                *status.write().await = ConnectionStatus::Connected;
                info!(category = "mqtt", broker = %broker, code = ?connack.code, "MQTT broker connection acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => acks.bind(pkid),
            Ok(Event::Outgoing(Outgoing::AwaitAck(pkid))) => {
                debug!(category = "mqtt", pkid, "Packet id still in flight, publish parked");
                acks.collide(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(puback))) => {
                if !acks.acknowledge(puback.pkid) {
                    debug!(category = "mqtt", pkid = puback.pkid, "PUBACK after the request gave up");
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                *status.write().await = ConnectionStatus::Disconnected;
                warn!(category = "mqtt", broker = %broker, "MQTT broker closed the session");
            }
            Ok(_) => {}
            Err(e) => {
                failures = failures.saturating_add(1);
                *status.write().await = ConnectionStatus::Disconnected;
                let parked = acks.drop_collisions();
                let (queued, inflight) = acks.pending();
                warn!(
                    category = "mqtt",
                    broker = %broker,
                    attempt = failures,
                    queued,
                    inflight,
                    parked,
                    error = %e,
                    "MQTT connection error, reconnecting"
                );
                tokio::time::sleep(reconnect_delay).await;
                *status.write().await = ConnectionStatus::Connecting;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit_ok(tracker: &AckTracker) -> oneshot::Receiver<u16> {
        tracker.submit(|| Ok::<(), ()>(())).unwrap()
    }

    #[tokio::test]
    async fn test_acks_resolve_their_own_waiters() {
        let tracker = AckTracker::default();
        let a = submit_ok(&tracker);
        let b = submit_ok(&tracker);
        let c = submit_ok(&tracker);

        tracker.bind(7);
        tracker.bind(8);
        tracker.bind(9);
        assert_eq!(tracker.pending(), (0, 3));

        // Out-of-order acknowledgments.
        assert!(tracker.acknowledge(9));
        assert!(tracker.acknowledge(7));
        assert!(tracker.acknowledge(8));

        assert_eq!(a.await.unwrap(), 7);
        assert_eq!(b.await.unwrap(), 8);
        assert_eq!(c.await.unwrap(), 9);
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[tokio::test]
    async fn test_retransmission_keeps_binding() {
        let tracker = AckTracker::default();
        let a = submit_ok(&tracker);
        tracker.bind(1);

        let b = submit_ok(&tracker);
        // Reconnect re-sends pkid 1 before B is written.
        tracker.bind(1);
        assert_eq!(tracker.pending(), (1, 1));
        tracker.bind(2);

        assert!(tracker.acknowledge(2));
        assert!(tracker.acknowledge(1));
        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_packet_id_collision_hands_over_the_id() {
        let tracker = AckTracker::default();
        let a = submit_ok(&tracker);
        tracker.bind(1);

        // Ids 2..=100 went out and were acknowledged; B wraps onto 1.
        let b = submit_ok(&tracker);
        tracker.collide(1);
        assert_eq!(tracker.pending(), (1, 1));

        let c = submit_ok(&tracker);

        // PUBACK(1) for A makes the client write B, reported before the ack.
        tracker.bind(1);
        assert!(tracker.acknowledge(1));
        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(tracker.pending(), (1, 1));

        tracker.bind(2);
        assert!(tracker.acknowledge(1));
        assert!(tracker.acknowledge(2));
        assert_eq!(b.await.unwrap(), 1);
        assert_eq!(c.await.unwrap(), 2);
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[tokio::test]
    async fn test_collision_with_ack_reported_first() {
        let tracker = AckTracker::default();
        let a = submit_ok(&tracker);
        tracker.bind(4);
        let b = submit_ok(&tracker);
        tracker.collide(4);

        assert!(tracker.acknowledge(4));
        tracker.bind(4);
        assert!(tracker.acknowledge(4));

        assert_eq!(a.await.unwrap(), 4);
        assert_eq!(b.await.unwrap(), 4);
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[tokio::test]
    async fn test_lost_session_drops_parked_publish() {
        let tracker = AckTracker::default();
        let a = submit_ok(&tracker);
        tracker.bind(1);
        let b = submit_ok(&tracker);
        tracker.collide(1);

        assert_eq!(tracker.drop_collisions(), 1);
        assert!(b.await.is_err());

        // The retransmitted publish still resolves its own waiter.
        tracker.bind(1);
        assert!(tracker.acknowledge(1));
        assert_eq!(a.await.unwrap(), 1);

        let c = submit_ok(&tracker);
        tracker.bind(2);
        assert!(tracker.acknowledge(2));
        assert_eq!(c.await.unwrap(), 2);
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[test]
    fn test_failed_submit_registers_nothing() {
        let tracker = AckTracker::default();
        let result = tracker.submit(|| Err::<(), _>("queue full"));
        assert_eq!(result.unwrap_err(), "queue full");
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[test]
    fn test_ack_without_waiter() {
        let tracker = AckTracker::default();
        assert!(!tracker.acknowledge(42));

        let rx = submit_ok(&tracker);
        tracker.bind(5);
        drop(rx);
        // Receiver gave up (timed out); the ack is absorbed.
        assert!(!tracker.acknowledge(5));
        assert_eq!(tracker.pending(), (0, 0));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = MqttSettings {
            host: "broker.lan".into(),
            port: 8883,
            username: Some("relay".into()),
            password: Some("pw".into()),
            client_id: None,
            keep_alive_secs: 1,
        };
        let options = PublisherOptions::from_settings(&settings);
        assert_eq!(options.broker_addr(), "broker.lan:8883");
        assert!(options.client_id.starts_with("lha-relay-"));
        assert_eq!(options.keep_alive, Duration::from_secs(5));
        assert_eq!(
            options.mqtt_options().credentials(),
            Some(("relay".to_string(), "pw".to_string()))
        );
    }

    #[test]
    fn test_username_without_password_is_kept() {
        let mut options = PublisherOptions::new("broker.lan", 1883);
        options.username = Some("relay".into());
        assert_eq!(
            options.mqtt_options().credentials(),
            Some(("relay".to_string(), String::new()))
        );

        options.username = None;
        options.password = Some("orphan".into());
        assert_eq!(options.mqtt_options().credentials(), None);
    }

    #[test]
    fn test_max_inflight_never_zero() {
        let options = PublisherOptions::new("broker.lan", 1883).with_max_inflight(0);
        assert_eq!(options.max_inflight, 1);
        assert_eq!(options.mqtt_options().inflight(), 1);
    }
}
