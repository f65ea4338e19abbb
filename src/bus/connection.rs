//! Connection manager
//!
//! Owns the single broker session of the process:
//! - `initialize` validates the broker url and spawns the connection loop;
//!   calling it again while a session exists returns the existing handle
//! - the loop connects, authenticates, subscribes the registry and then
//!   pumps inbound packets into the dispatcher and outbound publishes onto
//!   the wire
//! - on any loss it flips `connected` to false, emits lifecycle events and
//!   retries after a fixed interval until `teardown`
//!
//! Concurrency notes:
//! - All network I/O happens on the spawned loop task; publishers hand work
//!   over through an unbounded channel.
//! - The dispatcher lock is held only for the synchronous dispatch of one
//!   message, never across an `.await`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::dispatcher::{self, Dispatcher, SharedDispatcher};
use super::events::BusEvent;
use super::limiter::TopicRateLimiter;
use super::publisher::{Outbound, Publisher};
use super::registry::SubscriptionRegistry;
use crate::config::Settings;
use crate::protocol::{
    Connect, ConnectReturnCode, Packet, Publish, QoS, SubAck, SubscribeReturnCode,
};
use crate::transport::{Connector, Transport};
use crate::utils::error::{BusError, ConnectionError};

const EVENT_CAPACITY: usize = 64;

/// MQTT treats a keepalive of zero as "no pings"; this period stands in for it.
const IDLE_PING_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest keepalive the CONNECT header can carry.
const MAX_KEEPALIVE: Duration = Duration::from_secs(u16::MAX as u64);

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub broker_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub clean_session: bool,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
    pub keepalive: Duration,
    pub rate_limit_window: Duration,
}

impl ConnectOptions {
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            username: None,
            password: None,
            client_id: random_client_id("alex_dashboard_"),
            clean_session: true,
            connect_timeout: Duration::from_millis(4000),
            reconnect_interval: Duration::from_millis(1000),
            keepalive: Duration::from_secs(60),
            rate_limit_window: TopicRateLimiter::DEFAULT_WINDOW,
        }
    }

    /// Keepalive as sent in CONNECT; longer intervals are capped at the wire limit.
    fn keepalive_secs(&self) -> u16 {
        u16::try_from(self.keepalive.as_secs()).unwrap_or(u16::MAX)
    }

    /// Interval between PINGREQs, never longer than what CONNECT announced.
    pub fn ping_period(&self) -> Duration {
        if self.keepalive.is_zero() {
            IDLE_PING_PERIOD
        } else {
            self.keepalive.min(MAX_KEEPALIVE)
        }
    }

    fn connect_packet(&self) -> Packet {
        Packet::Connect(Connect {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            keep_alive: self.keepalive_secs(),
            clean_session: self.clean_session,
        })
    }
}

impl From<&Settings> for ConnectOptions {
    fn from(settings: &Settings) -> Self {
        let broker = &settings.broker;
        Self {
            broker_url: broker.url.clone(),
            username: broker.username.clone(),
            password: broker.password.clone(),
            client_id: random_client_id(&broker.client_id_prefix),
            clean_session: broker.clean_session,
            connect_timeout: Duration::from_millis(broker.connect_timeout_ms),
            reconnect_interval: Duration::from_millis(broker.reconnect_interval_ms),
            keepalive: Duration::from_secs(broker.keepalive_secs),
            rate_limit_window: Duration::from_millis(settings.client.rate_limit_ms),
        }
    }
}

/// `prefix` followed by eight random hex characters.
pub fn random_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &suffix[..8])
}

pub fn parse_broker_url(raw: &str) -> Result<Url, BusError> {
    let url = Url::parse(raw).map_err(|source| BusError::InvalidBrokerUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(BusError::UnsupportedScheme(other.to_string())),
    }
}

/// Cloneable access to a running session, handed to every feature.
#[derive(Clone, Debug)]
pub struct BusHandle {
    client_id: String,
    publisher: Publisher,
    dispatcher: SharedDispatcher,
    connected: watch::Receiver<bool>,
    events: broadcast::Sender<BusEvent>,
}

impl BusHandle {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn dispatcher(&self) -> &SharedDispatcher {
        &self.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// A receiver that changes whenever the link goes up or down.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Waits until the link is usable; `false` if `limit` elapses first.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut status = self.connected.clone();
        tokio::time::timeout(limit, status.wait_for(|connected| *connected))
            .await
            .is_ok_and(|res| res.is_ok())
    }
}

struct Session {
    handle: BusHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    registry: SubscriptionRegistry,
    dispatcher: SharedDispatcher,
    session: Option<Session>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            registry: SubscriptionRegistry::default(),
            dispatcher: Arc::new(Mutex::new(Dispatcher::default())),
            session: None,
        }
    }

    pub fn with_registry(mut self, registry: SubscriptionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: SharedDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher(&self) -> &SharedDispatcher {
        &self.dispatcher
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Starts the session. A second call while one exists is a no-op that
    /// returns the existing handle.
    pub fn initialize(&mut self, options: ConnectOptions) -> Result<BusHandle, BusError> {
        if let Some(session) = &self.session {
            debug!(
                "connection already initialized as {}; ignoring",
                session.handle.client_id
            );
            return Ok(session.handle.clone());
        }

        let url = parse_broker_url(&options.broker_url)?;

        let (connected_tx, connected_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let limiter = Arc::new(Mutex::new(TopicRateLimiter::new(options.rate_limit_window)));
        let handle = BusHandle {
            client_id: options.client_id.clone(),
            publisher: Publisher::new(outbound_tx, connected_rx.clone(), limiter),
            dispatcher: self.dispatcher.clone(),
            connected: connected_rx,
            events: events_tx.clone(),
        };

        info!(
            "initializing MQTT connection to {} as {}",
            url, options.client_id
        );

        let event_loop = EventLoop {
            connector: self.connector.clone(),
            url,
            options,
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            outbound: outbound_rx,
            connected: connected_tx,
            events: events_tx,
            shutdown: shutdown_rx,
            next_pkid: 0,
            attempt: 0,
        };
        let task = tokio::spawn(event_loop.run());

        self.session = Some(Session {
            handle: handle.clone(),
            shutdown: shutdown_tx,
            task,
        });
        Ok(handle)
    }

    /// Closes the session and waits for the loop to finish. Subsequent calls
    /// are no-ops until the next `initialize`.
    pub async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let _ = session.shutdown.send(true);
        if let Err(e) = session.task.await {
            warn!("connection task ended abnormally: {e}");
        }
        info!("MQTT connection closed");
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.shutdown.send(true);
        }
    }
}

struct EventLoop<C: Connector> {
    connector: Arc<C>,
    url: Url,
    options: ConnectOptions,
    registry: SubscriptionRegistry,
    dispatcher: SharedDispatcher,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    connected: watch::Sender<bool>,
    events: broadcast::Sender<BusEvent>,
    shutdown: watch::Receiver<bool>,
    next_pkid: u16,
    attempt: u32,
}

impl<C: Connector> EventLoop<C> {
    async fn run(mut self) {
        loop {
            match self.session().await {
                Ok(()) => break,
                Err(err) => {
                    if err.is_auth_failure() {
                        error!("MQTT authentication failed: {err}");
                    } else {
                        warn!("MQTT connection error: {err}");
                    }
                    let was_connected = self.connected.send_replace(false);
                    self.emit(BusEvent::Error(err));
                    if was_connected {
                        info!("MQTT offline");
                        self.emit(BusEvent::Disconnected);
                    }
                }
            }

            self.discard_pending();

            self.attempt += 1;
            info!("MQTT reconnecting (attempt {})", self.attempt);
            self.emit(BusEvent::Reconnecting {
                attempt: self.attempt,
            });

            tokio::select! {
                _ = sleep(self.options.reconnect_interval) => {}
                _ = wait_shutdown(&mut self.shutdown) => break,
            }
        }

        if self.connected.send_replace(false) {
            self.emit(BusEvent::Disconnected);
        }
        self.discard_pending();
    }

    /// One connect-serve cycle. `Ok` means shutdown was requested.
    async fn session(&mut self) -> Result<(), ConnectionError> {
        let Some(mut transport) = self.open().await? else {
            return Ok(());
        };
        let result = self.serve(&mut transport).await;
        transport.close().await;
        result
    }

    /// Connects and completes the CONNECT/CONNACK exchange within the
    /// connect timeout. `None` if shutdown was requested meanwhile.
    async fn open(&mut self) -> Result<Option<C::Transport>, ConnectionError> {
        let connector = self.connector.clone();
        let url = self.url.clone();
        let connect = self.options.connect_packet();

        let handshake = async move {
            let mut transport = connector.connect(&url).await?;
            transport.send(connect).await?;
            loop {
                match transport.recv().await? {
                    Some(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Accepted => {
                        return Ok::<_, ConnectionError>(transport);
                    }
                    Some(Packet::ConnAck(ack)) => {
                        return Err(ConnectionError::from_return_code(ack.code));
                    }
                    Some(other) => debug!("ignoring {:?} before CONNACK", other),
                    None => return Err(ConnectionError::ConnectionLost),
                }
            }
        };

        tokio::select! {
            res = tokio::time::timeout(self.options.connect_timeout, handshake) => {
                match res {
                    Ok(transport) => transport.map(Some),
                    Err(_) => Err(ConnectionError::ConnectTimeout),
                }
            }
            _ = wait_shutdown(&mut self.shutdown) => Ok(None),
        }
    }

    async fn serve(&mut self, transport: &mut C::Transport) -> Result<(), ConnectionError> {
        let mut suback_pending = None;
        let subscribe_pkid = self.next_pkid();
        match self.registry.subscribe_packet(subscribe_pkid) {
            Some(packet) => {
                transport.send(packet).await?;
                suback_pending = Some(subscribe_pkid);
            }
            None => self.mark_connected(),
        }

        let suback_deadline = sleep(self.options.connect_timeout);
        tokio::pin!(suback_deadline);

        let ping_period = self.options.ping_period();
        let mut ping = interval_at(Instant::now() + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_pong = false;

        loop {
            let ready = *self.connected.borrow();
            tokio::select! {
                _ = wait_shutdown(&mut self.shutdown) => {
                    let _ = transport.send(Packet::Disconnect).await;
                    return Ok(());
                }
                packet = transport.recv() => {
                    let Some(packet) = packet? else {
                        return Err(ConnectionError::ConnectionLost);
                    };
                    self.handle_packet(transport, packet, &mut suback_pending, &mut awaiting_pong)
                        .await?;
                }
                Some(Outbound::Publish { topic, payload }) = self.outbound.recv(), if ready => {
                    let pkid = self.next_pkid();
                    transport
                        .send(Packet::Publish(Publish::new(
                            topic.clone(),
                            payload.into_bytes(),
                            QoS::AtLeastOnce,
                            pkid,
                        )))
                        .await?;
                    debug!("published to {} (pkid {})", topic, pkid);
                }
                _ = ping.tick() => {
                    if awaiting_pong {
                        return Err(ConnectionError::KeepaliveTimeout);
                    }
                    transport.send(Packet::PingReq).await?;
                    awaiting_pong = true;
                }
                _ = &mut suback_deadline, if suback_pending.is_some() => {
                    warn!("no SUBACK within {:?}; continuing without confirmation", self.options.connect_timeout);
                    suback_pending = None;
                    self.mark_connected();
                }
            }
        }
    }

    async fn handle_packet(
        &mut self,
        transport: &mut C::Transport,
        packet: Packet,
        suback_pending: &mut Option<u16>,
        awaiting_pong: &mut bool,
    ) -> Result<(), ConnectionError> {
        match packet {
            Packet::Publish(publish) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                dispatcher::lock(&self.dispatcher).on_message(&publish.topic, payload);
                if let (QoS::AtLeastOnce, Some(pkid)) = (publish.qos, publish.pkid) {
                    transport.send(Packet::PubAck(pkid)).await?;
                }
            }
            Packet::SubAck(ack) if Some(ack.pkid) == *suback_pending => {
                self.report_suback(&ack);
                *suback_pending = None;
                self.mark_connected();
            }
            Packet::PubAck(pkid) => debug!("PUBACK {}", pkid),
            Packet::PingResp => *awaiting_pong = false,
            Packet::ConnAck(_) => {
                return Err(ConnectionError::Protocol(
                    "CONNACK on an established session".to_string(),
                ));
            }
            other => debug!("ignoring {:?}", other),
        }
        Ok(())
    }

    fn report_suback(&self, ack: &SubAck) {
        let mut failed = 0;
        for (topic, code) in self.registry.topics().iter().zip(&ack.codes) {
            if *code == SubscribeReturnCode::Failure {
                failed += 1;
                warn!("subscription to '{}' was rejected", topic);
            }
        }
        if failed == 0 {
            info!("subscribed to {} topics", self.registry.topics().len());
        } else {
            error!(
                "subscription error: {} of {} topics rejected",
                failed,
                self.registry.topics().len()
            );
        }
    }

    fn mark_connected(&mut self) {
        if !self.connected.send_replace(true) {
            info!("MQTT connected");
            self.attempt = 0;
            self.emit(BusEvent::Connected);
        }
    }

    fn discard_pending(&mut self) {
        while let Ok(Outbound::Publish { topic, .. }) = self.outbound.try_recv() {
            warn!("discarding publish to '{}': connection lost", topic);
        }
    }

    fn emit(&self, event: BusEvent) {
        let _ = self.events.send(event);
    }

    fn next_pkid(&mut self) -> u16 {
        self.next_pkid = self.next_pkid.wrapping_add(1);
        if self.next_pkid == 0 {
            self.next_pkid = 1;
        }
        self.next_pkid
    }
}

/// Resolves once shutdown has been requested or the manager is gone.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
