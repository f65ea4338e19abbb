use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use alexbus::audit;
use alexbus::bus::dispatcher::{self, SharedDispatcher};
use alexbus::bus::{
    BusEvent, BusHandle, ConnectOptions, ConnectionManager, Dispatcher, InboundEvent,
    SubscriptionRegistry,
};
use alexbus::config::{self, Settings};
use alexbus::features::integrations::LogOpener;
use alexbus::features::{self, Features, Poller};
use alexbus::health::{HealthProbe, SystemHealth, spawn_health_poller};
use alexbus::persistence::{SnapshotStore, record_into};
use alexbus::topics::{self, ControlWord};
use alexbus::transport::WsConnector;
use alexbus::utils::logging;

/// How long one-shot commands wait for the broker.
const LINK_WAIT: Duration = Duration::from_secs(10);
const PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "alexbus")]
#[command(version, about = "Message-bus client for the Alex assistant dashboard")]
struct Cli {
    /// Configuration file (defaults to config/default.* when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, attach every feature and log state changes until Ctrl-C
    Watch,

    /// Subscribe to every topic and log the raw traffic
    Monitor,

    /// Publish one message and exit
    Publish {
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        message: String,
    },

    /// Send every catalogue request and report which ones the agent answers
    Audit {
        /// Seconds to wait for answers
        #[arg(long, default_value = "15")]
        timeout_secs: u64,
    },

    /// Probe the agent bridge health endpoint once
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("failed to load configuration: {e}");
            return Err(e.into());
        }
    };
    logging::init(&settings.log_level);

    let result = match cli.command {
        Commands::Watch => watch(&settings).await,
        Commands::Monitor => monitor(&settings).await,
        Commands::Publish { topic, message } => publish(&settings, &topic, message).await,
        Commands::Audit { timeout_secs } => {
            run_audit(&settings, Duration::from_secs(timeout_secs)).await
        }
        Commands::Health => health(&settings).await,
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}

async fn watch(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let dispatcher = Dispatcher::shared(settings.client.debug_log_capacity);

    if let Some(path) = &settings.persistence.snapshot_path {
        let ttl = Duration::from_secs(settings.persistence.snapshot_ttl_secs);
        let store = SnapshotStore::open(path, ttl)?;
        let restored = store.restore_into(&dispatcher)?;
        info!("restored {} cached topics from {}", restored, path);
        record_into(store, &dispatcher);
    }

    let features = Features::new(Box::new(LogOpener));
    features.attach(&dispatcher);
    log_state_changes(&features, &dispatcher);

    let mut manager = ConnectionManager::new(WsConnector).with_dispatcher(dispatcher);
    let handle = manager.initialize(ConnectOptions::from(settings))?;
    let publisher = handle.publisher();

    let _heartbeat = Poller::spawn(
        publisher.clone(),
        topics::AGENT_STATE_REQUEST,
        ControlWord::Ping,
        Duration::from_secs(settings.polling.heartbeat_secs),
    );
    let _dashboard = Poller::spawn(
        publisher.clone(),
        topics::DASHBOARD_REQUEST,
        ControlWord::Get,
        Duration::from_secs(settings.polling.dashboard_secs),
    );

    let probe = HealthProbe::new(
        settings.health.url.clone(),
        Duration::from_millis(settings.health.timeout_ms),
    )?;
    let (mut system, health_task) =
        spawn_health_poller(probe, Duration::from_secs(settings.health.interval_secs));

    let mut events = handle.events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }
            Ok(()) = system.changed() => {
                if let SystemHealth::Online(report) = &*system.borrow() {
                    info!(
                        "bridge {} (mqtt {}, agent {}, up {})",
                        report.status,
                        report.mqtt_connected,
                        report.agent_running,
                        report.uptime()
                    );
                }
            }
            event = events.recv() => match event {
                Ok(BusEvent::Connected) => request_snapshot(&features, &handle),
                Ok(BusEvent::Error(e)) => warn!("bus error: {e}"),
                Ok(other) => debug!("bus event {:?}", other),
                Err(RecvError::Lagged(n)) => warn!("missed {} bus events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    health_task.abort();
    manager.teardown().await;
    Ok(())
}

/// The one-shot requests that refresh everything not covered by a poller.
fn request_snapshot(features: &Features, handle: &BusHandle) {
    let publisher = handle.publisher();
    features::lock(&features.monitor).request_battery(publisher);
    features::lock(&features.memory).request_stats(publisher);
    features::lock(&features.timeline).request(publisher);
    features::lock(&features.voice).request_voices(publisher);
}

/// Logs derived state after the owning feature has applied each message.
fn log_state_changes(features: &Features, dispatcher: &SharedDispatcher) {
    let features = features.clone();
    dispatcher::lock(dispatcher).observe_all(move |event| match event.topic.as_str() {
        topics::AGENT_STATE => {
            let monitor = features::lock(&features.monitor);
            info!("agent active: {}", monitor.is_agent_active());
        }
        topics::AGENT_STATUS => {
            if let Some(feedback) = features::lock(&features.monitor).agent_feedback() {
                info!("agent says: {feedback}");
            }
        }
        topics::NOTE_STATUS | topics::NOTE_RESULT => {
            let notes = features::lock(&features.notes);
            info!(
                "notes {} ({:.0}%), {} recordings",
                notes.status().as_str(),
                notes.progress(),
                notes.recordings().len()
            );
        }
        topics::DASHBOARD_RESPONSE => {
            let dashboard = features::lock(&features.dashboard);
            if let Some(weather) = dashboard.weather() {
                match weather.temp_c {
                    Some(temp) => info!("weather in {}: {:.1}C", weather.location, temp),
                    None => info!("weather in {}: --", weather.location),
                }
            }
        }
        topics::AUTH_RESPONSE => {
            let integrations = features::lock(&features.integrations);
            match integrations.last_error() {
                Some(err) => warn!("integration sign-in failed: {err}"),
                None => info!("integrations: {:?}", integrations.connections()),
            }
        }
        topics::MEMORY_STATS_RESPONSE => {
            if let Some(stats) = features::lock(&features.memory).stats() {
                info!(
                    "memory: {} activities, {} in the last day",
                    stats.total,
                    stats.last_24h.unwrap_or_default()
                );
            }
        }
        topics::HISTORY_RESPONSE => {
            info!("timeline: {} items", features::lock(&features.timeline).items().len());
        }
        topics::VOICE_LIST_RESPONSE | topics::VOICE_STATUS => {
            let voice = features::lock(&features.voice);
            info!("voice: {:?} of {}", voice.current_voice(), voice.voices().len());
        }
        topics::TOPICS_CURRENT => {
            if let Some(topic) = features::lock(&features.insights).topic() {
                info!("conversation topic: {}", topic.domain);
            }
        }
        _ => debug!("{} <- {}", event.topic, event.preview(80)),
    });
}

async fn monitor(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let dispatcher = Dispatcher::shared(settings.client.debug_log_capacity);
    dispatcher::lock(&dispatcher).observe_all(|event| info!("{}", render(event)));

    let mut manager = ConnectionManager::new(WsConnector)
        .with_registry(SubscriptionRegistry::new(["#"]))
        .with_dispatcher(dispatcher);
    manager.initialize(ConnectOptions::from(settings))?;

    tokio::signal::ctrl_c().await?;
    manager.teardown().await;
    Ok(())
}

fn render(event: &InboundEvent) -> String {
    match serde_json::from_str::<serde_json::Value>(&event.payload)
        .and_then(|value| serde_json::to_string_pretty(&value))
    {
        Ok(pretty) => format!("[{}]\n{}", event.topic, pretty),
        Err(_) => format!("[{}] {}", event.topic, event.preview(PREVIEW_CHARS)),
    }
}

async fn publish(settings: &Settings, topic: &str, message: String) -> Result<(), Box<dyn Error>> {
    let mut manager = ConnectionManager::new(WsConnector)
        .with_registry(SubscriptionRegistry::new(Vec::<String>::new()));
    let handle = manager.initialize(ConnectOptions::from(settings))?;

    if !handle.wait_connected(LINK_WAIT).await {
        manager.teardown().await;
        return Err(format!("broker not reachable within {LINK_WAIT:?}").into());
    }
    handle.publisher().publish(topic, message);
    info!("published to {}", topic);

    // Let the loop put the message on the wire before DISCONNECT.
    tokio::time::sleep(Duration::from_millis(500)).await;
    manager.teardown().await;
    Ok(())
}

async fn run_audit(settings: &Settings, limit: Duration) -> Result<(), Box<dyn Error>> {
    let mut options = ConnectOptions::from(settings);
    options.client_id = alexbus::bus::connection::random_client_id("alex_auditor_");

    let mut manager = ConnectionManager::new(WsConnector);
    let handle = manager.initialize(options)?;

    let connected = handle.wait_connected(LINK_WAIT).await;
    let mut report = serde_json::Map::new();
    report.insert("connection".to_string(), connected.into());
    if connected {
        for (name, verdict) in audit::run(&handle, audit::PROBES, limit).await {
            report.insert(name.to_string(), verdict.to_string().into());
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    manager.teardown().await;
    Ok(())
}

async fn health(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let probe = HealthProbe::new(
        settings.health.url.clone(),
        Duration::from_millis(settings.health.timeout_ms),
    )?;
    match probe.check().await {
        SystemHealth::Online(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        SystemHealth::Offline => println!("offline"),
    }
    Ok(())
}
