//! Relay web server.
//!
//! Builds the transport for the configured mode once at startup, wires the
//! dispatcher and middleware into a router, and serves it until Ctrl+C or
//! SIGTERM. The bus connection is released after the listener stops.

pub mod middleware;
pub mod router;
pub mod types;

pub use middleware::{auth_middleware, global_rate_limit_middleware, toggle_rate_limit_middleware};
pub use router::create_router;
pub use types::{ServerState, MAX_REQUEST_BODY_SIZE};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lha_core::{CommandEncoder, RelayConfig, TargetRegistry, TransportMode};
use lha_devices::{HttpPublisher, MqttPublisher, PublisherOptions, TransportPublisher};

use crate::dispatch::CommandDispatcher;
use crate::startup::StartupLogger;

/// Interval between rate limiter prunes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Create the publisher for the configured transport. Must run inside a Tokio runtime.
pub fn build_publisher(config: &RelayConfig) -> anyhow::Result<Arc<dyn TransportPublisher>> {
    let transport = &config.transport;
    let publisher: Arc<dyn TransportPublisher> = match transport.mode {
        TransportMode::Mqtt => Arc::new(MqttPublisher::connect(PublisherOptions::from_settings(
            &transport.mqtt,
        ))),
        TransportMode::Http => Arc::new(
            HttpPublisher::new(transport.timeout()).context("Failed to create HTTP transport")?,
        ),
    };
    Ok(publisher)
}

/// Assemble the server state around an existing publisher.
pub fn build_state(
    config: RelayConfig,
    publisher: Arc<dyn TransportPublisher>,
) -> anyhow::Result<ServerState> {
    let registry = TargetRegistry::from_config(&config).context("Invalid target registry")?;
    let encoder = CommandEncoder::from_config(&config.transport);
    let dispatcher = CommandDispatcher::new(registry, encoder, publisher, config.transport.timeout());
    Ok(ServerState::new(Arc::new(config), Arc::new(dispatcher)))
}

/// Start the relay and block until shutdown.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let mut startup = StartupLogger::new();
    startup.banner();

    startup.phase_config();
    startup.info(&format!("Transport mode: {}", config.transport.mode.as_str()));
    startup.detail(&format!("Timeout: {} ms", config.transport.timeout_ms));
    startup.detail(&format!(
        "Budgets: {}/{}s global, {}/{}s toggle",
        config.rate_limit.global.max_requests,
        config.rate_limit.global.window_secs,
        config.rate_limit.toggle.max_requests,
        config.rate_limit.toggle.window_secs,
    ));
    if config.server.trust_forwarded_for {
        startup.warning("Client identity taken from X-Forwarded-For");
    }

    startup.phase_transport();
    let publisher = build_publisher(&config)?;
    match config.transport.mode {
        TransportMode::Mqtt => startup.success(&format!(
            "MQTT client for {}",
            config.transport.mqtt.broker_addr()
        )),
        TransportMode::Http => startup.success("Direct HTTP client"),
    }

    let state = build_state(config, publisher.clone())?;
    for (name, address) in state.dispatcher.registry().iter() {
        startup.detail(&format!("{} -> {}", name, address));
    }

    for limiter in [state.global_limiter.clone(), state.toggle_limiter.clone()] {
        tokio::spawn(crate::rate_limit::cleanup_task(limiter, CLEANUP_INTERVAL));
    }

    let started_at = state.started_at;
    let bind_addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    let bind = listener.local_addr()?;
    let lan = crate::network::lan_url_host(&state.config.server.host, bind.port());
    let app = create_router(state);

    startup.ready_info(&bind.to_string(), lan.as_deref());
    tracing::info!(bind = %bind, "Relay listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(crate::shutdown::shutdown_signal())
        .await
        .context("Server error")?;

    crate::shutdown::release_transport(publisher.as_ref(), started_at).await;
    Ok(())
}
