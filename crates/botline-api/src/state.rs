//! Application state wiring the gateway together.
//!
//! The session manager is generic over its transport and auth store; AppState
//! pins it to the loopback transport and the file-backed credential store.

use std::path::PathBuf;
use std::sync::Arc;

use botline_core::dispatch::BoxDispatcher;
use botline_core::event::EventBus;
use botline_core::session::SessionManager;
use botline_infra::config::load_gateway_config;
use botline_infra::dispatch::WebhookDispatcher;
use botline_infra::filesystem::{FileAuthStore, resolve_data_dir};
use botline_infra::transport::{LoopbackHub, LoopbackTransportFactory};
use botline_types::config::GatewayConfig;

/// Session manager pinned to the infra implementations.
pub type ConcreteManager = SessionManager<LoopbackTransportFactory, FileAuthStore>;

/// Shared state for the CLI and the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConcreteManager>,
    pub hub: LoopbackHub,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load configuration and wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_gateway_config(&data_dir).await;
        Self::build(config, data_dir)
    }

    /// Wire services from an already loaded configuration.
    pub fn build(config: GatewayConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let dispatcher = WebhookDispatcher::from_config(&config.dispatch)?;
        let hub = LoopbackHub::new();

        let manager = SessionManager::new(
            config,
            hub.factory(),
            FileAuthStore::new(&data_dir),
            BoxDispatcher::new(dispatcher),
            EventBus::default(),
        );

        Ok(Self {
            manager: Arc::new(manager),
            hub,
            data_dir,
        })
    }
}
