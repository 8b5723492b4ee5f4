//! Application state wiring the session hub to its infrastructure.
//!
//! AppState holds the single `SessionHub` used by both CLI commands and REST
//! API handlers, pinned to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use tether_core::remote::BoxChatBackend;
use tether_core::session::SessionHub;
use tether_core::storage::BoxKvStore;
use tether_infra::config::{load_config, resolve_data_dir};
use tether_infra::crypto::hash::Sha256ContentHasher;
use tether_infra::remote::HttpChatBackend;
use tether_infra::sqlite::pool::database_url;
use tether_infra::sqlite::{DatabasePool, SqliteKvStore};
use tether_types::config::TetherConfig;
use tokio_util::sync::CancellationToken;

/// Shared application state.
///
/// Cloning is cheap; every clone points at the same hub and shutdown token.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub data_dir: PathBuf,
    /// Parent of every observer token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state: load config, open the DB, wire the hub.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;

        let kv = if config.summary.persist {
            let db_url = format!("{}?mode=rwc", database_url(&data_dir));
            let pool = DatabasePool::new(&db_url).await?;
            Some(BoxKvStore::new(SqliteKvStore::new(pool)))
        } else {
            None
        };

        let backend = BoxChatBackend::new(HttpChatBackend::new(&config.remote)?);
        let hub = SessionHub::new(config, backend, Arc::new(Sha256ContentHasher::new()), kv);

        let restored = hub.restore().await;
        tracing::debug!(restored, "summary cache restored");

        Ok(Self::from_hub(hub, data_dir))
    }

    pub fn from_hub(hub: Arc<SessionHub>, data_dir: PathBuf) -> Self {
        Self {
            hub,
            data_dir,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &TetherConfig {
        self.hub.config()
    }
}
