//! Test server harness for E2E testing
//!
//! Provides `TestRcServer` for spawning the Room Controller router on a
//! random local port.

use metrics_exporter_prometheus::PrometheusBuilder;
use room_controller::config::Config;
use room_controller::repositories::{DocumentStore, InMemoryDocumentStore};
use room_controller::routes::{self, AppState};
use room_controller::services::RoomCoordinator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Room Controller server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestRcServer::spawn_in_memory().await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRcServer {
    addr: SocketAddr,
    coordinator: Arc<RoomCoordinator>,
    config: Config,
    handle: JoinHandle<()>,
}

impl TestRcServer {
    /// Spawn a server over a fresh `InMemoryDocumentStore`.
    pub async fn spawn_in_memory() -> Result<Self, anyhow::Error> {
        Self::spawn(Arc::new(InMemoryDocumentStore::new())).await
    }

    /// Spawn a server over `store`.
    ///
    /// The server binds to 127.0.0.1:0 and runs in a background task that
    /// is aborted on drop. Metrics are rendered from a recorder that is not
    /// installed globally, so several servers can run in one process.
    pub async fn spawn(store: Arc<dyn DocumentStore>) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let coordinator = Arc::new(RoomCoordinator::from_config(store, &config));
        coordinator
            .prepare_store()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to prepare store: {}", e))?;

        let state = Arc::new(AppState {
            coordinator: Arc::clone(&coordinator),
        });
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            coordinator,
            config,
            handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Coordinator shared with the running server.
    pub fn coordinator(&self) -> &RoomCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestRcServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestRcServer::spawn_in_memory().await?;
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let server1 = TestRcServer::spawn_in_memory().await?;
        let server2 = TestRcServer::spawn_in_memory().await?;

        assert_ne!(server1.addr(), server2.addr());
        assert!(server1.addr().ip().is_loopback());
        assert_eq!(server1.config().bind_address, "127.0.0.1:0");

        Ok(())
    }
}
