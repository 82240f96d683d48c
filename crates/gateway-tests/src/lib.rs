//! Integration tests for the Signal Gateway API.
//!
//! Each test starts its own server on an ephemeral local port so tests can
//! run in parallel without sharing rate limit buckets or task results.

use gateway_client::{ClientConfig, GatewayClient};
use signal_gateway::api::create_router;
use signal_gateway::config::Config;
use signal_gateway::state::AppState;
use signal_gateway::tasks::{PassthroughParser, SignalParser};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running in-process gateway.
pub struct TestServer {
    /// Base URL of the server.
    pub base_url: String,
    /// Shared state, for inspecting the server from tests.
    pub state: Arc<AppState>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Creates a client for this server.
    ///
    /// # Errors
    /// Returns error if client creation fails.
    pub fn client(&self) -> Result<GatewayClient, gateway_client::Error> {
        self.client_with_key(None)
    }

    /// Creates a client that sends `api_key` with every request.
    ///
    /// # Errors
    /// Returns error if client creation fails.
    pub fn client_with_key(
        &self,
        api_key: Option<&str>,
    ) -> Result<GatewayClient, gateway_client::Error> {
        GatewayClient::new(ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(10),
            api_key: api_key.map(str::to_string),
        })
    }

    /// Stops the task processor and the HTTP server.
    pub async fn shutdown(self) {
        self.state.shutdown().await;
        self.handle.abort();
    }
}

/// Test configuration: fast worker polling, default rules.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tasks.poll_interval_ms = 10;
    config
}

/// Starts a server with the passthrough parser.
///
/// # Errors
/// Returns error if the configuration is invalid or the port cannot be bound.
pub async fn spawn_server(config: Config) -> std::io::Result<TestServer> {
    spawn_server_with_parser(config, Arc::new(PassthroughParser)).await
}

/// Starts a server with a custom parser.
///
/// # Errors
/// Returns error if the configuration is invalid or the port cannot be bound.
pub async fn spawn_server_with_parser(
    config: Config,
    parser: Arc<dyn SignalParser>,
) -> std::io::Result<TestServer> {
    let state = AppState::from_config(config, parser)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let state = Arc::new(state);
    state.start();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(Arc::clone(&state));

    let handle = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    Ok(TestServer {
        base_url: format!("http://{}", addr),
        state,
        handle,
    })
}

/// Generates a unique task id to avoid conflicts between tests.
#[must_use]
pub fn unique_id(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{}_{}_{}", prefix, ts, counter)
}
