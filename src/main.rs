//! Signal Gateway Server
//!
//! REST API server fronting the trading-signal backend.

use signal_gateway::api::create_router;
use signal_gateway::config::Config;
use signal_gateway::state::AppState;
use signal_gateway::tasks::PassthroughParser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use signal_gateway::config::{RouteRuleConfig, RuleConfig};
use signal_gateway::error::{ErrorResponse, RateLimitErrorResponse};
use signal_gateway::models::{
    HealthResponse, RateLimitRulesResponse, ReplaceRateLimitsRequest, SignalStatsResponse,
    SubmitSignalRequest, SubmitSignalResponse,
};
use signal_gateway::tasks::{TaskResult, TaskStatus};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        signal_gateway::api::handlers::health_check,
        signal_gateway::api::handlers::submit_signal,
        signal_gateway::api::handlers::get_task_status,
        signal_gateway::api::handlers::get_signal_stats,
        signal_gateway::api::handlers::get_rate_limits,
        signal_gateway::api::handlers::replace_rate_limits,
    ),
    components(
        schemas(
            HealthResponse,
            SubmitSignalRequest,
            SubmitSignalResponse,
            TaskResult,
            TaskStatus,
            SignalStatsResponse,
            RateLimitRulesResponse,
            ReplaceRateLimitsRequest,
            RuleConfig,
            RouteRuleConfig,
            ErrorResponse,
            RateLimitErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Signals", description = "Asynchronous signal parsing"),
        (name = "Admin", description = "Rate limit administration"),
    ),
    info(
        title = "Signal Gateway API",
        version = "0.1.0",
        description = "Admission control and asynchronous signal parsing",
        license(name = "MIT"),
        contact(name = "Joaquin Bejar", email = "jb@taunais.com")
    )
)]
struct ApiDoc;

/// Loads configuration from `CONFIG_PATH` when set, then applies `HOST` and
/// `PORT` overrides.
fn load_config() -> anyhow::Result<Config> {
    let mut config = match std::env::var("CONFIG_PATH") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            Config::load(&path)?
        }
        Err(_) => Config::default(),
    };

    if let Ok(host) = std::env::var("HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("PORT must be a valid number: {}", e))?;
    }

    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config, Arc::new(PassthroughParser))?);
    state.start();

    info!("Starting Signal Gateway on {}", addr);
    info!("Swagger UI available at http://{}/swagger-ui/", addr);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = create_router(Arc::clone(&state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.shutdown().await;
    info!("Signal Gateway stopped");

    Ok(())
}
