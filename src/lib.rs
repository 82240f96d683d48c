//! # Signal Gateway - Admission Control and Asynchronous Signal Parsing
//!
//! The HTTP front door of a trading-signal backend. Every request passes a
//! per-client, per-route admission check before it reaches a handler, and
//! slow signal parsing runs on a background worker so the submitting request
//! returns at once with a task id to poll.
//! Built with [Axum](https://crates.io/crates/axum) for async HTTP handling and
//! provides OpenAPI/Swagger documentation via [utoipa](https://crates.io/crates/utoipa).
//!
//! ## Key Features
//!
//! - **Fixed-Window Rate Limiting**: Requests are counted per client identity
//!   and route in fixed windows. Denials carry `Retry-After` and
//!   `X-RateLimit-*` headers.
//!
//! - **Client Identity**: Authenticated user first, then a hashed API key,
//!   then the forwarded or peer address.
//!
//! - **Fail-Open Admission**: Faults inside the admission path let the
//!   request through instead of rejecting legitimate traffic.
//!
//! - **Asynchronous Tasks**: A bounded queue drained by a single worker,
//!   with results polled by task id and purged after a retention period.
//!
//! - **Runtime Rule Replacement**: The route rule table can be swapped
//!   atomically through the admin endpoint.
//!
//! - **OpenAPI Documentation**: Auto-generated Swagger UI at `/swagger-ui/`.
//!
//! ## Architecture
//!
//! ```text
//! request ──► rate_limit_middleware ──► handler
//!                 │                        │
//!                 ▼                        ▼
//!          AdmissionController        TaskProcessor ──► mpsc queue ──► worker
//!            ├── RuleRegistry              │                              │
//!            └── BucketStore               └──────── ResultCache ◄────────┘
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Route handlers, rate limiting middleware and router configuration |
//! | [`auth`] | Client identity resolution |
//! | [`clock`] | Time source abstraction |
//! | [`config`] | TOML configuration |
//! | [`error`] | API error types with `IntoResponse` implementation |
//! | [`models`] | Request/response DTOs with OpenAPI schemas |
//! | [`ratelimit`] | Rule registry, bucket store and admission controller |
//! | [`state`] | Application state management |
//! | [`tasks`] | Task queue, worker loop and result cache |
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/signals/parse` | Queue a signal for parsing |
//! | GET | `/api/v1/signals/tasks/{task_id}` | Poll a task |
//! | GET | `/api/v1/signals/stats` | Task processor statistics |
//! | GET | `/api/v1/admin/rate-limits` | Active rate limit rules |
//! | PUT | `/api/v1/admin/rate-limits` | Replace the rule table |
//!
//! ## Example Usage
//!
//! ### Starting the Server
//!
//! ```bash
//! # Development mode
//! cargo run
//!
//! # With a configuration file and custom port
//! CONFIG_PATH=config.toml PORT=3000 cargo run
//! ```
//!
//! ### API Requests
//!
//! ```bash
//! # Queue a signal
//! curl -X POST http://localhost:8080/api/v1/signals/parse \
//!   -H "Content-Type: application/json" \
//!   -d '{"payload": {"text": "BUY AAPL 190"}}'
//!
//! # Poll the task
//! curl http://localhost:8080/api/v1/signals/tasks/<task_id>
//! ```
//!
//! ## Dependencies
//!
//! - **axum** (0.8): Async web framework
//! - **tower-http** (0.6): HTTP middleware (CORS, tracing)
//! - **utoipa** (5.4): OpenAPI documentation generation
//! - **tokio** (1.49): Async runtime
//! - **dashmap** (6.1): Concurrent bucket and result maps
//! - **tracing** (0.1): Structured logging

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod state;
pub mod tasks;
