//! HTTP client library for the Signal Gateway API.
//!
//! This crate provides a typed HTTP client for interacting with the Signal
//! Gateway. It covers signal submission, task polling and rate limit
//! administration, and surfaces 429 responses as [`Error::RateLimited`].
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{ClientConfig, GatewayClient};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gateway_client::Error> {
//!     let client = GatewayClient::new(ClientConfig {
//!         base_url: "http://localhost:8080".into(),
//!         timeout: Duration::from_secs(30),
//!         api_key: None,
//!     })?;
//!
//!     let accepted = client.submit_signal(json!({"text": "BUY AAPL 190"}), None).await?;
//!     let result = client
//!         .wait_for_task(&accepted.task_id, Duration::from_millis(100), 50)
//!         .await?;
//!     println!("Task {} is {}", result.task_id, result.status);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{ClientConfig, GatewayClient};
pub use error::Error;
pub use types::*;
