//! The signal parsing seam.
//!
//! The parsing engine (OCR, NLP, signal extraction) lives outside this crate.
//! The task processor only needs something that turns a JSON payload into a
//! JSON result or an error.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

/// Failure reported by a signal parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The payload is not something the parser accepts.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The parser ran and failed.
    #[error("parse failed: {0}")]
    Failed(String),
}

/// Turns a submitted payload into a parse result.
pub trait SignalParser: Send + Sync + 'static {
    /// Parses one payload.
    fn parse(&self, payload: Value) -> BoxFuture<'static, Result<Value, ParseError>>;
}

impl<F, Fut> SignalParser for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ParseError>> + Send + 'static,
{
    fn parse(&self, payload: Value) -> BoxFuture<'static, Result<Value, ParseError>> {
        self(payload).boxed()
    }
}

/// Parser used when no engine is wired in: accepts any non-empty JSON
/// object and returns it unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughParser;

impl SignalParser for PassthroughParser {
    fn parse(&self, payload: Value) -> BoxFuture<'static, Result<Value, ParseError>> {
        async move {
            match &payload {
                Value::Object(map) if !map.is_empty() => Ok(payload),
                Value::Object(_) => Err(ParseError::InvalidPayload(
                    "payload object is empty".to_string(),
                )),
                other => Err(ParseError::InvalidPayload(format!(
                    "expected a JSON object, got {}",
                    json_kind(other)
                ))),
            }
        }
        .boxed()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
