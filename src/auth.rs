//! Client identity resolution for rate limiting.
//!
//! Authentication itself happens upstream; an authenticating layer that
//! recognises the caller inserts an [`AuthenticatedUser`] into the request
//! extensions. This module only derives the identity string that scopes
//! rate limits.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// Header name for API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header carrying the original client address behind proxies.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Number of hex characters of the key hash kept in the identity.
const API_KEY_HASH_LEN: usize = 16;

/// Identity used when no address is available at all.
const UNKNOWN_ADDRESS: &str = "unknown";

/// Caller identity established by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Stable user identifier.
    pub user_id: String,
}

/// Request attributes that identify a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    /// Authenticated user id, if any.
    pub user_id: Option<String>,
    /// Raw API key header value, if any.
    pub api_key: Option<String>,
    /// Raw forwarded-for header value, if any.
    pub forwarded_for: Option<String>,
    /// Socket peer address, if known.
    pub peer_addr: Option<SocketAddr>,
}

impl ClientMetadata {
    /// Extracts identifying metadata from a request.
    #[must_use]
    pub fn from_request(request: &Request<Body>) -> Self {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            user_id: request
                .extensions()
                .get::<AuthenticatedUser>()
                .map(|u| u.user_id.clone()),
            api_key: header(API_KEY_HEADER),
            forwarded_for: header(FORWARDED_FOR_HEADER),
            peer_addr: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }

    /// Resolves the rate-limit identity.
    ///
    /// Priority: authenticated user, then hashed API key, then client
    /// address (first forwarded-for entry, else the socket address).
    #[must_use]
    pub fn identity(&self) -> String {
        if let Some(user_id) = non_empty(self.user_id.as_deref()) {
            return format!("user:{}", user_id);
        }

        if let Some(key) = non_empty(self.api_key.as_deref()) {
            return format!("api_key:{}", hash_api_key(key));
        }

        format!("ip:{}", self.client_address())
    }

    fn client_address(&self) -> String {
        if let Some(ip) = self
            .forwarded_for
            .as_deref()
            .and_then(|v| v.split(',').next())
            .and_then(|ip| non_empty(Some(ip.trim())))
        {
            return ip.to_string();
        }

        self.peer_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
    }
}

/// Hashes an API key and keeps a short hex prefix, so identities never carry the raw key.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(API_KEY_HASH_LEN);
    digest
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
