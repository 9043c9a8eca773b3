//! Boundary to the routing engine.
//!
//! The bootstrap's job ends where routing begins: it builds the validated
//! configuration, constructs an engine from it, and binds listeners for
//! the two request handlers the engine exposes. Route storage, request
//! forwarding, authentication, and metrics all live on the engine side of
//! this trait.

use axum::http::StatusCode;
use axum::Router;

use crate::config::ProxyConfig;

/// A routing engine as seen from the bootstrap: one handler for public
/// proxied traffic and one for the administrative API.
pub trait ProxyEngine {
    /// Handler bound to the public interface.
    fn proxy_app(&self) -> Router;

    /// Handler bound to the administrative interface.
    fn api_app(&self) -> Router;
}

/// Engine with an empty route table, used when the binary runs without a
/// routing backend attached.
///
/// Public requests all miss (404); the administrative API answers 501 so
/// callers can tell the bootstrap is up but unmanaged.
pub struct NullEngine;

impl NullEngine {
    pub fn new(config: &ProxyConfig) -> Self {
        tracing::debug!(
            default_target = config.default_target.as_deref().unwrap_or("(none)"),
            host_routing = config.host_routing,
            "engine starting with an empty route table"
        );
        Self
    }
}

impl ProxyEngine for NullEngine {
    fn proxy_app(&self) -> Router {
        Router::new().fallback(|| async { StatusCode::NOT_FOUND })
    }

    fn api_app(&self) -> Router {
        Router::new().fallback(|| async { StatusCode::NOT_IMPLEMENTED })
    }
}
