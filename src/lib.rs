//! Gatehouse - process bootstrap for a configurable reverse-proxy
//! front-end.
//!
//! Turns flags, environment, and referenced files into an immutable
//! [`config::ProxyConfig`], builds up to two TLS contexts (public proxy
//! and administrative API), validates the combination, and starts the
//! routing engine's listeners with PID-file and signal lifecycle
//! management wrapped around them. Routing itself lives behind
//! [`engine::ProxyEngine`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod tls;

pub use cli::RawOptions;
pub use config::{ListenConfig, ProxyConfig};
pub use error::{Error, Interface, Result};
