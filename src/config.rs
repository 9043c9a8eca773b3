//! Runtime configuration: defaults, normalization, and validation.
//!
//! [`ProxyConfig`] is the canonical record the proxy engine is constructed
//! with. [`ProxyConfig::from_options`] performs the total mapping from the
//! raw switches, reading any referenced TLS material off disk, and
//! [`ProxyConfig::validate`] rejects contradictory combinations strictly
//! before anything binds.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use const_format::formatcp;

use crate::cli::RawOptions;
use crate::error::{Error, Result};
use crate::tls::{cipher_suite_list, TlsContext};

// =============================================================================
// Constants
// =============================================================================

/// Conventional plain-HTTP port. A redirect listener alongside a public
/// listener already on this port would point at itself, so it is suppressed.
pub const HTTP_PORT: u16 = 80;

/// Conventional HTTPS port, the only one omitted from redirect URLs.
pub const HTTPS_PORT: u16 = 443;

/// Conventional statsd sink port.
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Default prefix for metric names.
pub const DEFAULT_STATSD_PREFIX: &str = env!("CARGO_PKG_NAME");

/// Environment variable holding the administrative API credential.
pub const AUTH_TOKEN_ENV: &str = "GATEHOUSE_AUTH_TOKEN";

/// Default log filter when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = formatcp!("{}=info", env!("CARGO_PKG_NAME"));

// =============================================================================
// Configuration types
// =============================================================================

/// Resolved listen addresses for the two interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub public_ip: IpAddr,
    pub public_port: u16,
    pub api_ip: IpAddr,
    pub api_port: u16,
}

impl ListenConfig {
    fn resolve(options: &RawOptions) -> Result<Self> {
        let public_ip = match options.ip.as_deref() {
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Some("*") => {
                tracing::warn!(
                    "interpreting --ip \"*\" as all interfaces; omit --ip or pass an explicit address instead"
                );
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
            Some(other) => parse_ip(other)?,
        };

        let api_ip = match options.api_ip.as_deref() {
            // The administrative interface is inward-facing and stays on
            // loopback unless explicitly opened up.
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Some(other) => parse_ip(other)?,
        };

        let api_port = match options.api_port {
            Some(port) => port,
            None => options
                .port
                .checked_add(1)
                .ok_or(Error::ApiPortOverflow(options.port))?,
        };

        Ok(Self {
            public_ip,
            public_port: options.port,
            api_ip,
            api_port,
        })
    }

    pub fn public_addr(&self) -> SocketAddr {
        SocketAddr::new(self.public_ip, self.public_port)
    }

    pub fn api_addr(&self) -> SocketAddr {
        SocketAddr::new(self.api_ip, self.api_port)
    }
}

/// Accept plain addresses plus the conventional `localhost` spelling.
fn parse_ip(value: &str) -> Result<IpAddr> {
    if value == "localhost" {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    value
        .parse()
        .map_err(|_| Error::InvalidAddress(value.to_string()))
}

/// Statsd sink coordinates, present only when a host was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
}

/// The validated runtime configuration handed to the proxy engine.
///
/// Immutable once built. Every raw switch maps into exactly one field
/// here; negated switches are stored in positive form so the engine never
/// reasons about double negatives.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: ListenConfig,
    /// TLS for the public interface, absent for a plain listener.
    pub ssl: Option<TlsContext>,
    /// TLS for the administrative interface, configured independently.
    pub api_ssl: Option<TlsContext>,
    pub redirect_port: Option<u16>,
    pub pid_file: Option<PathBuf>,
    pub default_target: Option<String>,
    pub error_target: Option<String>,
    pub error_path: Option<PathBuf>,
    /// Administrative API credential, read once from the environment at
    /// startup.
    pub auth_token: Option<String>,
    pub require_auth_token: bool,
    pub x_forward: bool,
    pub prepend_path: bool,
    pub include_prefix: bool,
    pub auto_rewrite: bool,
    pub change_origin: bool,
    pub protocol_rewrite: Option<String>,
    /// Whether upstream TLS certificates are verified when forwarding.
    pub verify_upstream: bool,
    pub host_routing: bool,
    pub proxy_timeout_ms: Option<u64>,
    pub statsd: Option<StatsdConfig>,
    pub storage_backend: Option<String>,
}

impl ProxyConfig {
    /// Build the runtime configuration from the raw switches.
    ///
    /// Order-independent with respect to how the switches were supplied:
    /// the same set of options always produces the same configuration.
    pub fn from_options(options: &RawOptions) -> Result<Self> {
        let listen = ListenConfig::resolve(options)?;

        let ciphers = cipher_suite_list(options.ssl_allow_rc4, options.ssl_ciphers.as_deref());
        tracing::debug!(ciphers = %ciphers, "cipher policy resolved");

        let ssl = TlsContext::build(&options.proxy_tls_options(), &ciphers)?;
        let api_ciphers = options.api_ssl_ciphers.as_deref().unwrap_or(&ciphers);
        let api_ssl = TlsContext::build(&options.api_tls_options(), api_ciphers)?;

        let auth_token = env::var(AUTH_TOKEN_ENV).ok();
        if auth_token.is_none() {
            tracing::warn!(
                "{} is not set; the administrative interface is unauthenticated",
                AUTH_TOKEN_ENV
            );
        }

        let statsd = options.statsd_host.as_ref().map(|host| StatsdConfig {
            host: host.clone(),
            port: options.statsd_port.unwrap_or(DEFAULT_STATSD_PORT),
            prefix: options
                .statsd_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_STATSD_PREFIX.to_string()),
        });

        Ok(Self {
            listen,
            ssl,
            api_ssl,
            redirect_port: options.redirect_port,
            pid_file: options.pid_file.clone(),
            default_target: options.default_target.clone(),
            error_target: options.error_target.clone(),
            error_path: options.error_path.clone(),
            auth_token,
            require_auth_token: options.require_auth_token,
            x_forward: !options.no_x_forward,
            prepend_path: !options.no_prepend_path,
            include_prefix: !options.no_include_prefix,
            auto_rewrite: options.auto_rewrite,
            change_origin: options.change_origin,
            protocol_rewrite: options.protocol_rewrite.clone(),
            verify_upstream: !options.insecure,
            host_routing: options.host_routing,
            proxy_timeout_ms: options.proxy_timeout,
            statsd,
            storage_backend: options.storage_backend.clone(),
        })
    }

    /// Reject contradictory combinations.
    ///
    /// Runs strictly after construction and strictly before any listener
    /// binds, so a violation can never leave a half-started process
    /// behind.
    pub fn validate(&self) -> Result<()> {
        if self.error_target.is_some() && self.error_path.is_some() {
            return Err(Error::ErrorHandlerConflict);
        }

        if let Some(port) = self.redirect_port {
            // Redirecting to https only makes sense when the public
            // listener actually serves it.
            if self.ssl.is_none() {
                return Err(Error::RedirectWithoutTls(port));
            }
        }

        Ok(())
    }

    /// Scheme served on the public interface.
    pub fn public_scheme(&self) -> &'static str {
        if self.ssl.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Scheme served on the administrative interface.
    pub fn api_scheme(&self) -> &'static str {
        if self.api_ssl.is_some() {
            "https"
        } else {
            "http"
        }
    }
}
