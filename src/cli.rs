//! Command-line surface.
//!
//! `RawOptions` is the full set of externally supplied switches, collected
//! once at startup and never mutated afterwards. Normalization into the
//! typed runtime configuration happens in [`crate::config`]; nothing here
//! is validated beyond what clap can express.

use std::path::PathBuf;

use clap::Parser;

use crate::tls::TlsOptions;

/// Front-end bootstrap for a configurable reverse proxy.
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse", version, about)]
pub struct RawOptions {
    /// Public-facing IP address to listen on (all interfaces when omitted)
    #[arg(long)]
    pub ip: Option<String>,

    /// Public-facing port to listen on
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// SSL key to use for the public interface, if any
    #[arg(long)]
    pub ssl_key: Option<PathBuf>,

    /// SSL certificate to use for the public interface, if any
    #[arg(long)]
    pub ssl_cert: Option<PathBuf>,

    /// SSL certificate authority for the public interface, if any
    #[arg(long)]
    pub ssl_ca: Option<PathBuf>,

    /// Request a certificate from clients of the public interface
    #[arg(long)]
    pub ssl_request_cert: bool,

    /// Reject public-interface clients whose certificate does not verify
    /// against the configured authority
    #[arg(long)]
    pub ssl_reject_unauthorized: bool,

    /// Pin the TLS protocol version for both interfaces (TLSv1_2 or
    /// TLSv1_3)
    #[arg(long)]
    pub ssl_protocol: Option<String>,

    /// Explicit cipher-suite list, replacing the built-in policy
    #[arg(long)]
    pub ssl_ciphers: Option<String>,

    /// Allow the legacy RC4 family in the built-in cipher policy
    #[arg(long)]
    pub ssl_allow_rc4: bool,

    /// Diffie-Hellman parameters for both interfaces, if any
    #[arg(long)]
    pub ssl_dhparam: Option<PathBuf>,

    /// Inward-facing IP address for the administrative interface
    /// (loopback when omitted)
    #[arg(long)]
    pub api_ip: Option<String>,

    /// Inward-facing port for the administrative interface (public port
    /// plus one when omitted)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// SSL key to use for the administrative interface, if any
    #[arg(long)]
    pub api_ssl_key: Option<PathBuf>,

    /// SSL certificate to use for the administrative interface, if any
    #[arg(long)]
    pub api_ssl_cert: Option<PathBuf>,

    /// SSL certificate authority for the administrative interface, if any
    #[arg(long)]
    pub api_ssl_ca: Option<PathBuf>,

    /// Request a certificate from clients of the administrative interface
    #[arg(long)]
    pub api_ssl_request_cert: bool,

    /// Reject administrative-interface clients whose certificate does not
    /// verify against the configured authority
    #[arg(long)]
    pub api_ssl_reject_unauthorized: bool,

    /// Explicit cipher-suite list for the administrative interface
    #[arg(long)]
    pub api_ssl_ciphers: Option<String>,

    /// Default target for requests the engine has no route for
    #[arg(long)]
    pub default_target: Option<String>,

    /// Alternate server to handle proxy errors (target URL form)
    #[arg(long)]
    pub error_target: Option<String>,

    /// Alternate handler for proxy errors (local path form)
    #[arg(long)]
    pub error_path: Option<PathBuf>,

    /// Redirect plain HTTP on this port to the HTTPS proxy port
    #[arg(long)]
    pub redirect_port: Option<u16>,

    /// Write the process identifier to this file while running
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Refuse administrative requests that do not carry the auth token
    #[arg(long)]
    pub require_auth_token: bool,

    /// Do not add X-Forwarded-* headers to proxied requests
    #[arg(long)]
    pub no_x_forward: bool,

    /// Do not prepend the target's path to proxied requests
    #[arg(long)]
    pub no_prepend_path: bool,

    /// Do not include the routing prefix in proxied requests
    #[arg(long)]
    pub no_include_prefix: bool,

    /// Rewrite the Location host and port in redirect responses to match
    /// the requested host and port
    #[arg(long)]
    pub auto_rewrite: bool,

    /// Change the origin of the Host header to the target URL
    #[arg(long)]
    pub change_origin: bool,

    /// Rewrite the Location protocol in redirect responses to this
    /// protocol
    #[arg(long)]
    pub protocol_rewrite: Option<String>,

    /// Skip verification of upstream TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Route on the first level of the request host instead of the path
    #[arg(long)]
    pub host_routing: bool,

    /// Host of a statsd sink to send metrics to, if any
    #[arg(long)]
    pub statsd_host: Option<String>,

    /// Port of the statsd sink
    #[arg(long)]
    pub statsd_port: Option<u16>,

    /// Prefix for metric names sent to statsd
    #[arg(long)]
    pub statsd_prefix: Option<String>,

    /// Log level filter (e.g. "debug" or "gatehouse=debug,tower_http=info")
    #[arg(long)]
    pub log_level: Option<String>,

    /// Milliseconds to wait for an upstream response before failing a
    /// request
    #[arg(long)]
    pub proxy_timeout: Option<u64>,

    /// External storage backend identifier for the engine's route table
    #[arg(long)]
    pub storage_backend: Option<String>,
}

impl RawOptions {
    /// The public interface's TLS namespace. dhparam and the protocol pin
    /// exist only at the top level and are shared with
    /// [`Self::api_tls_options`].
    pub fn proxy_tls_options(&self) -> TlsOptions<'_> {
        TlsOptions {
            key: self.ssl_key.as_deref(),
            cert: self.ssl_cert.as_deref(),
            ca: self.ssl_ca.as_deref(),
            dhparam: self.ssl_dhparam.as_deref(),
            protocol: self.ssl_protocol.as_deref(),
            request_cert: self.ssl_request_cert,
            reject_unauthorized: self.ssl_reject_unauthorized,
        }
    }

    /// The administrative interface's TLS namespace.
    pub fn api_tls_options(&self) -> TlsOptions<'_> {
        TlsOptions {
            key: self.api_ssl_key.as_deref(),
            cert: self.api_ssl_cert.as_deref(),
            ca: self.api_ssl_ca.as_deref(),
            dhparam: self.ssl_dhparam.as_deref(),
            protocol: self.ssl_protocol.as_deref(),
            request_cert: self.api_ssl_request_cert,
            reject_unauthorized: self.api_ssl_reject_unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = RawOptions::try_parse_from(["gatehouse"]).unwrap();
        assert_eq!(options.port, 8000);
        assert!(options.ip.is_none());
        assert!(options.api_port.is_none());
        assert!(!options.ssl_allow_rc4);
        assert!(!options.no_x_forward);
        assert!(!options.insecure);
    }

    #[test]
    fn test_tls_namespaces_stay_separate() {
        let options = RawOptions::try_parse_from([
            "gatehouse",
            "--ssl-key",
            "proxy.pem",
            "--api-ssl-key",
            "api.pem",
            "--ssl-dhparam",
            "dh.pem",
            "--ssl-request-cert",
        ])
        .unwrap();

        let proxy = options.proxy_tls_options();
        let api = options.api_tls_options();

        assert_eq!(proxy.key, Some(Path::new("proxy.pem")));
        assert_eq!(api.key, Some(Path::new("api.pem")));
        assert!(proxy.request_cert);
        assert!(!api.request_cert);

        // dhparam has no per-interface form and lands in both namespaces.
        assert_eq!(proxy.dhparam, Some(Path::new("dh.pem")));
        assert_eq!(api.dhparam, Some(Path::new("dh.pem")));
    }

    #[test]
    fn test_negated_switches_parse() {
        let options = RawOptions::try_parse_from([
            "gatehouse",
            "--no-x-forward",
            "--no-prepend-path",
            "--no-include-prefix",
        ])
        .unwrap();
        assert!(options.no_x_forward);
        assert!(options.no_prepend_path);
        assert!(options.no_include_prefix);
    }
}
