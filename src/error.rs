use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::tls::TlsError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which listener a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Proxy,
    Api,
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interface::Proxy => f.write_str("proxy"),
            Interface::Api => f.write_str("api"),
        }
    }
}

/// Fatal startup errors. Every variant stops the process before it serves
/// traffic; faults after startup go through the lifecycle's fault boundary
/// instead of this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("--error-target and --error-path are mutually exclusive; configure only one")]
    ErrorHandlerConflict,

    #[error("--redirect-port {0} requires TLS material for the proxy listener")]
    RedirectWithoutTls(u16),

    #[error("cannot interpret {0:?} as a listen address")]
    InvalidAddress(String),

    #[error("public port {0} leaves no room for the default administrative port")]
    ApiPortOverflow(u16),

    #[error("unsupported TLS protocol version {0:?} (expected TLSv1_2 or TLSv1_3)")]
    UnsupportedTlsVersion(String),

    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write pid file {}: {source}", .path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS configuration for the {interface} listener: {source}")]
    Tls {
        interface: Interface,
        #[source]
        source: TlsError,
    },

    #[error("failed to bind the {interface} listener on {addr}: {source}")]
    Bind {
        interface: Interface,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("the {interface} listener terminated unexpectedly: {source}")]
    Serve {
        interface: Interface,
        #[source]
        source: io::Error,
    },
}
