//! Listener construction and the engine handoff.
//!
//! Probes both listen addresses up front (TLS or plain, decided per
//! interface), writes the PID marker once both probes have succeeded,
//! starts the redirect listener when it is active, and then drives both
//! servers until one fails or the process is interrupted.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ProxyConfig, HTTP_PORT};
use crate::engine::ProxyEngine;
use crate::error::{Error, Interface, Result};
use crate::lifecycle::{self, Lifecycle};
use crate::tls::TlsContext;

use super::redirect;

/// Bind both listeners and serve the engine's handlers on them.
///
/// Partial startup is not permitted: an unusable address or bad TLS
/// material on either interface is fatal before the PID marker exists,
/// with the failing interface named. Blocks until a listener fails.
pub async fn serve<E: ProxyEngine>(
    engine: &E,
    config: &ProxyConfig,
    lifecycle: Arc<Lifecycle>,
) -> Result<()> {
    let public_tls = acceptor_for(Interface::Proxy, config.ssl.as_ref())?;
    let api_tls = acceptor_for(Interface::Api, config.api_ssl.as_ref())?;

    let public_addr = config.listen.public_addr();
    let api_addr = config.listen.api_addr();

    preflight_bind(Interface::Proxy, public_addr)?;
    preflight_bind(Interface::Api, api_addr)?;

    lifecycle.clone().spawn_signal_handler();
    lifecycle.write_pid_file()?;

    if let Some(redirect_port) = redirect_port_active(config) {
        redirect::spawn_redirect_server(redirect_port, config.listen.public_port);
    }

    let proxy_app = instrumented(engine.proxy_app());
    let api_app = instrumented(engine.api_app());

    tracing::info!(
        scheme = config.public_scheme(),
        address = %public_addr,
        default_target = config.default_target.as_deref().unwrap_or("(none)"),
        "proxy listener ready"
    );
    tracing::info!(
        scheme = config.api_scheme(),
        address = %api_addr,
        "administrative listener ready"
    );

    tokio::try_join!(
        run_server(Interface::Proxy, public_addr, public_tls, proxy_app),
        run_server(Interface::Api, api_addr, api_tls, api_app),
    )?;
    Ok(())
}

/// Boundary middleware owned by the bootstrap: request tracing plus the
/// fault boundary that turns an escaped panic into a 500 response while
/// the listener keeps serving.
fn instrumented(app: Router) -> Router {
    app.layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(lifecycle::fault_response))
}

/// The redirect listener's port, when it should run at all.
///
/// Two independent conditions: a redirect port must be configured, and
/// the public listener must not already answer plain HTTP on 80, where
/// the redirect would point at its own listener.
fn redirect_port_active(config: &ProxyConfig) -> Option<u16> {
    config
        .redirect_port
        .filter(|_| config.listen.public_port != HTTP_PORT)
}

/// Build the rustls acceptor for one interface, or `None` for a plain
/// listener.
fn acceptor_for(
    interface: Interface,
    context: Option<&TlsContext>,
) -> Result<Option<RustlsConfig>> {
    match context {
        Some(context) => {
            let server_config = context
                .server_config()
                .map_err(|source| Error::Tls { interface, source })?;
            Ok(Some(RustlsConfig::from_config(Arc::new(server_config))))
        }
        None => Ok(None),
    }
}

/// Bind and release one address so an unusable interface surfaces before
/// the PID marker is written.
fn preflight_bind(interface: Interface, addr: SocketAddr) -> Result<()> {
    TcpListener::bind(addr)
        .map(drop)
        .map_err(|source| Error::Bind {
            interface,
            addr,
            source,
        })
}

async fn run_server(
    interface: Interface,
    addr: SocketAddr,
    tls: Option<RustlsConfig>,
    app: Router,
) -> Result<()> {
    let served = match tls {
        Some(rustls_config) => {
            axum_server::bind_rustls(addr, rustls_config)
                .serve(app.into_make_service())
                .await
        }
        None => {
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await
        }
    };
    served.map_err(|source| Error::Serve { interface, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> ProxyConfig {
        use clap::Parser;
        let options = crate::cli::RawOptions::try_parse_from(
            std::iter::once("gatehouse").chain(args.iter().copied()),
        )
        .unwrap();
        ProxyConfig::from_options(&options).unwrap()
    }

    #[test]
    fn test_redirect_suppressed_when_public_port_is_plain_http() {
        let config = config(&["--port", "80", "--redirect-port", "8080"]);
        assert_eq!(redirect_port_active(&config), None);
    }

    #[test]
    fn test_redirect_active_on_any_other_public_port() {
        let config = config(&["--port", "8000", "--redirect-port", "8080"]);
        assert_eq!(redirect_port_active(&config), Some(8080));
    }

    #[test]
    fn test_redirect_inactive_without_a_configured_port() {
        let config = config(&["--port", "8000"]);
        assert_eq!(redirect_port_active(&config), None);
    }

    #[test]
    fn test_occupied_address_fails_preflight_naming_the_interface() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let err = preflight_bind(Interface::Api, addr).unwrap_err();
        match err {
            Error::Bind {
                interface,
                addr: failed,
                ..
            } => {
                assert_eq!(interface, Interface::Api);
                assert_eq!(failed, addr);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_free_address_passes_preflight() {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        preflight_bind(Interface::Proxy, addr).unwrap();
    }
}
