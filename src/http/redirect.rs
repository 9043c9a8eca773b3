//! Plain-HTTP listener that redirects onto the HTTPS proxy endpoint.
//!
//! Active only when a redirect port is configured and the public listener
//! is not already on port 80 (the activation gate lives in the server
//! module). The listener has exactly one behavior: answer every request
//! with a permanent redirect to the same host, path, and query on the
//! https scheme.

use std::net::SocketAddr;

use axum::http::Uri;
use axum::response::Redirect;
use axum::routing::any;
use axum::Router;
use axum_extra::extract::Host;

use crate::config::HTTPS_PORT;

/// Spawn the redirect listener on all interfaces at `redirect_port`,
/// pointing at the public HTTPS listener on `https_port`.
///
/// Runs in the background; a failure here is logged but does not take the
/// proxy down.
pub fn spawn_redirect_server(redirect_port: u16, https_port: u16) {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], redirect_port));

        tracing::info!(
            redirect_port,
            https_port,
            "starting plain-HTTP redirect listener"
        );

        let app = Router::new().fallback(any(move |Host(host): Host, uri: Uri| async move {
            redirect_to_https(&host, &uri, https_port)
        }));

        match axum_server::bind(addr).serve(app.into_make_service()).await {
            Ok(()) => tracing::debug!("redirect listener stopped"),
            Err(error) => tracing::error!(%error, "redirect listener failed"),
        }
    });
}

/// Build the permanent redirect for one request.
///
/// The declared host loses any port suffix it arrived with, and the public
/// HTTPS port is appended unless it is the conventional 443. Path and
/// query pass through untouched.
fn redirect_to_https(host: &str, uri: &Uri, https_port: u16) -> Redirect {
    let host = host.split(':').next().unwrap_or(host);
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let location = if https_port == HTTPS_PORT {
        format!("https://{host}{path_and_query}")
    } else {
        format!("https://{host}:{https_port}{path_and_query}")
    };

    tracing::debug!(from = %uri, to = %location, "redirecting to https");

    Redirect::permanent(&location)
}
