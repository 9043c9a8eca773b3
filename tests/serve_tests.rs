//! In-process serving checks: both listeners up and separate, TLS on the
//! public interface, the redirect flow, and the fault boundary keeping
//! the process alive after a panicking handler.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use clap::Parser;

use gatehouse::engine::ProxyEngine;
use gatehouse::lifecycle::Lifecycle;
use gatehouse::tls::{cipher_suite_list, TlsContext};
use gatehouse::{http, Error, Interface, ProxyConfig, RawOptions};

struct StubEngine;

impl ProxyEngine for StubEngine {
    fn proxy_app(&self) -> Router {
        Router::new()
            .route("/", get(|| async { "proxied" }))
            .route("/boom", get(boom))
    }

    fn api_app(&self) -> Router {
        Router::new().route("/ping", get(|| async { "pong" }))
    }
}

async fn boom() -> &'static str {
    panic!("handler fault")
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn base_config(public_port: u16, api_port: u16) -> ProxyConfig {
    let options = RawOptions::try_parse_from([
        "gatehouse",
        "--ip",
        "127.0.0.1",
        "--port",
        &public_port.to_string(),
        "--api-ip",
        "127.0.0.1",
        "--api-port",
        &api_port.to_string(),
    ])
    .unwrap();
    ProxyConfig::from_options(&options).unwrap()
}

fn self_signed_context() -> TlsContext {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    TlsContext {
        key: Some(certified.key_pair.serialize_pem().into_bytes()),
        cert: Some(certified.cert.pem().into_bytes()),
        ca: None,
        dhparam: None,
        ciphers: cipher_suite_list(false, None),
        protocol: None,
        honor_cipher_order: true,
        request_cert: false,
        reject_unauthorized: false,
    }
}

async fn wait_until_listening(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "listener on port {port} never came up"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_both_listeners_serve_their_apps() {
    let (public_port, api_port) = (free_port(), free_port());
    let config = base_config(public_port, api_port);
    let lifecycle = Arc::new(Lifecycle::new(None));

    let engine = StubEngine;
    let server = tokio::spawn(async move { http::serve(&engine, &config, lifecycle).await });

    wait_until_listening(public_port).await;
    wait_until_listening(api_port).await;

    let proxied = reqwest::get(format!("http://127.0.0.1:{public_port}/"))
        .await
        .unwrap();
    assert_eq!(proxied.text().await.unwrap(), "proxied");

    let pong = reqwest::get(format!("http://127.0.0.1:{api_port}/ping"))
        .await
        .unwrap();
    assert_eq!(pong.text().await.unwrap(), "pong");

    // The interfaces do not share a route table.
    let crossed = reqwest::get(format!("http://127.0.0.1:{public_port}/ping"))
        .await
        .unwrap();
    assert_eq!(crossed.status(), reqwest::StatusCode::NOT_FOUND);

    server.abort();
}

#[tokio::test]
async fn test_handler_fault_does_not_stop_serving() {
    let (public_port, api_port) = (free_port(), free_port());
    let config = base_config(public_port, api_port);
    let lifecycle = Arc::new(Lifecycle::new(None));

    let engine = StubEngine;
    let server = tokio::spawn(async move { http::serve(&engine, &config, lifecycle).await });

    wait_until_listening(public_port).await;

    let fault = reqwest::get(format!("http://127.0.0.1:{public_port}/boom"))
        .await
        .unwrap();
    assert_eq!(fault.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    // The listener answers normally after the fault.
    let alive = reqwest::get(format!("http://127.0.0.1:{public_port}/"))
        .await
        .unwrap();
    assert_eq!(alive.status(), reqwest::StatusCode::OK);
    assert_eq!(alive.text().await.unwrap(), "proxied");

    server.abort();
}

#[tokio::test]
async fn test_tls_listener_and_redirect_flow() {
    let (public_port, api_port, redirect_port) = (free_port(), free_port(), free_port());

    let mut config = base_config(public_port, api_port);
    config.ssl = Some(self_signed_context());
    config.redirect_port = Some(redirect_port);
    config.validate().unwrap();

    let lifecycle = Arc::new(Lifecycle::new(None));
    let engine = StubEngine;
    let server = tokio::spawn(async move { http::serve(&engine, &config, lifecycle).await });

    wait_until_listening(public_port).await;
    wait_until_listening(redirect_port).await;

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let proxied = client
        .get(format!("https://127.0.0.1:{public_port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(proxied.text().await.unwrap(), "proxied");

    let redirected = client
        .get(format!("http://127.0.0.1:{redirect_port}/a?b=c"))
        .send()
        .await
        .unwrap();
    assert_eq!(redirected.status(), reqwest::StatusCode::PERMANENT_REDIRECT);
    let location = redirected
        .headers()
        .get(reqwest::header::LOCATION)
        .expect("redirect carries a location")
        .to_str()
        .unwrap();
    assert_eq!(location, format!("https://127.0.0.1:{public_port}/a?b=c"));

    server.abort();
}

#[tokio::test]
async fn test_occupied_api_port_fails_startup() {
    let (public_port, api_port) = (free_port(), free_port());
    let blocker = std::net::TcpListener::bind(("127.0.0.1", api_port)).unwrap();

    let config = base_config(public_port, api_port);
    let lifecycle = Arc::new(Lifecycle::new(None));
    let engine = StubEngine;

    let result = http::serve(&engine, &config, lifecycle).await;
    match result {
        Err(Error::Bind { interface, .. }) => assert_eq!(interface, Interface::Api),
        other => panic!("expected an api bind failure, got {other:?}"),
    }

    drop(blocker);
}
