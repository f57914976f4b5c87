use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use futures::{SinkExt, StreamExt};
use shared::protocol::SUBPROTOCOL;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, protocol::WebSocketConfig,
        Message as UpstreamMessage,
    },
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod filter;

use config::load_settings;
use filter::{RequestFilter, Verdict};

struct ProxyState {
    target_url: String,
    max_message_bytes: usize,
    filter: RequestFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let tls = settings.tls_files()?;
    let state = ProxyState {
        target_url: settings.target_url,
        max_message_bytes: settings.max_message_bytes,
        filter: RequestFilter::new(settings.allowed_requests),
    };
    info!(target_url = %state.target_url, "proxying to mixing server");
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_addr))?;
    match tls {
        Some(files) => {
            // more than one rustls backend can be compiled in
            let _ = rustls::crypto::ring::default_provider().install_default();
            let rustls = RustlsConfig::from_pem_file(&files.cert, &files.key)
                .await
                .with_context(|| {
                    format!(
                        "failed to load TLS config from {} and {}",
                        files.cert.display(),
                        files.key.display()
                    )
                })?;
            info!(%addr, cert = %files.cert.display(), "proxy listening with TLS");
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "proxy listening");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

fn build_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    ws.protocols([SUBPROTOCOL])
        .max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| proxy_connection(state, socket))
}

async fn proxy_connection(state: Arc<ProxyState>, socket: WebSocket) {
    let mut request = match state.target_url.as_str().into_client_request() {
        Ok(request) => request,
        Err(error) => {
            warn!(target_url = %state.target_url, %error, "invalid target url");
            return;
        }
    };
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(state.max_message_bytes);

    let upstream = match connect_async_with_config(request, Some(config), false).await {
        Ok((upstream, _)) => upstream,
        Err(error) => {
            warn!(target_url = %state.target_url, %error, "failed to reach mixing server");
            return;
        }
    };
    info!("client connected");

    let (mut client_tx, mut client_rx) = socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let forward = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match state.filter.filter_forwarded(&text) {
                Verdict::Forward => {
                    debug!(frame = %text, "forwarding");
                    if upstream_tx.send(UpstreamMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                Verdict::Drop(reason) => warn!(%reason, "dropped client frame"),
            }
        }
        let _ = upstream_tx.close().await;
    };

    let back = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let message = match message {
                UpstreamMessage::Text(text) => Message::Text(text),
                UpstreamMessage::Binary(data) => Message::Binary(data),
                UpstreamMessage::Close(_) => break,
                _ => continue,
            };
            if client_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        () = forward => {}
        () = back => {}
    }
    info!("client disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
