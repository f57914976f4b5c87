use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde_json::Value;
use shared::{
    error::RemoteCallError,
    protocol::{
        authentication_response, subscription, Identify, ObsMessage, Request, RequestResponse,
        RPC_VERSION, SUBPROTOCOL,
    },
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, oneshot},
    time::timeout,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::remote::{RemoteControl, RemoteEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<Value, RemoteCallError>>;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub password: Option<String>,
    pub event_subscriptions: u32,
    pub request_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4455".into(),
            password: None,
            event_subscriptions: subscription::PANEL_DEFAULT,
            request_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

#[derive(Default)]
struct PendingCalls {
    closed: bool,
    replies: HashMap<String, PendingReply>,
}

struct Shared {
    pending: Mutex<PendingCalls>,
    /// Taken on close so that subscribers see the end of the stream.
    events: Mutex<Option<broadcast::Sender<RemoteEvent>>>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, response: RequestResponse) {
        let Some(reply) = self.pending().replies.remove(&response.request_id) else {
            debug!(
                request_id = %response.request_id,
                request_type = %response.request_type,
                "response for unknown or expired request"
            );
            return;
        };
        let status = response.request_status;
        let result = if status.result {
            Ok(response.response_data)
        } else {
            Err(RemoteCallError::Request {
                request_type: response.request_type,
                code: status.code,
                comment: status.comment.unwrap_or_default(),
            })
        };
        let _ = reply.send(result);
    }

    fn publish(&self, event: RemoteEvent) {
        if let Some(events) = self.events.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            let _ = events.send(event);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        match self.events.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    fn close(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let replies = {
            let mut pending = self.pending();
            pending.closed = true;
            std::mem::take(&mut pending.replies)
        };
        if !replies.is_empty() {
            warn!(count = replies.len(), "failing pending requests after disconnect");
        }
        for (_, reply) in replies {
            let _ = reply.send(Err(RemoteCallError::Disconnected));
        }
    }
}

pub struct ObsTransport {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    negotiated_rpc_version: u32,
}

impl ObsTransport {
    pub async fn connect(options: ConnectOptions) -> Result<Arc<Self>> {
        let mut request = options
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid server url: {}", options.url))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
        let (mut ws, _) = connect_async(request)
            .await
            .with_context(|| format!("failed to connect websocket: {}", options.url))?;

        let negotiated_rpc_version = timeout(options.request_timeout, identify(&mut ws, &options))
            .await
            .map_err(|_| anyhow!("handshake with {} timed out", options.url))??;
        info!(url = %options.url, negotiated_rpc_version, "identified with mixing server");

        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingCalls::default()),
            events: Mutex::new(Some(events)),
        });
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (sink, stream) = ws.split();
        tokio::spawn(write_loop(sink, outgoing_rx));
        tokio::spawn(read_loop(Arc::clone(&shared), stream));

        Ok(Arc::new(Self {
            shared,
            outgoing,
            next_request_id: AtomicU64::new(1),
            request_timeout: options.request_timeout,
            negotiated_rpc_version,
        }))
    }

    pub fn negotiated_rpc_version(&self) -> u32 {
        self.negotiated_rpc_version
    }

    pub fn is_closed(&self) -> bool {
        self.shared.pending().closed
    }

    /// Sends a close frame; pending calls fail once the server confirms.
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}

#[async_trait]
impl RemoteControl for ObsTransport {
    async fn call(&self, request_type: &str, request_data: Value) -> Result<Value, RemoteCallError> {
        let request_id = self
            .next_request_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let text = ObsMessage::Request(Request {
            request_type: request_type.to_string(),
            request_id: request_id.clone(),
            request_data,
        })
        .to_text()
        .map_err(|err| RemoteCallError::Protocol(err.to_string()))?;

        let (reply, response) = oneshot::channel();
        {
            let mut pending = self.shared.pending();
            if pending.closed {
                return Err(RemoteCallError::Disconnected);
            }
            pending.replies.insert(request_id.clone(), reply);
        }
        if self.outgoing.send(Message::Text(text)).is_err() {
            self.shared.pending().replies.remove(&request_id);
            return Err(RemoteCallError::Disconnected);
        }
        debug!(request_type, request_id = %request_id, "request sent");

        match timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RemoteCallError::Disconnected),
            Err(_) => {
                self.shared.pending().replies.remove(&request_id);
                Err(RemoteCallError::Timeout {
                    request_type: request_type.to_string(),
                    after: self.request_timeout,
                })
            }
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RemoteEvent> {
        self.shared.subscribe()
    }
}

async fn next_message(ws: &mut WsStream) -> Result<ObsMessage> {
    while let Some(message) = ws.next().await {
        match message.context("websocket receive failed")? {
            Message::Text(text) => {
                return ObsMessage::parse(&text).context("invalid frame from server");
            }
            Message::Close(frame) => bail!("server closed the connection: {frame:?}"),
            _ => {}
        }
    }
    bail!("connection closed during handshake")
}

async fn identify(ws: &mut WsStream, options: &ConnectOptions) -> Result<u32> {
    let hello = match next_message(ws).await? {
        ObsMessage::Hello(hello) => hello,
        other => bail!("expected Hello, got {other:?}"),
    };
    debug!(server_version = %hello.obs_web_socket_version, rpc_version = hello.rpc_version, "hello");

    let authentication = match (&hello.authentication, &options.password) {
        (Some(challenge), Some(password)) => Some(authentication_response(
            password,
            &challenge.salt,
            &challenge.challenge,
        )),
        (Some(_), None) => bail!("server requires a password"),
        (None, _) => None,
    };
    let identify = ObsMessage::Identify(Identify {
        rpc_version: RPC_VERSION.min(hello.rpc_version),
        authentication,
        event_subscriptions: options.event_subscriptions,
    });
    ws.send(Message::Text(identify.to_text()?))
        .await
        .context("failed to send Identify")?;

    match next_message(ws).await? {
        ObsMessage::Identified(identified) => Ok(identified.negotiated_rpc_version),
        other => bail!("expected Identified, got {other:?}"),
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(err) = sink.send(message).await {
            warn!(error = %err, "websocket send failed");
            break;
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut stream: SplitStream<WsStream>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match ObsMessage::parse(&text) {
                Ok(ObsMessage::Event(event)) => {
                    shared.publish(RemoteEvent::new(event.event_type, event.event_data));
                }
                Ok(ObsMessage::RequestResponse(response)) => shared.complete(response),
                Ok(other) => debug!(?other, "ignoring frame"),
                Err(err) => warn!(error = %err, "invalid frame from server"),
            },
            Ok(Message::Close(frame)) => {
                info!(?frame, "server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "websocket receive failed");
                break;
            }
        }
    }
    shared.close();
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
