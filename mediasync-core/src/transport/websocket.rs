//! Socket.IO over WebSocket
//!
//! Each opened channel is one tokio task that owns the socket. The consumer
//! talks to it through a command channel (same shape as a network handle);
//! the task talks back only through the dispatch queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::packet::{OpenInfo, Packet};
use super::{route_event, Channel, Transport, TransportError};
use crate::dispatch::{EventSink, InboundEvent};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound for TCP/TLS connect plus the Engine.IO and Socket.IO handshakes
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands sent to a channel task
#[derive(Debug)]
enum ChannelCommand {
    Emit { event: String, payload: Value },
    Close,
}

/// Opens Socket.IO channels on a tokio runtime
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    runtime: Handle,
}

impl WebSocketTransport {
    /// Spawn channel tasks on the given runtime
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Spawn channel tasks on the runtime we are currently inside
    pub fn from_current() -> Result<Self, TransportError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| TransportError::Connect(format!("no tokio runtime: {}", e)))
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Channel>, TransportError> {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidAddress(url.to_string()));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        let task_open = Arc::clone(&open);
        let url = url.to_string();
        self.runtime.spawn(async move {
            run_channel(url, sink, command_rx, task_open).await;
        });

        Ok(Box::new(WebSocketChannel { command_tx, open }))
    }
}

/// Consumer-side handle to a channel task
struct WebSocketChannel {
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
    open: Arc<AtomicBool>,
}

impl Channel for WebSocketChannel {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        self.command_tx
            .send(ChannelCommand::Emit {
                event: event.to_string(),
                payload,
            })
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        let _ = self.command_tx.send(ChannelCommand::Close);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Channel task: connect, handshake, then pump frames until either side closes
async fn run_channel(
    url: String,
    sink: EventSink,
    mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    open: Arc<AtomicBool>,
) {
    info!("Opening playback channel: {}", url);

    let established = tokio::select! {
        result = timeout(HANDSHAKE_TIMEOUT, establish(&url)) => result,
        _ = wait_for_close(&mut command_rx) => {
            debug!("Channel closed before the handshake finished");
            return;
        }
    };

    let (socket, info) = match established {
        Ok(Ok(established)) => established,
        Ok(Err(e)) => {
            warn!("Playback channel failed: {}", e);
            sink.push(InboundEvent::ConnectFailed { reason: e.to_string() });
            return;
        }
        Err(_) => {
            let e = TransportError::Handshake("timed out".to_string());
            warn!("Playback channel failed: {}", e);
            sink.push(InboundEvent::ConnectFailed { reason: e.to_string() });
            return;
        }
    };

    open.store(true, Ordering::Release);
    info!(
        "Playback channel connected (sid {}, ping {}ms/{}ms)",
        info.sid, info.ping_interval, info.ping_timeout
    );
    sink.push(InboundEvent::Connected);

    let (ws_tx, ws_rx) = socket.split();
    let reason = pump(ws_tx, ws_rx, &sink, &mut command_rx, &info).await;

    open.store(false, Ordering::Release);
    info!("Playback channel closed: {}", reason);
    sink.push(InboundEvent::Disconnected { reason });
}

async fn wait_for_close(command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>) {
    loop {
        match command_rx.recv().await {
            Some(ChannelCommand::Close) | None => return,
            Some(ChannelCommand::Emit { event, .. }) => {
                trace!("Dropping {} emitted before the channel opened", event);
            }
        }
    }
}

/// Connect the socket and run the Engine.IO open + Socket.IO connect handshake
async fn establish(url: &str) -> Result<(Socket, OpenInfo), TransportError> {
    let (mut socket, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let info = loop {
        match next_packet(&mut socket).await? {
            Packet::Open(info) => break info,
            other => trace!("Ignoring packet before open: {:?}", other),
        }
    };

    send_packet(&mut socket, &Packet::Connect { sid: None }).await?;

    loop {
        match next_packet(&mut socket).await? {
            Packet::Connect { .. } => return Ok((socket, info)),
            Packet::ConnectError(message) => return Err(TransportError::Handshake(message)),
            Packet::Ping => send_packet(&mut socket, &Packet::Pong).await?,
            other => trace!("Ignoring packet during handshake: {:?}", other),
        }
    }
}

async fn next_packet(socket: &mut Socket) -> Result<Packet, TransportError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("<- {}", text);
                return Packet::decode(&text).map_err(|e| TransportError::Protocol(e.to_string()));
            }
            Some(Ok(Message::Close(frame))) => {
                return Err(TransportError::Handshake(format!("closed by server: {:?}", frame)));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            None => return Err(TransportError::Closed),
        }
    }
}

async fn send_packet(socket: &mut Socket, packet: &Packet) -> Result<(), TransportError> {
    let frame = packet.encode();
    trace!("-> {}", frame);
    socket
        .send(Message::Text(frame))
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))
}

/// Main loop of an established channel. Returns the close reason.
async fn pump(
    mut ws_tx: SplitSink<Socket, Message>,
    mut ws_rx: SplitStream<Socket>,
    sink: &EventSink,
    command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    info: &OpenInfo,
) -> String {
    // The server pings every interval; silence past interval + timeout means it is gone
    let liveness = Duration::from_millis(info.ping_interval + info.ping_timeout);
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                let _ = ws_tx.close().await;
                return "ping timeout".to_string();
            }

            command = command_rx.recv() => match command {
                Some(ChannelCommand::Emit { event, payload }) => {
                    let frame = Packet::event(event, payload).encode();
                    trace!("-> {}", frame);
                    if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                        return format!("send failed: {}", e);
                    }
                }
                Some(ChannelCommand::Close) | None => {
                    let _ = ws_tx.send(Message::Text(Packet::Disconnect.encode())).await;
                    let _ = ws_tx.close().await;
                    return "closed by client".to_string();
                }
            },

            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    trace!("<- {}", text);
                    match Packet::decode(&text) {
                        Ok(Packet::Ping) => {
                            deadline = Instant::now() + liveness;
                            if let Err(e) = ws_tx.send(Message::Text(Packet::Pong.encode())).await {
                                return format!("send failed: {}", e);
                            }
                        }
                        Ok(Packet::Event { name, data }) => route_event(sink, &name, data),
                        Ok(Packet::Disconnect) => return "disconnected by server".to_string(),
                        Ok(Packet::Close) => return "closed by server".to_string(),
                        Ok(other) => trace!("Ignoring packet: {:?}", other),
                        Err(e) => warn!("Undecodable frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(frame))) => return format!("closed by server: {:?}", frame),
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("read failed: {}", e),
                None => return "stream ended".to_string(),
            },
        }
    }
}
