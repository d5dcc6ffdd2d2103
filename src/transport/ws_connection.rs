//! One worker thread per WebSocket connection.
//!
//! The worker owns the socket. It polls its command channel between short
//! read timeouts, so sends never wait on the event loop and the loop never
//! blocks on the socket. Every outcome is reported as a [`TransportEvent`].

use std::borrow::Cow;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::{Message, WebSocket};

use crate::connection_manager::conn_state::ConnId;
use crate::log::log_sink::LogSink;
use crate::transport::{net_action::CloseReason, transport_event::TransportEvent};
use crate::{sink_debug, sink_trace, sink_warn};

/// Read timeout between command-channel polls.
const POLL: Duration = Duration::from_millis(10);
/// How long to wait for the remote's close reply.
const CLOSE_GRACE: Duration = Duration::from_millis(500);
/// Bound on the server-side handshake of an accepted socket.
const ACCEPT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Instruction for a connection worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsCommand {
    Text(String),
    Binary(Bytes),
    Close(CloseReason),
}

/// Handle kept by the event loop for one worker.
pub struct WsWorker {
    pub tx: Sender<WsCommand>,
    pub handle: Option<JoinHandle<()>>,
}

impl WsWorker {
    /// Ask the worker to close and wait for it to exit.
    pub fn close_and_join(self, reason: CloseReason) {
        let Self { tx, handle } = self;
        let _ = tx.send(WsCommand::Close(reason));
        drop(tx);
        if let Some(h) = handle {
            let _ = h.join();
        }
    }
}

/// Connect to `addr`, run the client handshake for `url`, then pump.
pub fn spawn_outbound<T>(
    conn: ConnId,
    addr: SocketAddr,
    url: String,
    connect_timeout: Duration,
    events: Sender<T>,
    log: Arc<dyn LogSink>,
) -> WsWorker
where
    T: From<TransportEvent> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("ws-out-{conn}"))
        .spawn(move || {
            let ws = match connect(addr, &url, connect_timeout) {
                Ok(ws) => ws,
                Err(reason) => {
                    sink_debug!(log, "[conn {}] connect to {} failed: {}", conn, url, reason);
                    let _ = events.send(T::from(TransportEvent::ConnectFailed { conn, reason }));
                    return;
                }
            };
            if events
                .send(T::from(TransportEvent::Opened { conn }))
                .is_err()
            {
                return;
            }
            pump(conn, ws, &rx, &events, &log);
        })
        .ok();
    WsWorker { tx, handle }
}

/// Run the server handshake on an accepted stream, then pump.
pub fn spawn_inbound<T>(
    conn: ConnId,
    stream: TcpStream,
    events: Sender<T>,
    log: Arc<dyn LogSink>,
) -> WsWorker
where
    T: From<TransportEvent> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("ws-in-{conn}"))
        .spawn(move || {
            let _ = stream.set_nodelay(true);
            let _ = stream.set_read_timeout(Some(ACCEPT_HANDSHAKE_TIMEOUT));
            let ws = match tungstenite::accept(stream) {
                Ok(ws) => ws,
                Err(e) => {
                    sink_debug!(log, "[conn {}] inbound handshake failed: {}", conn, e);
                    let _ = events.send(T::from(TransportEvent::Closed {
                        conn,
                        reason: format!("handshake failed: {e}"),
                    }));
                    return;
                }
            };
            pump(conn, ws, &rx, &events, &log);
        })
        .ok();
    WsWorker { tx, handle }
}

fn connect(addr: SocketAddr, url: &str, timeout: Duration) -> Result<WebSocket<TcpStream>, String> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| e.to_string())?;
    stream.set_nodelay(true).map_err(|e| e.to_string())?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|e| e.to_string())?;
    let (ws, _response) = tungstenite::client(url, stream).map_err(|e| e.to_string())?;
    Ok(ws)
}

fn close_frame(reason: &CloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: if reason.policy_violation {
            CloseCode::Policy
        } else {
            CloseCode::Normal
        },
        reason: Cow::Owned(reason.text.clone()),
    }
}

fn pump<T>(
    conn: ConnId,
    mut ws: WebSocket<TcpStream>,
    commands: &Receiver<WsCommand>,
    events: &Sender<T>,
    log: &Arc<dyn LogSink>,
) where
    T: From<TransportEvent>,
{
    if let Err(e) = ws.get_mut().set_read_timeout(Some(POLL)) {
        sink_warn!(log, "[conn {}] cannot set read timeout: {}", conn, e);
    }

    let mut closing_since: Option<Instant> = None;
    let reason = 'outer: loop {
        loop {
            match commands.try_recv() {
                Ok(_) if closing_since.is_some() => {}
                Ok(WsCommand::Text(text)) => {
                    if let Err(e) = ws.send(Message::Text(text)) {
                        break 'outer format!("send failed: {e}");
                    }
                }
                Ok(WsCommand::Binary(data)) => {
                    if let Err(e) = ws.send(Message::Binary(data.to_vec())) {
                        break 'outer format!("send failed: {e}");
                    }
                }
                Ok(WsCommand::Close(reason)) => {
                    sink_trace!(log, "[conn {}] closing: {}", conn, reason.text);
                    let _ = ws.close(Some(close_frame(&reason)));
                    closing_since = Some(Instant::now());
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if closing_since.is_none() {
                        let _ = ws.close(None);
                        closing_since = Some(Instant::now());
                    }
                    break;
                }
            }
        }

        if closing_since.is_some_and(|t| t.elapsed() > CLOSE_GRACE) {
            break "closed locally".to_owned();
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                if events.send(T::from(TransportEvent::Text { conn, text })).is_err() {
                    break "event loop gone".to_owned();
                }
            }
            Ok(Message::Binary(data)) => {
                let data = Bytes::from(data);
                if events.send(T::from(TransportEvent::Binary { conn, data })).is_err() {
                    break "event loop gone".to_owned();
                }
            }
            // Close replies and pongs are queued by tungstenite itself.
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                break "closed".to_owned();
            }
            Err(e) => break e.to_string(),
        }
    };

    sink_debug!(log, "[conn {}] worker exiting: {}", conn, reason);
    let _ = events.send(T::from(TransportEvent::Closed { conn, reason }));
}
