use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::log::log_sink::LogSink;
use crate::transport::transport_event::TransportEvent;
use crate::{sink_debug, sink_info, sink_warn};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Bind the inbound WebSocket listener. Port 0 picks an ephemeral port;
/// read it back with `local_addr` to advertise as `wsPort`.
///
/// # Errors
/// Propagates bind / `set_nonblocking` failure.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept loop: every connection is handed to the event loop as
/// [`TransportEvent::Incoming`] until `running` is cleared.
pub fn spawn_listener<T>(
    listener: TcpListener,
    events: Sender<T>,
    running: Arc<AtomicBool>,
    log: Arc<dyn LogSink>,
) -> Option<JoinHandle<()>>
where
    T: From<TransportEvent> + Send + 'static,
{
    thread::Builder::new()
        .name("ws-listener".into())
        .spawn(move || {
            if let Ok(addr) = listener.local_addr() {
                sink_info!(log, "[Listener] accepting peer connections on {}", addr);
            }
            while running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, remote)) => {
                        if let Err(e) = stream.set_nonblocking(false) {
                            sink_warn!(log, "[Listener] dropping {}: {}", remote, e);
                            continue;
                        }
                        sink_debug!(log, "[Listener] incoming connection from {}", remote);
                        if events
                            .send(T::from(TransportEvent::Incoming { stream, remote }))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                    Err(e) => {
                        sink_warn!(log, "[Listener] accept error: {}", e);
                        thread::sleep(ACCEPT_POLL);
                    }
                }
            }
            sink_debug!(log, "[Listener] stopped");
        })
        .ok()
}
