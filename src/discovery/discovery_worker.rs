use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
};
use std::thread::{self, JoinHandle};

use crate::log::log_sink::LogSink;
use crate::{sink_debug, sink_warn};

/// Largest datagram read; announcements are far smaller.
const MAX_DATAGRAM: usize = 8 * 1024;

/// One datagram read from the discovery port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryDatagram {
    pub payload: Vec<u8>,
    pub from: SocketAddr,
}

/// Spawn the `discovery-recv` thread. It forwards every datagram as
/// `T::from(DiscoveryDatagram)` until `running` is cleared or the receiver
/// hangs up. The socket must carry a read timeout.
pub fn spawn_discovery_receiver<T>(
    socket: UdpSocket,
    tx: Sender<T>,
    running: Arc<AtomicBool>,
    log: Arc<dyn LogSink>,
) -> Option<JoinHandle<()>>
where
    T: From<DiscoveryDatagram> + Send + 'static,
{
    thread::Builder::new()
        .name("discovery-recv".into())
        .spawn(move || {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            while running.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf) {
                    Ok((n, from)) => {
                        let dgram = DiscoveryDatagram {
                            payload: buf[..n].to_vec(),
                            from,
                        };
                        if tx.send(T::from(dgram)).is_err() {
                            break;
                        }
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        sink_warn!(log, "[Discovery] recv error: {}", e);
                        thread::sleep(crate::discovery::discovery_socket::RECV_POLL);
                    }
                }
            }
            sink_debug!(log, "[Discovery] receiver stopped");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn forwards_datagrams_until_stopped() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let addr = socket.local_addr().unwrap();

        let (tx, rx) = mpsc::channel::<DiscoveryDatagram>();
        let running = Arc::new(AtomicBool::new(true));
        let handle =
            spawn_discovery_receiver(socket, tx, running.clone(), Arc::new(NoopLogSink)).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"{\"type\":\"discovery\"}", addr).unwrap();

        let got = rx.recv_timeout(Duration::from_secs(2)).expect("datagram forwarded");
        assert_eq!(got.payload, b"{\"type\":\"discovery\"}");
        assert_eq!(got.from, sender.local_addr().unwrap());

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
