use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::DiscoveryConfig;
use crate::discovery::discovery_error::DiscoveryError;
use crate::log::log_sink::LogSink;
use crate::{sink_debug, sink_info, sink_warn};

/// Receive timeout so the worker can observe its stop flag.
pub const RECV_POLL: Duration = Duration::from_millis(200);

/// The bound discovery port plus where announcements go.
pub struct DiscoverySocket {
    socket: UdpSocket,
    multicast: SocketAddr,
    broadcast: Option<SocketAddr>,
    port: u16,
    multicast_joined: bool,
}

impl DiscoverySocket {
    /// Bind `0.0.0.0:port` with address reuse so several instances can share
    /// a host, enable broadcast, and join the multicast group. A failed join
    /// is logged and leaves broadcast as the only path.
    ///
    /// # Errors
    /// [`DiscoveryError::Socket`] if the socket cannot be created or
    /// configured, [`DiscoveryError::Bind`] if the port is unavailable.
    pub fn open(cfg: &DiscoveryConfig, log: &Arc<dyn LogSink>) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_broadcast(true)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(1)?;

        let bind = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, cfg.port));
        socket
            .bind(&bind.into())
            .map_err(|source| DiscoveryError::Bind {
                port: cfg.port,
                source,
            })?;

        let multicast_joined = match socket.join_multicast_v4(&cfg.multicast_group, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => true,
            Err(e) => {
                sink_warn!(
                    log,
                    "[Discovery] multicast join {} failed: {} (broadcast only)",
                    cfg.multicast_group,
                    e
                );
                false
            }
        };

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(RECV_POLL))?;

        let port = socket.local_addr()?.port();
        sink_info!(
            log,
            "[Discovery] bound on udp/{} (multicast {}: {})",
            port,
            cfg.multicast_group,
            if multicast_joined { "joined" } else { "off" }
        );

        Ok(Self {
            socket,
            multicast: SocketAddr::new(IpAddr::V4(cfg.multicast_group), port),
            broadcast: cfg
                .broadcast
                .then(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port)),
            port,
            multicast_joined,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn multicast_joined(&self) -> bool {
        self.multicast_joined
    }

    /// Independent handle for the receive worker.
    ///
    /// # Errors
    /// Propagates `try_clone` failure.
    pub fn try_clone_socket(&self) -> io::Result<UdpSocket> {
        self.socket.try_clone()
    }

    /// Send `payload` to the multicast group and, if enabled, to the subnet
    /// broadcast address. Returns how many destinations accepted it.
    pub fn announce(&self, payload: &[u8], log: &Arc<dyn LogSink>) -> usize {
        let mut sent = 0;
        for dest in std::iter::once(self.multicast).chain(self.broadcast) {
            match self.socket.send_to(payload, dest) {
                Ok(_) => sent += 1,
                Err(e) => sink_debug!(log, "[Discovery] send to {} failed: {}", dest, e),
            }
        }
        sent
    }

    /// Unicast `payload` to `ip` on the discovery port.
    ///
    /// # Errors
    /// Propagates the socket error.
    pub fn probe(&self, ip: IpAddr, payload: &[u8]) -> io::Result<()> {
        self.socket
            .send_to(payload, SocketAddr::new(ip, self.port))
            .map(|_| ())
    }
}
