use crate::core::peer_command::PeerCommand;
use crate::discovery::discovery_worker::DiscoveryDatagram;
use crate::transport::transport_event::TransportEvent;

/// Single inbox of the peer event loop.
#[derive(Debug)]
pub enum LoopEvent {
    Command(PeerCommand),
    Discovery(DiscoveryDatagram),
    Transport(TransportEvent),
    Shutdown,
}

impl From<PeerCommand> for LoopEvent {
    fn from(cmd: PeerCommand) -> Self {
        Self::Command(cmd)
    }
}

impl From<DiscoveryDatagram> for LoopEvent {
    fn from(d: DiscoveryDatagram) -> Self {
        Self::Discovery(d)
    }
}

impl From<TransportEvent> for LoopEvent {
    fn from(ev: TransportEvent) -> Self {
        Self::Transport(ev)
    }
}
