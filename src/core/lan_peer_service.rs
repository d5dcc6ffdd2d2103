use std::net::IpAddr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;

use crate::config::ServiceConfig;
use crate::core::engine::{LocalIdentity, PeerEngine};
use crate::core::loop_event::LoopEvent;
use crate::core::peer_command::PeerCommand;
use crate::core::runtime::{LoopContext, run_peer_loop};
use crate::core::send_error::SendError;
use crate::core::service_error::ServiceError;
use crate::discovery::{DiscoveryError, DiscoverySocket, discovery_worker::spawn_discovery_receiver};
use crate::log::log_sink::LogSink;
use crate::signaling::PeerEvent;
use crate::signaling::envelope::SharedContact;
use crate::transport::listener::{bind_listener, spawn_listener};
use crate::{sink_info, sink_warn};

/// `SKP-` plus five random digits.
#[must_use]
pub fn generate_dialable_number() -> String {
    format!("SKP-{}", rand::thread_rng().gen_range(10_000..=99_999))
}

struct Running {
    identity: LocalIdentity,
    loop_tx: Sender<LoopEvent>,
    flag: Arc<AtomicBool>,
    loop_thread: Option<JoinHandle<()>>,
    io_threads: Vec<JoinHandle<()>>,
}

/// Public face of one LAN peer: start/stop plus fire-and-forget sends.
///
/// Everything that happens arrives on the [`PeerEvent`] receiver returned by
/// [`LanPeerService::new`]. A send to an undiscovered peer is reported there
/// as `PeerUnreachable`.
pub struct LanPeerService {
    cfg: ServiceConfig,
    log: Arc<dyn LogSink>,
    events: Sender<PeerEvent>,
    running: Option<Running>,
}

impl LanPeerService {
    pub fn new(cfg: ServiceConfig, log: Arc<dyn LogSink>) -> (Self, Receiver<PeerEvent>) {
        let (events, rx) = mpsc::channel();
        (
            Self {
                cfg,
                log,
                events,
                running: None,
            },
            rx,
        )
    }

    /// Bind the listener and discovery socket, then spawn the loop.
    ///
    /// # Errors
    /// [`ServiceError::AlreadyRunning`], [`ServiceError::InvalidUsername`],
    /// or the bind/spawn failure. Nothing keeps running on error.
    pub fn start(&mut self, username: &str) -> Result<(), ServiceError> {
        if self.running.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::InvalidUsername);
        }

        let listener =
            bind_listener(self.cfg.connections.listen_addr).map_err(ServiceError::ListenerBind)?;
        let ws_port = listener
            .local_addr()
            .map_err(ServiceError::ListenerBind)?
            .port();
        let discovery = DiscoverySocket::open(&self.cfg.discovery, &self.log)?;
        let recv_socket = discovery
            .try_clone_socket()
            .map_err(|e| ServiceError::DiscoveryBind(DiscoveryError::Socket(e)))?;

        let dialable = self
            .cfg
            .dialable_number
            .clone()
            .unwrap_or_else(generate_dialable_number);
        let identity = LocalIdentity::new(username, ws_port, dialable);
        let engine = PeerEngine::new(identity.clone(), &self.cfg, self.log.clone());

        let (loop_tx, loop_rx) = mpsc::channel::<LoopEvent>();
        let flag = Arc::new(AtomicBool::new(true));
        let ctx = LoopContext {
            discovery,
            loop_tx: loop_tx.clone(),
            events: self.events.clone(),
            connect_timeout: Duration::from_millis(self.cfg.connections.connect_timeout_ms),
            tick: Duration::from_millis(self.cfg.discovery.heartbeat_ms.max(1)),
            log: self.log.clone(),
        };
        let loop_thread = thread::Builder::new()
            .name("peer-loop".into())
            .spawn(move || run_peer_loop(engine, ctx, loop_rx))
            .map_err(ServiceError::Spawn)?;

        let mut io_threads = Vec::new();
        match spawn_listener(listener, loop_tx.clone(), flag.clone(), self.log.clone()) {
            Some(h) => io_threads.push(h),
            None => sink_warn!(self.log, "[Service] listener thread failed to start"),
        }
        match spawn_discovery_receiver(recv_socket, loop_tx.clone(), flag.clone(), self.log.clone()) {
            Some(h) => io_threads.push(h),
            None => sink_warn!(self.log, "[Service] discovery receiver failed to start"),
        }

        sink_info!(
            self.log,
            "[Service] started as {} (ws port {}, {})",
            identity.username,
            identity.ws_port,
            identity.dialable_number
        );
        self.running = Some(Running {
            identity,
            loop_tx,
            flag,
            loop_thread: Some(loop_thread),
            io_threads,
        });
        Ok(())
    }

    /// Announce offline, close every connection and join all threads.
    /// Idempotent.
    pub fn stop(&mut self) {
        let Some(mut run) = self.running.take() else {
            return;
        };
        run.flag.store(false, Ordering::SeqCst);
        let _ = run.loop_tx.send(LoopEvent::Shutdown);
        if let Some(h) = run.loop_thread.take() {
            let _ = h.join();
        }
        for h in run.io_threads.drain(..) {
            let _ = h.join();
        }
        sink_info!(self.log, "[Service] {} stopped", run.identity.username);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.identity.username.as_str())
    }

    /// Port advertised as `wsPort`.
    #[must_use]
    pub fn ws_port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.identity.ws_port)
    }

    #[must_use]
    pub fn dialable_number(&self) -> Option<&str> {
        self.running
            .as_ref()
            .map(|r| r.identity.dialable_number.as_str())
    }

    fn command(&self, cmd: PeerCommand) -> Result<(), SendError> {
        let run = self.running.as_ref().ok_or(SendError::NotRunning)?;
        run.loop_tx
            .send(LoopEvent::Command(cmd))
            .map_err(|_| SendError::NotRunning)
    }

    // ---------------------------------------------------------------
    // Presence
    // ---------------------------------------------------------------

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn set_status(&self, status: &str) -> Result<(), SendError> {
        self.command(PeerCommand::SetStatus(status.to_owned()))
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn probe_peer(&self, ip: IpAddr) -> Result<(), SendError> {
        self.command(PeerCommand::Probe(ip))
    }

    /// Emits a `ContactList` event.
    ///
    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn request_contacts(&self) -> Result<(), SendError> {
        self.command(PeerCommand::RequestContacts)
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn add_contact(&self, peer: &str) -> Result<(), SendError> {
        self.command(PeerCommand::AddContact(peer.to_owned()))
    }

    // ---------------------------------------------------------------
    // Signaling
    // ---------------------------------------------------------------

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_message(&self, to: &str, text: &str) -> Result<(), SendError> {
        self.command(PeerCommand::Message {
            to: to.to_owned(),
            text: text.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_typing(&self, to: &str) -> Result<(), SendError> {
        self.command(PeerCommand::Typing { to: to.to_owned() })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_file_offer(&self, to: &str, file_name: &str, file_size: u64) -> Result<(), SendError> {
        self.command(PeerCommand::FileOffer {
            to: to.to_owned(),
            file_name: file_name.to_owned(),
            file_size,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_file_data(&self, to: &str, file_name: &str, data: Bytes) -> Result<(), SendError> {
        self.command(PeerCommand::FileData {
            to: to.to_owned(),
            file_name: file_name.to_owned(),
            data,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_call_offer(&self, to: &str, call_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::CallOffer {
            to: to.to_owned(),
            call_id: call_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_call_accept(&self, to: &str, call_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::CallAccept {
            to: to.to_owned(),
            call_id: call_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_call_reject(&self, to: &str, call_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::CallReject {
            to: to.to_owned(),
            call_id: call_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_call_end(&self, to: &str, call_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::CallEnd {
            to: to.to_owned(),
            call_id: call_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_group_create(
        &self,
        to: &str,
        group_id: &str,
        group_name: &str,
        members: Vec<String>,
    ) -> Result<(), SendError> {
        self.command(PeerCommand::GroupCreate {
            to: to.to_owned(),
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            members,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_group_message(&self, to: &str, group_id: &str, text: &str) -> Result<(), SendError> {
        self.command(PeerCommand::GroupMessage {
            to: to.to_owned(),
            group_id: group_id.to_owned(),
            text: text.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_group_typing(&self, to: &str, group_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::GroupTyping {
            to: to.to_owned(),
            group_id: group_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_group_invite(
        &self,
        to: &str,
        group_id: &str,
        group_name: &str,
        members: Vec<String>,
    ) -> Result<(), SendError> {
        self.command(PeerCommand::GroupInvite {
            to: to.to_owned(),
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            members,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_group_leave(&self, to: &str, group_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::GroupLeave {
            to: to.to_owned(),
            group_id: group_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_contact_share(&self, to: &str, contact: SharedContact) -> Result<(), SendError> {
        self.command(PeerCommand::ContactShare {
            to: to.to_owned(),
            contact,
        })
    }

    // ---------------------------------------------------------------
    // Media
    // ---------------------------------------------------------------

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_audio(&self, to: &str, payload: Bytes) -> Result<(), SendError> {
        self.command(PeerCommand::Audio {
            to: to.to_owned(),
            payload,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_video(&self, to: &str, payload: Bytes) -> Result<(), SendError> {
        self.command(PeerCommand::Video {
            to: to.to_owned(),
            payload,
        })
    }

    /// Create a conference hosted here and invite `participants`. Blocks
    /// until the loop has assigned the id.
    ///
    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn create_conference(&self, participants: Vec<String>) -> Result<String, SendError> {
        let (reply, rx) = mpsc::channel();
        self.command(PeerCommand::CreateConference {
            participants,
            reply,
        })?;
        rx.recv().map_err(|_| SendError::NotRunning)?
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn join_conference(&self, conference_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::JoinConference {
            conference_id: conference_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn leave_conference(&self, conference_id: &str) -> Result<(), SendError> {
        self.command(PeerCommand::LeaveConference {
            conference_id: conference_id.to_owned(),
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_conference_audio(&self, conference_id: &str, payload: Bytes) -> Result<(), SendError> {
        self.command(PeerCommand::ConferenceAudio {
            conference_id: conference_id.to_owned(),
            payload,
        })
    }

    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn send_conference_video(&self, conference_id: &str, payload: Bytes) -> Result<(), SendError> {
        self.command(PeerCommand::ConferenceVideo {
            conference_id: conference_id.to_owned(),
            payload,
        })
    }
}

impl Drop for LanPeerService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;

    #[test]
    fn dialable_numbers_have_five_digits() {
        for _ in 0..50 {
            let n = generate_dialable_number();
            let digits = n.strip_prefix("SKP-").expect("prefix");
            assert_eq!(digits.len(), 5);
            let v: u32 = digits.parse().unwrap();
            assert!((10_000..=99_999).contains(&v));
        }
    }

    #[test]
    fn sends_before_start_are_refused() {
        let (svc, _events) = LanPeerService::new(ServiceConfig::default(), Arc::new(NoopLogSink));
        assert_eq!(svc.send_message("bob", "hi"), Err(SendError::NotRunning));
        assert_eq!(svc.create_conference(vec!["bob".into()]), Err(SendError::NotRunning));
        assert!(!svc.is_running());
    }

    #[test]
    fn empty_username_is_rejected() {
        let (mut svc, _events) = LanPeerService::new(ServiceConfig::default(), Arc::new(NoopLogSink));
        assert!(matches!(svc.start("  "), Err(ServiceError::InvalidUsername)));
        assert!(!svc.is_running());
        svc.stop();
    }
}
