use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::connection_manager::ConnId;
use crate::core::engine::PeerEngine;
use crate::core::loop_event::LoopEvent;
use crate::discovery::DiscoverySocket;
use crate::log::{log_sink::LogSink, now_millis};
use crate::signaling::PeerEvent;
use crate::transport::net_action::{CloseReason, NetAction};
use crate::transport::transport_event::TransportEvent;
use crate::transport::ws_connection::{WsCommand, WsWorker, spawn_inbound, spawn_outbound};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Wall-clock milliseconds as the engine's time base.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(now_millis()).unwrap_or(u64::MAX)
}

const WORKER_NOT_STARTED: &str = "worker thread not started";

/// Post `failure` into the loop for a worker whose thread never started.
/// Returns whether it was posted.
fn report_unstarted(worker: &WsWorker, failure: TransportEvent, loop_tx: &Sender<LoopEvent>) -> bool {
    if worker.handle.is_some() {
        return false;
    }
    let _ = loop_tx.send(LoopEvent::from(failure));
    true
}

/// Everything the loop needs besides the engine and its inbox.
pub struct LoopContext {
    pub discovery: DiscoverySocket,
    /// Clone of the inbox sender, handed to connection workers.
    pub loop_tx: Sender<LoopEvent>,
    pub events: Sender<PeerEvent>,
    pub connect_timeout: Duration,
    /// Heartbeat and sweep period.
    pub tick: Duration,
    pub log: Arc<dyn LogSink>,
}

/// Central peer loop: owns the engine and one worker per connection.
///
/// Runs until [`LoopEvent::Shutdown`] or until every sender is gone, then
/// stops the engine (offline announce, close all) and joins the workers.
pub fn run_peer_loop(mut engine: PeerEngine, ctx: LoopContext, rx: Receiver<LoopEvent>) {
    let mut rt = Runtime {
        ctx,
        workers: HashMap::new(),
        retired: Vec::new(),
    };

    let actions = engine.start();
    rt.execute(actions);
    rt.forward(&mut engine);

    let mut next_tick = Instant::now() + rt.ctx.tick;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(LoopEvent::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(ev) => {
                let actions = rt.handle(&mut engine, ev);
                rt.execute(actions);
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if Instant::now() >= next_tick {
            let mut actions = engine.on_heartbeat();
            actions.extend(engine.on_sweep(now_ms()));
            rt.execute(actions);
            rt.reap();
            next_tick = Instant::now() + rt.ctx.tick;
        }
        rt.forward(&mut engine);
    }

    let actions = engine.stop();
    rt.execute(actions);
    rt.forward(&mut engine);
    rt.shutdown();
}

struct Runtime {
    ctx: LoopContext,
    workers: HashMap<ConnId, WsWorker>,
    /// Workers told to close, joined on the next reap or at shutdown.
    retired: Vec<JoinHandle<()>>,
}

impl Runtime {
    fn handle(&mut self, engine: &mut PeerEngine, ev: LoopEvent) -> Vec<NetAction> {
        let now = now_ms();
        match ev {
            LoopEvent::Command(cmd) => engine.apply_command(cmd, now),
            LoopEvent::Discovery(d) => engine.on_discovery_datagram(&d.payload, d.from.ip(), now),
            LoopEvent::Transport(TransportEvent::Incoming { stream, remote }) => {
                let conn = engine.on_inbound(remote, now);
                let worker = spawn_inbound(
                    conn,
                    stream,
                    self.ctx.loop_tx.clone(),
                    self.ctx.log.clone(),
                );
                let unstarted = TransportEvent::Closed {
                    conn,
                    reason: WORKER_NOT_STARTED.into(),
                };
                if report_unstarted(&worker, unstarted, &self.ctx.loop_tx) {
                    sink_warn!(self.ctx.log, "[Runtime] conn {}: inbound worker not started", conn);
                }
                self.workers.insert(conn, worker);
                Vec::new()
            }
            LoopEvent::Transport(TransportEvent::Opened { conn }) => engine.on_connected(conn),
            LoopEvent::Transport(TransportEvent::ConnectFailed { conn, reason }) => {
                engine.on_connect_failed(conn, &reason);
                self.retire(conn);
                Vec::new()
            }
            LoopEvent::Transport(TransportEvent::Text { conn, text }) => engine.on_text(conn, &text, now),
            LoopEvent::Transport(TransportEvent::Binary { conn, data }) => {
                engine.on_binary(conn, &data);
                Vec::new()
            }
            LoopEvent::Transport(TransportEvent::Closed { conn, reason }) => {
                engine.on_closed(conn, &reason);
                self.retire(conn);
                Vec::new()
            }
            LoopEvent::Shutdown => Vec::new(),
        }
    }

    fn execute(&mut self, actions: Vec<NetAction>) {
        for action in actions {
            match action {
                NetAction::Connect {
                    conn,
                    peer,
                    addr,
                    url,
                } => {
                    sink_debug!(self.ctx.log, "[Runtime] conn {}: dialing {} at {}", conn, peer, url);
                    let worker = spawn_outbound(
                        conn,
                        addr,
                        url,
                        self.ctx.connect_timeout,
                        self.ctx.loop_tx.clone(),
                        self.ctx.log.clone(),
                    );
                    let unstarted = TransportEvent::ConnectFailed {
                        conn,
                        reason: WORKER_NOT_STARTED.into(),
                    };
                    if report_unstarted(&worker, unstarted, &self.ctx.loop_tx) {
                        sink_warn!(self.ctx.log, "[Runtime] conn {}: outbound worker not started", conn);
                    }
                    self.workers.insert(conn, worker);
                }
                NetAction::SendText { conn, text } => self.send(conn, WsCommand::Text(text)),
                NetAction::SendBinary { conn, data } => self.send(conn, WsCommand::Binary(data)),
                NetAction::Close { conn, reason } => {
                    if let Some(worker) = self.workers.remove(&conn) {
                        let _ = worker.tx.send(WsCommand::Close(reason));
                        self.retired.extend(worker.handle);
                    }
                }
                NetAction::Announce { payload } => {
                    let sent = self.ctx.discovery.announce(&payload, &self.ctx.log);
                    if sent == 0 {
                        sink_warn!(self.ctx.log, "[Runtime] discovery announce reached no destination");
                    }
                }
                NetAction::Probe { ip, payload } => {
                    if let Err(e) = self.ctx.discovery.probe(ip, &payload) {
                        sink_warn!(self.ctx.log, "[Runtime] probe to {} failed: {}", ip, e);
                    }
                }
            }
        }
    }

    fn send(&self, conn: ConnId, cmd: WsCommand) {
        match self.workers.get(&conn) {
            Some(worker) => {
                if worker.tx.send(cmd).is_err() {
                    sink_debug!(self.ctx.log, "[Runtime] conn {}: worker gone", conn);
                }
            }
            None => sink_trace!(self.ctx.log, "[Runtime] conn {}: no worker", conn),
        }
    }

    fn retire(&mut self, conn: ConnId) {
        if let Some(worker) = self.workers.remove(&conn) {
            self.retired.extend(worker.handle);
        }
    }

    /// Join workers that already exited.
    fn reap(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(JoinHandle::is_finished);
        self.retired = running;
        for handle in done {
            let _ = handle.join();
        }
    }

    fn forward(&self, engine: &mut PeerEngine) {
        for ev in engine.drain_events() {
            if self.ctx.events.send(ev).is_err() {
                sink_trace!(self.ctx.log, "[Runtime] event receiver dropped");
            }
        }
    }

    fn shutdown(mut self) {
        let workers: Vec<WsWorker> = self.workers.drain().map(|(_, w)| w).collect();
        for worker in &workers {
            let _ = worker
                .tx
                .send(WsCommand::Close(CloseReason::normal("peer shutting down")));
        }
        let count = workers.len() + self.retired.len();
        for handle in workers
            .into_iter()
            .filter_map(|w| w.handle)
            .chain(self.retired.drain(..))
        {
            let _ = handle.join();
        }
        sink_info!(self.ctx.log, "[Runtime] peer loop stopped ({} workers joined)", count);
    }
}
