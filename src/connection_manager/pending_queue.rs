use std::collections::{HashMap, VecDeque};

/// Encoded envelopes waiting for a peer's outbound connection to open.
#[derive(Debug, Default)]
pub struct PendingQueues {
    queues: HashMap<String, VecDeque<String>>,
}

impl PendingQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, peer: &str, envelope_json: String) {
        self.queues
            .entry(peer.to_owned())
            .or_default()
            .push_back(envelope_json);
    }

    /// Remove and return the queue in send order. A second call returns
    /// nothing until new envelopes are pushed.
    pub fn take(&mut self, peer: &str) -> Vec<String> {
        self.queues
            .remove(peer)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop the queue; returns how many envelopes were discarded.
    pub fn discard(&mut self, peer: &str) -> usize {
        self.queues.remove(peer).map_or(0, |q| q.len())
    }

    #[must_use]
    pub fn len(&self, peer: &str) -> usize {
        self.queues.get(peer).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
