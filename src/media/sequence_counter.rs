use std::collections::HashMap;
use std::hash::Hash;

/// Monotonic, wrapping sequence number for one outgoing media stream.
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value and advance.
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }

    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Independent counters keyed by stream, e.g. `(peer, MediaKind)` or
/// `(conference_id, MediaKind)`, so concurrent calls never share a space.
#[derive(Debug)]
pub struct SequenceSpace<K> {
    counters: HashMap<K, SequenceCounter>,
}

impl<K> Default for SequenceSpace<K> {
    fn default() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> SequenceSpace<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_seq(&mut self, key: K) -> u32 {
        self.counters.entry(key).or_default().next_seq()
    }

    /// Drop every counter matching `pred` (a peer went away, a conference ended).
    pub fn forget_where<F: FnMut(&K) -> bool>(&mut self, mut pred: F) {
        self.counters.retain(|k, _| !pred(k));
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
