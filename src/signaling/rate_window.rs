use std::collections::{HashMap, VecDeque};

/// Accepted-message timestamps for one sender over a rolling window.
#[derive(Debug, Default)]
pub struct RateWindow {
    stamps: VecDeque<u64>,
}

impl RateWindow {
    /// Prune entries older than `window_ms`, then admit and record the
    /// message if fewer than `max` remain. A rejected message is not recorded,
    /// so a flood does not extend its own penalty.
    pub fn admit(&mut self, now_ms: u64, max: usize, window_ms: u64) -> bool {
        while let Some(&first) = self.stamps.front() {
            if now_ms.saturating_sub(first) > window_ms {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        if self.stamps.len() >= max {
            return false;
        }
        self.stamps.push_back(now_ms);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Per-sender rate windows keyed by claimed username.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, RateWindow>,
    max: usize,
    window_ms: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max: usize, window_ms: u64) -> Self {
        Self {
            windows: HashMap::new(),
            max,
            window_ms,
        }
    }

    pub fn admit(&mut self, sender: &str, now_ms: u64) -> bool {
        let (max, window) = (self.max, self.window_ms);
        match self.windows.get_mut(sender) {
            Some(w) => w.admit(now_ms, max, window),
            None => {
                let mut w = RateWindow::default();
                let ok = w.admit(now_ms, max, window);
                self.windows.insert(sender.to_owned(), w);
                ok
            }
        }
    }

    pub fn forget(&mut self, sender: &str) {
        self.windows.remove(sender);
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_per_minute_then_drop() {
        let mut rl = RateLimiter::new(30, 60_000);
        for i in 0..30 {
            assert!(rl.admit("bob", i * 100), "message {} admitted", i + 1);
        }
        assert!(!rl.admit("bob", 3_000), "31st inside the window is dropped");
        assert!(!rl.admit("bob", 59_000));
        assert!(rl.admit("carol", 3_000), "other senders are unaffected");
    }

    #[test]
    fn window_slides() {
        let mut rl = RateLimiter::new(2, 60_000);
        assert!(rl.admit("bob", 0));
        assert!(rl.admit("bob", 10_000));
        assert!(!rl.admit("bob", 60_000), "first stamp is exactly 60s old: still counted");
        assert!(rl.admit("bob", 60_001));
        assert!(!rl.admit("bob", 60_002));
        assert!(rl.admit("bob", 70_001));
    }

    #[test]
    fn dropped_messages_are_not_recorded() {
        let mut w = RateWindow::default();
        assert!(w.admit(0, 1, 1_000));
        for t in 1..100 {
            assert!(!w.admit(t * 10, 1, 1_000));
        }
        assert_eq!(w.len(), 1);
        assert!(w.admit(1_001, 1, 1_000));
    }
}
