//! Duplicate suppression for chat deliveries.
//!
//! A message is identified by its sender name and the sender's millisecond
//! timestamp. Keys are remembered for a fixed horizon and then evicted in
//! arrival order, so memory is bounded by the chat rate rather than the
//! session length.

use shared::{ChatKey, ChatMessage};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Longer than any plausible relay delay.
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct MessageFilter {
    horizon: Duration,
    seen: HashMap<ChatKey, Instant>,
    order: VecDeque<(Instant, ChatKey)>,
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON)
    }
}

impl MessageFilter {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// True the first time a key is seen within the horizon.
    pub fn should_deliver(&mut self, msg: &ChatMessage, now: Instant) -> bool {
        self.evict(now);

        let key = msg.key();
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key.clone(), now);
        self.order.push_back((now, key));
        true
    }

    fn evict(&mut self, now: Instant) {
        while let Some((at, _)) = self.order.front() {
            if now.saturating_duration_since(*at) < self.horizon {
                break;
            }
            if let Some((_, key)) = self.order.pop_front() {
                self.seen.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
