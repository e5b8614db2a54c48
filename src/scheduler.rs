//! Keyed minimum-interval gate.
//!
//! Gossip rounds are paced by calling `check` at the top of request
//! handlers: whatever the request rate, a key fires at most once per
//! configured interval. The scheduler is pure in-memory state and is
//! never persisted; a restart simply lets every key fire again.

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
struct Gate {
  interval: Duration,
  last: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
  gates: HashMap<String, Gate>,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers or overwrites a key. The last-fire time starts unset,
  /// so the first `check` after configuration always passes.
  pub fn configure(&mut self, key: &str, interval: Duration) {
    self.gates.insert(key.to_owned(), Gate {
      interval,
      last: None,
    });
  }

  /// Like [`configure`](Self::configure), but seeds the last-fire
  /// time, delaying the first pass by the full interval.
  pub fn configure_at(&mut self, key: &str, interval: Duration, at: Instant) {
    self.gates.insert(key.to_owned(), Gate {
      interval,
      last: Some(at),
    });
  }

  /// Returns true and stamps the key iff more than the configured
  /// interval has elapsed since the last pass. Unknown keys never
  /// pass.
  pub fn check(&mut self, key: &str) -> bool {
    self.check_at(key, Instant::now())
  }

  pub fn check_at(&mut self, key: &str, now: Instant) -> bool {
    let gate = match self.gates.get_mut(key) {
      Some(gate) => gate,
      None => return false,
    };

    let due = match gate.last {
      None => true,
      Some(last) => now.saturating_duration_since(last) > gate.interval,
    };

    if due {
      gate.last = Some(now);
    }
    due
  }
}
