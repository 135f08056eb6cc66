//! Collection round counter
//!
//! Assigns a monotonically increasing sequence number to each upload batch
//! per monitored host. Lives in process memory only; on the first upload
//! after a restart the caller seeds it from the highest round already in
//! history so numbering stays monotonic across restarts.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct RoundCounter {
    rounds: Mutex<HashMap<String, i64>>,
}

impl RoundCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next round number for a host. Strictly increasing per host,
    /// starting at 1; never skips or duplicates under concurrent callers.
    pub fn next_round(&self, agent_id: &str) -> i64 {
        let mut rounds = self.rounds.lock();
        let entry = rounds.entry(agent_id.to_string()).or_insert(0);
        *entry += 1;
        tracing::debug!("Agent {} next collection round: {}", agent_id, *entry);
        *entry
    }

    /// Last-issued round for a host, 0 if none.
    pub fn current_round(&self, agent_id: &str) -> i64 {
        *self.rounds.lock().get(agent_id).unwrap_or(&0)
    }

    /// Raise the counter to at least `floor`. Used to resume numbering from
    /// persisted history after a restart; lowering is a no-op.
    pub fn ensure_at_least(&self, agent_id: &str, floor: i64) {
        let mut rounds = self.rounds.lock();
        let entry = rounds.entry(agent_id.to_string()).or_insert(0);
        if floor > *entry {
            *entry = floor;
        }
    }

    pub fn reset(&self, agent_id: &str) {
        self.rounds.lock().insert(agent_id.to_string(), 0);
        tracing::info!("Agent {} collection round reset to 0", agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_at_one_and_increments() {
        let counter = RoundCounter::new();
        assert_eq!(counter.current_round("h1"), 0);
        assert_eq!(counter.next_round("h1"), 1);
        assert_eq!(counter.next_round("h1"), 2);
        assert_eq!(counter.current_round("h1"), 2);
    }

    #[test]
    fn hosts_are_independent() {
        let counter = RoundCounter::new();
        counter.next_round("h1");
        counter.next_round("h1");
        assert_eq!(counter.next_round("h2"), 1);
        assert_eq!(counter.current_round("h1"), 2);
    }

    #[test]
    fn reset_restarts_numbering() {
        let counter = RoundCounter::new();
        counter.next_round("h1");
        counter.reset("h1");
        assert_eq!(counter.current_round("h1"), 0);
        assert_eq!(counter.next_round("h1"), 1);
    }

    #[test]
    fn ensure_at_least_never_lowers() {
        let counter = RoundCounter::new();
        counter.ensure_at_least("h1", 40);
        assert_eq!(counter.next_round("h1"), 41);
        counter.ensure_at_least("h1", 10);
        assert_eq!(counter.next_round("h1"), 42);
    }

    #[test]
    fn concurrent_issuance_has_no_gaps_or_duplicates() {
        let counter = Arc::new(RoundCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                (0..50).map(|_| counter.next_round("h1")).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for round in handle.join().unwrap() {
                assert!(seen.insert(round), "duplicate round {}", round);
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(*seen.iter().min().unwrap(), 1);
        assert_eq!(*seen.iter().max().unwrap(), 400);
    }
}
