//! Staleness guard for overlapping requests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Proof that a request was issued, checked when its response arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    seq: u64,
}

impl Ticket {
    /// Logical query this ticket belongs to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Position of this request within its key.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Hands out per-key sequence numbers.
///
/// Only the most recently issued ticket for a key is current, so a slow
/// response to an older request can be recognised and dropped.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestSequencer {
    /// Create a sequencer with no issued tickets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket for `key`, making every earlier one stale.
    pub fn issue(&self, key: &str) -> Ticket {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = latest.entry(key.to_string()).or_insert(0);
        *seq += 1;
        Ticket {
            key: key.to_string(),
            seq: *seq,
        }
    }

    /// Whether `ticket` is the latest one issued for its key.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ticket.key)
            .is_some_and(|&seq| seq == ticket.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_ticket_is_current() {
        let seq = RequestSequencer::new();
        let first = seq.issue("historical");
        assert!(seq.is_current(&first));

        let second = seq.issue("historical");
        assert!(!seq.is_current(&first));
        assert!(seq.is_current(&second));
        assert!(second.seq() > first.seq());
    }

    #[test]
    fn test_keys_are_independent() {
        let seq = RequestSequencer::new();
        let a = seq.issue("historical");
        let b = seq.issue("analysis");
        let _a2 = seq.issue("historical");

        assert!(!seq.is_current(&a));
        assert!(seq.is_current(&b));
        assert_eq!(b.key(), "analysis");
    }

    #[test]
    fn test_foreign_ticket_is_not_current() {
        let issuer = RequestSequencer::new();
        let other = RequestSequencer::new();
        let ticket = issuer.issue("historical");
        assert!(!other.is_current(&ticket));
    }
}
