//! Typing indicator debounce.
//!
//! Typing signals are fire-and-forget; the receiver decides when a peer has
//! stopped typing by letting a quiet interval pass without a new signal.

use chat_types::UserId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks which peers typed recently.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    quiet: Duration,
    last_signal: HashMap<UserId, Instant>,
}

impl TypingIndicator {
    /// Create an indicator that clears a peer after `quiet` without signals.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_signal: HashMap::new(),
        }
    }

    /// Record a typing signal from `user` observed at `now`.
    pub fn observe(&mut self, user: UserId, now: Instant) {
        self.last_signal.insert(user, now);
    }

    /// Check if `user` is typing as of `now`.
    pub fn is_typing(&self, user: &UserId, now: Instant) -> bool {
        self.last_signal
            .get(user)
            .is_some_and(|at| now.saturating_duration_since(*at) < self.quiet)
    }

    /// Users typing as of `now`, sorted. Expired entries are dropped.
    pub fn active(&mut self, now: Instant) -> Vec<UserId> {
        let quiet = self.quiet;
        self.last_signal
            .retain(|_, at| now.saturating_duration_since(*at) < quiet);
        let mut users: Vec<UserId> = self.last_signal.keys().cloned().collect();
        users.sort();
        users
    }

    /// Forget `user`, e.g. because their message arrived.
    pub fn clear(&mut self, user: &UserId) {
        self.last_signal.remove(user);
    }

    /// Forget everyone.
    pub fn reset(&mut self) {
        self.last_signal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_expires_after_quiet_interval() {
        let mut typing = TypingIndicator::new(Duration::from_secs(3));
        let start = Instant::now();
        let u2 = UserId::new("u2");

        typing.observe(u2.clone(), start);
        assert!(typing.is_typing(&u2, start + Duration::from_secs(2)));
        assert!(!typing.is_typing(&u2, start + Duration::from_secs(3)));
        assert!(typing.active(start + Duration::from_secs(4)).is_empty());
    }

    #[test]
    fn new_signal_extends_the_interval() {
        let mut typing = TypingIndicator::new(Duration::from_secs(3));
        let start = Instant::now();
        let u2 = UserId::new("u2");

        typing.observe(u2.clone(), start);
        typing.observe(u2.clone(), start + Duration::from_secs(2));
        assert_eq!(typing.active(start + Duration::from_secs(4)), vec![u2]);
    }

    #[test]
    fn clear_removes_user() {
        let mut typing = TypingIndicator::new(Duration::from_secs(3));
        let now = Instant::now();
        let u2 = UserId::new("u2");

        typing.observe(u2.clone(), now);
        typing.clear(&u2);
        assert!(!typing.is_typing(&u2, now));
    }
}
