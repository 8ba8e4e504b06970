//! # Fibonacci Backoff
//!
//! Progressive requeue delays for failing resources. The sequence grows
//! 1m, 1m, 2m, 3m, 5m, 8m, ... capped at the configured maximum, so a
//! persistently failing resource backs off without starving the rest of the
//! queue. A successful reconcile drops the resource's backoff state entirely,
//! so the next failure starts the sequence over.

/// Fibonacci backoff state for one resource.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    previous_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            previous_minutes: 0,
            current_minutes: min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Next delay in seconds, advancing the sequence.
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let minutes = self.current_minutes.min(self.max_minutes);
        let next = (self.previous_minutes + self.current_minutes).min(self.max_minutes);
        self.previous_minutes = self.current_minutes;
        self.current_minutes = next;
        minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_follows_fibonacci_minutes() {
        let mut backoff = FibonacciBackoff::new(1, 60);
        let observed: Vec<u64> = (0..7).map(|_| backoff.next_backoff_seconds() / 60).collect();
        assert_eq!(observed, vec![1, 1, 2, 3, 5, 8, 13]);
    }

    #[test]
    fn sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let observed: Vec<u64> = (0..8).map(|_| backoff.next_backoff_seconds() / 60).collect();
        assert_eq!(observed, vec![1, 1, 2, 3, 5, 8, 10, 10]);
    }

    #[test]
    fn zero_minimum_is_clamped_to_one_minute() {
        let mut backoff = FibonacciBackoff::new(0, 10);
        assert_eq!(backoff.next_backoff_seconds(), 60);
    }
}
