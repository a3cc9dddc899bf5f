use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window limit on automatic restarts after a crash.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    window: Duration,
    max: u32,
    attempts: VecDeque<Instant>,
}

impl RestartPolicy {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            attempts: VecDeque::new(),
        }
    }

    /// Claim a restart slot at `now`; `false` once the window is used up.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.attempts.front() {
            if now.duration_since(oldest) >= self.window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }

        if self.attempts.len() as u32 >= self.max {
            return false;
        }
        self.attempts.push_back(now);
        true
    }

    /// Forget past attempts (explicit start by a caller).
    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_restart_per_window() {
        let mut policy = RestartPolicy::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();

        assert!(policy.try_acquire(t0));
        assert!(!policy.try_acquire(t0 + Duration::from_secs(5)));
        assert!(!policy.try_acquire(t0 + Duration::from_secs(59)));
        // Window rolled past the first attempt
        assert!(policy.try_acquire(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_disables_restarts() {
        let mut policy = RestartPolicy::new(Duration::from_secs(60), 0);
        assert!(!policy.try_acquire(Instant::now()));
    }

    #[test]
    fn test_reset() {
        let mut policy = RestartPolicy::new(Duration::from_secs(60), 1);
        let t0 = Instant::now();
        assert!(policy.try_acquire(t0));
        policy.reset();
        assert!(policy.try_acquire(t0));
    }
}
