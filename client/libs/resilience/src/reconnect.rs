/// Reconnect schedule for long-lived connections
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between a lost connection and the next attempt
    pub delay: Duration,
    /// Give up after this many consecutive failed attempts (`None` retries forever)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(5000),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before attempt number `attempt` (1-based), or `None` once exhausted
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.delay),
        }
    }

    /// Sleep until the next attempt is due. Returns `false` when the policy is exhausted.
    pub async fn wait(&self, attempt: u32) -> bool {
        match self.next_delay(attempt) {
            Some(delay) => {
                info!("Reconnect attempt {} in {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_never_grows() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(5));

        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(50), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_max_attempts_exhausts() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);

        assert!(policy.next_delay(2).is_some());
        assert!(policy.next_delay(3).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_for_delay() {
        let policy = ReconnectPolicy::default();
        let start = tokio::time::Instant::now();

        assert!(policy.wait(1).await);
        assert!(start.elapsed() >= Duration::from_millis(5000));
    }
}
