//! Coordinator configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when submitted totals disagree with the recomputed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalsPolicy {
    /// Persist the submitted figures and mark the order unverified.
    #[default]
    Flag,

    /// Fail the checkout with `TotalsMismatch`.
    Reject,
}

impl FromStr for TotalsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" => Ok(TotalsPolicy::Flag),
            "reject" => Ok(TotalsPolicy::Reject),
            other => Err(format!("unknown totals policy: {other}")),
        }
    }
}

/// Retry, timeout and totals settings for a [`crate::CheckoutCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Attempts per operation when a write conflict is detected. At least 1.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Upper bound on one attempt. `None` waits indefinitely.
    pub attempt_timeout: Option<Duration>,
    pub totals_policy: TotalsPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            attempt_timeout: None,
            totals_policy: TotalsPolicy::Flag,
        }
    }
}

impl CheckoutConfig {
    /// Sets the number of attempts, clamped to at least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the totals policy.
    pub fn with_totals_policy(mut self, policy: TotalsPolicy) -> Self {
        self.totals_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckoutConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.attempt_timeout, None);
        assert_eq!(config.totals_policy, TotalsPolicy::Flag);
    }

    #[test]
    fn test_max_attempts_clamped() {
        let config = CheckoutConfig::default().with_max_attempts(0);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_totals_policy_parse() {
        assert_eq!("flag".parse::<TotalsPolicy>(), Ok(TotalsPolicy::Flag));
        assert_eq!(" REJECT ".parse::<TotalsPolicy>(), Ok(TotalsPolicy::Reject));
        assert!("ignore".parse::<TotalsPolicy>().is_err());
    }
}
