//! Backoff policy for requests against an inference backend.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;

/// How many times, and how patiently, a failed request is re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Send once and never retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Doubling backoff before retry number `attempt + 1`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// `message` is the already-parsed error text, not the raw body.
    pub fn should_retry_status(&self, attempt: u32, status: StatusCode, message: &str) -> bool {
        attempt < self.max_retries && is_retryable_status(status, message)
    }

    /// Requests that never reached the backend, or whose body broke mid-read,
    /// are retried; locally malformed requests are not.
    pub fn should_retry_transport(&self, attempt: u32, error: &reqwest::Error) -> bool {
        attempt < self.max_retries && !error.is_builder()
    }
}

fn overload_wording() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)overload|over capacity|rate.?limit|temporarily unavailable|try again")
            .expect("overload regex must compile")
    })
}

/// Whether a backend rejection is transient.
///
/// 429 and the gateway family (500, 502, 503, 504) always are. Any other 5xx
/// only when its message reads like an overload. Other 4xx never are, whatever
/// their wording.
pub fn is_retryable_status(status: StatusCode, message: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if !status.is_server_error() {
        return false;
    }
    matches!(status.as_u16(), 500 | 502 | 503 | 504) || overload_wording().is_match(message)
}
