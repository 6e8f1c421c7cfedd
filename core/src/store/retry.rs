//! When and how long to wait before re-sending a store request.
//!
//! Throttled (429), timed out (408) and 5xx responses are retried, as are
//! transport failures. A delay announced by the server wins over the
//! exponential backoff.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::{Duration, SystemTime};

/// Seconds until the rate-limit window resets, sent on throttled responses.
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Upper bound for delays announced by the server.
pub const MAX_SERVER_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// What went wrong with the last attempt.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status {
        status: StatusCode,
        /// Delay announced by the server, if any.
        server_wait: Option<Duration>,
    },
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    GiveUp,
    Wait { delay: Duration, from_server: bool },
}

impl RetryPolicy {
    /// `retries_so_far` is the number of retries already sent.
    pub fn decide(&self, failure: Failure, retries_so_far: u32) -> Backoff {
        if retries_so_far >= self.max_retries {
            return Backoff::GiveUp;
        }

        match failure {
            Failure::Status { status, .. } if !is_retryable_status(status) => Backoff::GiveUp,
            Failure::Status {
                server_wait: Some(wait),
                ..
            } => Backoff::Wait {
                delay: wait.min(MAX_SERVER_WAIT).min(self.max_delay),
                from_server: true,
            },
            Failure::Status { .. } | Failure::Transport => Backoff::Wait {
                delay: self.exponential(retries_so_far),
                from_server: false,
            },
        }
    }

    fn exponential(&self, retries_so_far: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retries_so_far))
            .min(self.max_delay)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Delay announced through `Retry-After` or, failing that, the rate-limit
/// reset header.
pub fn server_wait(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|value| parse_retry_after(value, now))
        .or_else(|| {
            header_str(headers, RATE_LIMIT_RESET)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Accepts both delta-seconds and HTTP-date values. Dates in the past mean
/// "now".
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}
