use crate::error::ForgeError;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff: attempt `n` (zero based) waits
/// `base_delay * factor^n` before the next try.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            factor: 3,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(attempt))
    }
}

/// A fully read HTTP reply. The body is buffered so the final throttled
/// reply can still be inspected after retries run out.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runs `send` until it yields a reply that is not `429 Too Many Requests`.
///
/// Errors returned by `send` are treated as transport failures and retried
/// with the same schedule; the last one is returned unchanged. Any non-429
/// status, successful or not, is handed back to the caller untouched.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut send: F,
) -> Result<Reply, ForgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Reply, ForgeError>>,
{
    let retries = policy.max_attempts.saturating_sub(1);

    for attempt in 0..policy.max_attempts {
        let is_last = attempt + 1 == policy.max_attempts;
        let wait = policy.delay_for(attempt);

        match send().await {
            Ok(reply) if reply.status == StatusCode::TOO_MANY_REQUESTS => {
                if is_last {
                    log::error!("🛑 [{label}] still rate limited after {} attempts", policy.max_attempts);
                    return Err(throttle_error(&reply, policy.max_attempts));
                }
                log::warn!(
                    "⏳ [{label}] rate limited. Waiting {}ms before retry {}/{}",
                    wait.as_millis(),
                    attempt + 1,
                    retries
                );
            }
            Ok(reply) => return Ok(reply),
            Err(e) => {
                if is_last {
                    return Err(e);
                }
                log::warn!(
                    "⏳ [{label}] request failed ({e}). Waiting {}ms before retry {}/{}",
                    wait.as_millis(),
                    attempt + 1,
                    retries
                );
            }
        }

        sleep(wait).await;
    }

    Err(ForgeError::InvalidConfig(
        "retry policy allows no attempts".into(),
    ))
}

/// Daily quota violations carry a `...PerDay...` quota id in the error
/// details; everything else is a short-term throttle.
fn throttle_error(reply: &Reply, attempts: u32) -> ForgeError {
    if reply.body.contains("PerDay") {
        ForgeError::QuotaExceeded(reply.body.clone())
    } else {
        ForgeError::RateLimited { attempts }
    }
}
