use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
/// Pause between exchange requests after a failure. Binance answers bursts of
/// kline requests with HTTP 429, so a retry is spaced out rather than immediate.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Awaits `$operation` up to `MAX_ATTEMPTS` times, sleeping between failures.
/// The optional third argument overrides `RETRY_DELAY`.
macro_rules! retry_request {
    ($context:expr, $operation:expr) => {
        $crate::retry::retry_request!($context, $operation, $crate::retry::RETRY_DELAY)
    };
    ($context:expr, $operation:expr, $delay:expr) => {{
        let context_value: String = $context.into();
        let delay: std::time::Duration = $delay;
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= $crate::retry::MAX_ATTEMPTS => break Err(err),
                Err(err) => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {:?}.",
                        attempt,
                        $crate::retry::MAX_ATTEMPTS,
                        context_value,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_request;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::cell::Cell;

    async fn flaky(calls: &Cell<u32>, failures: u32) -> Result<u32> {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Err(anyhow!("HTTP 429 on attempt {}", calls.get()))
        } else {
            Ok(calls.get())
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32> =
            retry_request!("klines", flaky(&calls, 2), Duration::from_millis(1));
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<u32> =
            retry_request!("klines", flaky(&calls, 10), Duration::from_millis(1));
        assert!(result.is_err());
        assert_eq!(calls.get(), MAX_ATTEMPTS);
    }

    #[test]
    fn default_delay_is_two_seconds() {
        assert_eq!(RETRY_DELAY, Duration::from_secs(2));
    }
}
