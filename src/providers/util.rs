use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with a fixed delay between attempts
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay`: Pause between attempts
///
/// # Returns
/// Either the first successful result or the error of the last attempt
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    retries: usize,
    delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt <= retries => {
                debug!(attempt, retries, error = %err, "Attempt failed, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("boom") } else { Ok(n) }
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            },
            1,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            },
            0,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
