use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the attempt or time budget ran out.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    /// The failure exactly as the operation returned it.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }
}

/// Bounded exponential backoff without jitter.
///
/// An operation is retried while its error classifies as retryable, until
/// either `max_attempts` calls have been made or `max_elapsed` has passed
/// since the first call, whichever comes first.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_elapsed: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_elapsed,
        }
    }

    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        E: std::fmt::Display,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => match classify(&err) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                    RetryDisposition::Retry => {
                        if attempt + 1 >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded(err));
                        }

                        let elapsed = started.elapsed();
                        if elapsed >= self.max_elapsed {
                            return Err(RetryError::AttemptsExceeded(err));
                        }

                        let delay = self.backoff_delay(attempt).min(self.max_elapsed - elapsed);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying after transient failure"
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn classify(err: &TestError) -> RetryDisposition {
        match err {
            TestError::Transient => RetryDisposition::Retry,
            TestError::Fatal => RetryDisposition::Stop,
        }
    }

    #[test]
    fn delays_double_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = RetryPolicy::default()
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(TestError::Transient)
                        } else {
                            Ok(42)
                        }
                    }
                },
                classify,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<(), _> = RetryPolicy::default()
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::Fatal)
                    }
                },
                classify,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(TestError::Fatal))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Result<(), _> = RetryPolicy::default()
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::Transient)
                    }
                },
                classify,
            )
            .await;

        // 1+2+4+8+16+32+64 = 127s of sleeping fits inside the 300s budget
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(result.unwrap_err().into_inner(), TestError::Transient);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_time_budget_is_spent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(100, Duration::from_secs(10), Duration::from_secs(60));
        let result: Result<(), _> = policy
            .run(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TestError::Transient)
                    }
                },
                classify,
            )
            .await;

        // sleeps 10, 20, then the 40s delay is truncated to the remaining 30s
        assert!(matches!(result, Err(RetryError::AttemptsExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
