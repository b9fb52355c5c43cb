//! Bounded polling waits
//!
//! Table and index activation are both "poll a predicate until it holds or
//! a deadline passes". [`wait_until`] implements that once: the predicate is
//! checked immediately, then again after every poll interval until it
//! returns `true`, the timeout elapses ([`SpanStoreError::Timeout`]), or the
//! caller cancels ([`SpanStoreError::Cancelled`]). The deadline and the
//! cancellation also bound each probe call.
//!
//! Time is measured with `tokio::time`, so tests can run waits on a paused
//! clock.

use crate::error::{Result, SpanStoreError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Poll interval and overall deadline for a wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Table activation: poll every second for up to five minutes
    pub fn table_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }

    /// Index activation: poll every 100ms for up to five minutes
    pub fn index_default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(300))
    }
}

impl From<WaitConfig> for WaitPolicy {
    fn from(config: WaitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

/// Serializable form of [`WaitPolicy`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

/// Sender half of a cancellation signal
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    /// Cancel every wait observing the paired [`Cancellation`]
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver half of a cancellation signal, observed by waits
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A connected canceller/cancellation pair
    pub fn pair() -> (Canceller, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (Canceller { tx }, Cancellation { rx })
    }

    /// A cancellation that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the canceller was dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Poll `probe` until it reports `true`.
///
/// `what` names the awaited condition in errors and logs. Probe errors abort
/// the wait and are returned as-is. A probe still in flight at the deadline
/// or on cancellation is dropped.
pub async fn wait_until<F, Fut>(
    what: &str,
    policy: WaitPolicy,
    cancel: &Cancellation,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(SpanStoreError::cancelled(what));
        }
        attempt += 1;
        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpanStoreError::cancelled(what)),
            outcome = tokio::time::timeout_at(deadline, probe()) => match outcome {
                Ok(ready) => ready?,
                Err(_) => return Err(SpanStoreError::timeout(what, started.elapsed())),
            },
        };
        if ready {
            if attempt > 1 {
                tracing::debug!(what, attempts = attempt, "Wait condition reached");
            }
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(SpanStoreError::timeout(what, now - started));
        }
        let next = (now + policy.poll_interval).min(deadline);
        tracing::debug!(what, attempt, "Condition not reached, polling again");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SpanStoreError::cancelled(what)),
            _ = tokio::time::sleep_until(next) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(100), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_immediately_when_condition_holds() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        wait_until("ready", policy(), &Cancellation::never(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(true) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_condition_holds() {
        let calls = AtomicU32::new(0);
        wait_until("ready", policy(), &Cancellation::never(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n >= 4) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let err = wait_until("never", policy(), &Cancellation::never(), || async {
            Ok(false)
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_aborts() {
        let err = wait_until("broken", policy(), &Cancellation::never(), || async {
            Err(SpanStoreError::store("DescribeTable", "t", "boom"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SpanStoreError::Store { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_not_a_timeout() {
        let (canceller, cancel) = Cancellation::pair();
        let calls = Arc::new(AtomicU32::new(0));
        let probe_calls = calls.clone();

        let wait = tokio::spawn(async move {
            wait_until("cancelled", policy(), &cancel, move || {
                probe_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        canceller.cancel();

        let err = wait.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(calls.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_check_times_out_at_deadline() {
        let start = Instant::now();
        let err = wait_until("hung", policy(), &Cancellation::never(), || {
            std::future::pending::<Result<bool>>()
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_hung_check() {
        let (canceller, cancel) = Cancellation::pair();
        let long = WaitPolicy::new(Duration::from_millis(100), Duration::from_secs(600));

        let wait = tokio::spawn(async move {
            wait_until("hung", long, &cancel, || std::future::pending::<Result<bool>>()).await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();

        let err = tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("wait should end promptly after cancel")
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_probe() {
        let (canceller, cancel) = Cancellation::pair();
        canceller.cancel();

        let err = wait_until("ready", policy(), &cancel, || async { Ok(true) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_canceller_never_cancels() {
        let (canceller, cancel) = Cancellation::pair();
        drop(canceller);

        let calls = AtomicU32::new(0);
        wait_until("ready", policy(), &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n >= 2) }
        })
        .await
        .unwrap();
    }
}
