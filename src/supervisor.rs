//! Panic boundaries and the restart-on-fault supervisor loop.
//!
//! Long-running loops (the liveness monitor, the HTTP serving loop) run
//! under [`supervise`]: a panic or an error return is logged and the loop
//! is restarted after a fixed backoff, forever.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

/// Extracts a readable message from a panic payload.
#[must_use]
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

/// Runs `fut` to completion, converting a panic into `Err(message)`.
///
/// # Errors
///
/// Returns the panic message if `fut` panicked while being polled.
pub async fn contain<F>(fut: F) -> Result<F::Output, String>
where
    F: Future,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|panic| panic_message(&*panic))
}

/// Runs a synchronous closure, converting a panic into `Err(message)`.
///
/// # Errors
///
/// Returns the panic message if `f` panicked.
pub fn contain_sync<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panic_message(&*panic))
}

/// Runs `make()` forever, restarting after `backoff` whenever the future
/// returns or panics.
///
/// `name` labels the loop in logs. This never returns.
pub async fn supervise<F, Fut, E>(name: &'static str, backoff: Duration, mut make: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    loop {
        match contain(make()).await {
            Ok(Ok(())) => tracing::warn!(task = name, "supervised task exited; restarting"),
            Ok(Err(err)) => tracing::error!(task = name, error = %err, "supervised task failed; restarting"),
            Err(panic) => tracing::error!(task = name, panic = %panic, "supervised task panicked; restarting"),
        }
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn explode(msg: &str) {
        panic!("{msg}");
    }

    #[test]
    fn panic_message_reads_payload() {
        let Err(payload) = std::panic::catch_unwind(|| explode("static")) else {
            panic!("expected panic");
        };
        assert_eq!(panic_message(&*payload), "static");

        let Err(payload) = std::panic::catch_unwind(|| explode(&format!("formatted {}", 7))) else {
            panic!("expected panic");
        };
        assert_eq!(panic_message(&*payload), "formatted 7");
    }

    #[tokio::test]
    async fn contain_catches_async_panic() {
        let result = contain(async { explode("inside") }).await;
        assert_eq!(result, Err::<(), _>("inside".to_string()));
    }

    #[test]
    fn contain_sync_passes_value_through() {
        assert_eq!(contain_sync(|| 5), Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn supervise_restarts_after_panic_and_error() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = tokio::spawn(supervise("test", Duration::from_secs(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("first run");
                }
                Err::<(), _>("second run")
            }
        }));

        tokio::time::sleep(Duration::from_millis(7_500)).await;
        handle.abort();
        // Runs at t=0, t=3s, t=6s.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
