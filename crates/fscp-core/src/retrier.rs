//! Periodic re-emission of handshake messages.
//!
//! A retrier runs its operation once immediately, then again at every
//! period until it is stopped or the operation fails. The subtle part of
//! the contract is `stop`: it reports whether *this* call was the one that
//! stopped the retrier. The HELLO handler relies on that to distinguish "the
//! response arrived in time" from "someone else already gave up".

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A handle to a periodic retry task.
pub struct Retrier {
    stopped: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
}

impl Retrier {
    /// Run `operation` once, then spawn a task re-running it every `period`.
    ///
    /// The first invocation completes before this function returns, so the
    /// initial message is on the wire once the retrier exists. Any failure
    /// invokes `on_failure` and terminates the retrier; a failure after the
    /// initial invocation also marks it stopped.
    pub async fn spawn<O, Fut, F, E>(period: Duration, operation: O, on_failure: F) -> Self
    where
        O: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        F: FnOnce(E) + Send + 'static,
        E: Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        if let Err(error) = operation().await {
            on_failure(error);

            return Self { stopped, stop_tx };
        }

        let task_stopped = Arc::clone(&stopped);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        return;
                    }
                    _ = tokio::time::sleep(period) => {
                        if task_stopped.load(Ordering::SeqCst) {
                            return;
                        }

                        if let Err(error) = operation().await {
                            task_stopped.swap(true, Ordering::SeqCst);
                            on_failure(error);

                            return;
                        }
                    }
                }
            }
        });

        Self { stopped, stop_tx }
    }

    /// Stop the retrier.
    ///
    /// Idempotent; returns whether this call was the one that stopped it.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }

        let _ = self.stop_tx.send(true);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct Probe {
        invocations: AtomicU32,
        failure: Mutex<Option<String>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                invocations: AtomicU32::new(0),
                failure: Mutex::new(None),
            })
        }
    }

    #[tokio::test]
    async fn test_retrier_repeats_until_stopped() {
        let probe = Probe::new();

        let operation_probe = Arc::clone(&probe);
        let failure_probe = Arc::clone(&probe);
        let retrier = Retrier::spawn(
            Duration::from_millis(1),
            move || {
                let probe = Arc::clone(&operation_probe);
                async move {
                    probe.invocations.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            },
            move |error| {
                *failure_probe.failure.lock().unwrap() = Some(error);
            },
        )
        .await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(retrier.stop(), "first stop should report true");
        assert!(!retrier.stop(), "second stop should report false");

        assert!(probe.invocations.load(Ordering::SeqCst) >= 3);
        assert!(probe.failure.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initial_failure_fires_callback() {
        let probe = Probe::new();

        let failure_probe = Arc::clone(&probe);
        let retrier = Retrier::spawn(
            Duration::from_millis(1),
            move || async move { Err::<(), _>("fail".to_string()) },
            move |error| {
                *failure_probe.failure.lock().unwrap() = Some(error);
            },
        )
        .await;

        assert_eq!(probe.failure.lock().unwrap().as_deref(), Some("fail"));

        // The initial failure does not count as a stop.
        assert!(retrier.stop());
        assert!(!retrier.stop());
    }

    #[tokio::test]
    async fn test_later_failure_stops_the_retrier() {
        let probe = Probe::new();

        let operation_probe = Arc::clone(&probe);
        let failure_probe = Arc::clone(&probe);
        let retrier = Retrier::spawn(
            Duration::from_millis(1),
            move || {
                let probe = Arc::clone(&operation_probe);
                async move {
                    if probe.invocations.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                        Err("fail".to_string())
                    } else {
                        Ok(())
                    }
                }
            },
            move |error| {
                *failure_probe.failure.lock().unwrap() = Some(error);
            },
        )
        .await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        // The retry task already stopped itself on failure.
        assert!(!retrier.stop());

        assert_eq!(probe.invocations.load(Ordering::SeqCst), 2);
        assert_eq!(probe.failure.lock().unwrap().as_deref(), Some("fail"));
    }
}
