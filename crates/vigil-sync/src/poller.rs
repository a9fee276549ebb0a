//! Interval-driven fetch loop.
//!
//! A [`Poller`] invokes its fetch function immediately, then once per
//! period measured from the scheduled start of each tick. At most one
//! fetch is ever outstanding: ticks that come due while a fetch is still
//! running are skipped, not queued. Failures are reported and the loop
//! keeps going.
//!
//! Stopping is final. Once [`Poller::stop`] returns, the fetch function is
//! not invoked again and no result (including one already in flight) is
//! delivered.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Smallest accepted period; a zero-length tokio interval panics.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Shared flag saying results may still be delivered.
///
/// Checked and flipped under one lock, so a stop and a delivery never
/// interleave. Work that finishes outside the poller's own task (for
/// example in a store's owner task) checks the same gate before applying.
#[derive(Clone)]
pub(crate) struct DeliveryGate(Arc<Mutex<bool>>);

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    /// Run `deliver` unless the gate is closed. The lock is held while it runs.
    pub(crate) fn deliver_with<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
        let open = lock(&self.0);
        if *open {
            Some(deliver())
        } else {
            None
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        *lock(&self.0)
    }

    /// Close the gate. Returns whether it was open.
    pub(crate) fn close(&self) -> bool {
        std::mem::replace(&mut *lock(&self.0), false)
    }
}

pub struct Poller {
    name: &'static str,
    gate: DeliveryGate,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// `on_result` and `on_error` run while the poller's stop lock is held;
    /// they must not call [`stop`](Self::stop) on this same poller.
    pub fn start<F, Fut, T, E, R, X>(
        name: &'static str,
        period: Duration,
        fetch: F,
        on_result: R,
        on_error: X,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        R: FnMut(T) + Send + 'static,
        X: FnMut(E) + Send + 'static,
    {
        Self::start_gated(name, period, DeliveryGate::new(), fetch, on_result, on_error)
    }

    /// Like [`start`](Self::start), with a gate the caller can also hand to
    /// whatever applies results on the poller's behalf.
    pub(crate) fn start_gated<F, Fut, T, E, R, X>(
        name: &'static str,
        period: Duration,
        gate: DeliveryGate,
        mut fetch: F,
        mut on_result: R,
        mut on_error: X,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        R: FnMut(T) + Send + 'static,
        X: FnMut(E) + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let loop_gate = gate.clone();

        tracing::info!(
            poller = name,
            period_ms = period.as_millis() as u64,
            "poller started"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(pending) = loop_gate.deliver_with(&mut fetch) else {
                    break;
                };

                let started = Instant::now();
                let outcome = pending.await;
                let elapsed = started.elapsed();
                if elapsed > period {
                    tracing::debug!(
                        poller = name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "fetch outlasted period; skipping overdue ticks"
                    );
                }

                let delivered = loop_gate.deliver_with(|| match outcome {
                    Ok(value) => on_result(value),
                    Err(error) => {
                        tracing::warn!(poller = name, error = %error, "poll failed");
                        on_error(error);
                    }
                });
                if delivered.is_none() {
                    tracing::debug!(poller = name, "dropping result that landed after stop");
                    break;
                }
            }
        });

        Self {
            name,
            gate,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_open()
    }

    /// Stop the loop. Idempotent.
    pub fn stop(&self) {
        let was_running = self.gate.close();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        if was_running {
            tracing::info!(poller = self.name, "poller stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[derive(Default)]
    struct Counters {
        started: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        results: AtomicUsize,
        errors: AtomicUsize,
        spans: Mutex<Vec<(Instant, Instant)>>,
    }

    /// Start a poller whose fetch takes `latency` and fails when `fail` says so.
    fn counting_poller(
        period_ms: u64,
        latency_ms: u64,
        fail: fn(usize) -> bool,
    ) -> (Poller, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let fetch_counters = Arc::clone(&counters);
        let result_counters = Arc::clone(&counters);
        let error_counters = Arc::clone(&counters);

        let poller = Poller::start(
            "counting",
            Duration::from_millis(period_ms),
            move || {
                let counters = Arc::clone(&fetch_counters);
                async move {
                    let n = counters.started.fetch_add(1, Ordering::SeqCst);
                    let now_in_flight = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    counters.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
                    let begin = Instant::now();
                    sleep(Duration::from_millis(latency_ms)).await;
                    counters.spans.lock().unwrap().push((begin, Instant::now()));
                    counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                    if fail(n) {
                        Err(format!("tick {n} failed"))
                    } else {
                        Ok(n)
                    }
                }
            },
            move |_n: usize| {
                result_counters.results.fetch_add(1, Ordering::SeqCst);
            },
            move |_e: String| {
                error_counters.errors.fetch_add(1, Ordering::SeqCst);
            },
        );
        (poller, counters)
    }

    fn never(_: usize) -> bool {
        false
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate() {
        let (poller, counters) = counting_poller(1_000, 0, never);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
        assert_eq!(counters.results.load(Ordering::SeqCst), 1);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period() {
        let (poller, counters) = counting_poller(100, 0, never);
        sleep(Duration::from_millis(450)).await;
        // t = 0, 100, 200, 300, 400
        assert_eq!(counters.started.load(Ordering::SeqCst), 5);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_never_overlaps() {
        let (poller, counters) = counting_poller(100, 250, never);
        sleep(Duration::from_millis(1_000)).await;
        poller.stop();

        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
        let spans = counters.spans.lock().unwrap().clone();
        assert!(spans.len() >= 3);
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1, "fetch started before previous finished");
        }
        // Skipped ticks are not queued up and replayed.
        assert!(counters.started.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_scheduled_ticks() {
        let (poller, counters) = counting_poller(100, 0, never);
        sleep(Duration::from_millis(250)).await;
        poller.stop();
        let seen = counters.started.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(counters.started.load(Ordering::SeqCst), seen);
        assert!(!poller.is_running());

        poller.stop();
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_in_flight_result() {
        let (poller, counters) = counting_poller(100, 300, never);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.in_flight.load(Ordering::SeqCst), 1);
        poller.stop();

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(counters.results.load(Ordering::SeqCst), 0);
        assert_eq!(counters.errors.load(Ordering::SeqCst), 0);
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_loop() {
        fn odd(n: usize) -> bool {
            n % 2 == 1
        }
        let (poller, counters) = counting_poller(100, 0, odd);
        sleep(Duration::from_millis(450)).await;
        poller.stop();

        assert_eq!(counters.started.load(Ordering::SeqCst), 5);
        assert_eq!(counters.results.load(Ordering::SeqCst), 3);
        assert_eq!(counters.errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_pollers() {
        let (fast, fast_counters) = counting_poller(100, 0, never);
        let (slow, slow_counters) = counting_poller(300, 0, never);
        sleep(Duration::from_millis(650)).await;
        slow.stop();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(slow_counters.started.load(Ordering::SeqCst), 3);
        assert_eq!(fast_counters.started.load(Ordering::SeqCst), 8);
        assert!(fast.is_running());
        fast.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops() {
        let (poller, counters) = counting_poller(100, 0, never);
        sleep(Duration::from_millis(50)).await;
        drop(poller);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
    }
}
