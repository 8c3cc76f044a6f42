use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::time::{self, Duration, Instant};

/// Spawns the given future on the runtime. Every per-node task (mobility,
/// hello, dv, neighbor watch, rx, app) and every per-delivery delay is
/// launched through this single entry point, so cancellation at shutdown
/// only ever has to reason about one kind of handle (`JoinHandle`).
pub fn spawn_local<F: std::future::Future<Output = ()> + Send + 'static>(f: F) -> tokio::task::JoinHandle<()> {
    tokio::spawn(f)
}

/// Sleeps for `dur`.
pub async fn wait(dur: Duration) {
    time::sleep(dur).await;
}

/// Sleeps for `secs` seconds (fractional seconds allowed).
pub async fn wait_s(secs: f64) {
    wait(Duration::from_secs_f64(secs.max(0.0))).await;
}

/// A periodic stream that fires every `dur`, independent of how long the
/// previous tick's work took (backed by `tokio::time::interval`, which
/// already accounts for drift). Used by every periodic per-node task.
pub struct Interval {
    interval: time::Interval,
}

impl Interval {
    pub fn new(dur: Duration) -> Self {
        Self {
            interval: time::interval(dur),
        }
    }
}

impl Stream for Interval {
    type Item = Instant;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.interval.poll_tick(cx).map(Some)
    }
}
