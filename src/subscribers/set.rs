//! # Fan-out of middleware events to subscribers.
//!
//! Every subscriber owns a *lane*: a bounded queue drained by one worker task. The
//! forwarder spawned by the builder pushes each bus event into the lanes whose
//! subscriber [`accepts`](Subscribe::accepts) its kind, then moves on.
//!
//! ```text
//!  forwarder ─► emit(&Event)
//!                 ├─ accepts? ─► [lane: log    ] ─► worker ─► on_event()
//!                 ├─ accepts? ─► [lane: metrics] ─► worker ─► on_event()
//!                 └─ skipped     (kind filtered out)
//! ```
//!
//! A full or closed lane drops the event for that subscriber only; the drop is counted
//! and reported on stderr. Lanes are FIFO. There is no ordering across lanes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::Event;

use super::Subscribe;

struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl Lane {
    fn offer(&self, ev: &Arc<Event>) {
        let why = match self.tx.try_send(Arc::clone(ev)) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "queue full",
            Err(TrySendError::Closed(_)) => "worker gone",
        };
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        eprintln!(
            "[listenvisor] subscriber '{}' dropped {} event ({why}, {total} dropped so far)",
            self.sub.name(),
            ev.kind.as_str(),
        );
    }
}

/// Subscribers with one bounded lane and worker each.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber on `runtime`.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, runtime: &Handle) -> Self {
        let (lanes, workers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let worker = runtime.spawn(drain_lane(Arc::clone(&sub), rx));
                let lane = Lane {
                    sub,
                    tx,
                    dropped: AtomicU64::new(0),
                };
                (lane, worker)
            })
            .unzip();
        Self { lanes, workers }
    }

    /// Queues `event` for every subscriber that accepts its kind. Never waits.
    pub fn emit(&self, event: &Event) {
        let mut shared: Option<Arc<Event>> = None;
        for lane in self.lanes.iter().filter(|l| l.sub.accepts(event.kind)) {
            let ev = shared.get_or_insert_with(|| Arc::new(event.clone()));
            lane.offer(ev);
        }
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> Option<u64> {
        self.lanes
            .iter()
            .find(|l| l.sub.name() == name)
            .map(|l| l.dropped.load(Ordering::Relaxed))
    }

    /// Closes every lane and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

async fn drain_lane(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if handled.is_err() {
            eprintln!(
                "[listenvisor] subscriber '{}' panicked on {} (listener={:?}, task={:?})",
                sub.name(),
                ev.kind.as_str(),
                ev.listener,
                ev.task,
            );
        }
    }
}
