//! # Per-task bookkeeping shared between a running task and its handles.
//!
//! A [`TaskScope`] is created for every listener task. It owns the task's signal,
//! publishes its status through a `watch` channel, remembers whether the effect has
//! suspended yet, and collects auto-joined forks.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::tasks::{AbortSignal, TaskStatus};

pub(crate) struct TaskScope {
    id: u64,
    signal: AbortSignal,
    suspended: AtomicBool,
    status: watch::Sender<TaskStatus>,
    joins: Mutex<Vec<watch::Receiver<TaskStatus>>>,
}

impl TaskScope {
    pub(crate) fn new(id: u64, signal: AbortSignal) -> Self {
        let (status, _rx) = watch::channel(TaskStatus::Running);
        Self {
            id,
            signal,
            suspended: AtomicBool::new(false),
            status,
            joins: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Records that the task reached a suspension point.
    pub(crate) fn mark_suspended(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub(crate) fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// Publishes the terminal status. Only the first call has an effect.
    pub(crate) fn settle(&self, status: TaskStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = status;
            true
        });
    }

    /// Registers a fork the task must wait for before it completes.
    pub(crate) fn join_on(&self, child: watch::Receiver<TaskStatus>) {
        self.joins.lock().push(child);
    }

    /// Waits for every auto-joined fork to reach a terminal status.
    pub(crate) async fn join_children(&self) {
        loop {
            let pending = std::mem::take(&mut *self.joins.lock());
            if pending.is_empty() {
                return;
            }
            for mut child in pending {
                // A dropped sender means the fork is gone; nothing left to wait for.
                let _ = child.wait_for(TaskStatus::is_terminal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_is_first_write_wins() {
        let scope = TaskScope::new(1, AbortSignal::new());
        assert_eq!(scope.status(), TaskStatus::Running);

        scope.settle(TaskStatus::Cancelled);
        scope.settle(TaskStatus::Ok);
        assert_eq!(scope.status(), TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn join_children_waits_for_terminal_status() {
        let scope = TaskScope::new(1, AbortSignal::new());
        let (tx, rx) = watch::channel(TaskStatus::Running);
        scope.join_on(rx);

        let setter = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send_replace(TaskStatus::Ok);
        });

        scope.join_children().await;
        setter.await.unwrap();
    }
}
