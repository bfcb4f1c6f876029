//! Shared fixtures: a counter store, effect helpers and event collection.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use listenvisor::{
    Action, EffectFn, EffectRef, Event, EventKind, ListenerApi, ListenerError, ListenerMiddleware,
    Store,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Counter {
    Increment,
    Decrement,
    IncrementBy(i64),
    Reset,
}

impl Action for Counter {
    fn action_type(&self) -> &str {
        match self {
            Counter::Increment => "counter/increment",
            Counter::Decrement => "counter/decrement",
            Counter::IncrementBy(_) => "counter/incrementBy",
            Counter::Reset => "counter/reset",
        }
    }
}

/// Mutex-backed reducer that records every action it reduced.
#[derive(Default)]
pub struct CounterStore {
    value: Mutex<i64>,
    reduced: Mutex<Vec<Counter>>,
}

impl CounterStore {
    pub fn reduced(&self) -> Vec<Counter> {
        self.reduced.lock().clone()
    }
}

impl Store for CounterStore {
    type State = i64;
    type Action = Counter;
    type Output = Counter;

    fn get_state(&self) -> i64 {
        *self.value.lock()
    }

    fn dispatch(&self, action: Counter) -> Counter {
        {
            let mut value = self.value.lock();
            match &action {
                Counter::Increment => *value += 1,
                Counter::Decrement => *value -= 1,
                Counter::IncrementBy(by) => *value += by,
                Counter::Reset => *value = 0,
            }
        }
        self.reduced.lock().push(action.clone());
        action
    }
}

pub type Mw = Arc<ListenerMiddleware<CounterStore>>;
pub type Api = ListenerApi<CounterStore>;

pub fn middleware() -> Mw {
    ListenerMiddleware::builder(CounterStore::default())
        .build()
        .expect("tests run inside a tokio runtime")
}

/// Wraps a closure as an effect for [`CounterStore`].
pub fn effect<F, Fut>(f: F) -> EffectRef<CounterStore>
where
    F: Fn(Counter, Api) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    EffectFn::arc(f)
}

/// Predicate matching one exact action.
pub fn is(expected: Counter) -> impl Fn(&Counter, &i64, &i64) -> bool + Send + Sync + 'static {
    move |action: &Counter, _: &i64, _: &i64| *action == expected
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Lets spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Drains every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}
