use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;

use crate::{
    config::Config,
    error::{ListenerError, RuntimeError},
    events::Bus,
    store::Store,
    subscribers::{Subscribe, SubscriberSet},
};
use super::{
    middleware::ListenerMiddleware,
    runner::Launcher,
    sink::{ErrorContext, ErrorHandler, ErrorSink},
};

/// Builder for constructing a [`ListenerMiddleware`] with optional features.
pub struct ListenerMiddlewareBuilder<St: Store, X = ()> {
    store: St,
    cfg: Config,
    extra: X,
    on_error: Option<ErrorHandler>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    runtime: Option<Handle>,
}

impl<St: Store> ListenerMiddlewareBuilder<St, ()> {
    /// Creates a new builder around `store` with the default configuration.
    pub fn new(store: St) -> Self {
        Self {
            store,
            cfg: Config::default(),
            extra: (),
            on_error: None,
            subscribers: Vec::new(),
            runtime: None,
        }
    }
}

impl<St, X> ListenerMiddlewareBuilder<St, X>
where
    St: Store,
    X: Send + Sync + 'static,
{
    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the value every effect can read through `api.extra()`.
    pub fn with_extra<Y>(self, extra: Y) -> ListenerMiddlewareBuilder<St, Y>
    where
        Y: Send + Sync + 'static,
    {
        ListenerMiddlewareBuilder {
            store: self.store,
            cfg: self.cfg,
            extra,
            on_error: self.on_error,
            subscribers: self.subscribers,
            runtime: self.runtime,
        }
    }

    /// Sets the hook that receives effect and predicate failures.
    ///
    /// Failures are published as `EffectFailed`/`PredicateFailed` events either way.
    pub fn with_on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ListenerError, &ErrorContext) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (listener registration, task lifecycle,
    /// failures) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Runs tasks on `handle` instead of the runtime current at `build` time.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds and returns the middleware.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - Event bus for broadcasting
    /// - Error sink
    /// - Subscriber workers and the bus forwarder (only if subscribers were given)
    ///
    /// Fails with [`RuntimeError::NoRuntime`] outside a tokio runtime when no handle
    /// was given.
    pub fn build(self) -> Result<Arc<ListenerMiddleware<St, X>>, RuntimeError> {
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?,
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subscribers = if self.subscribers.is_empty() {
            None
        } else {
            let subs = Arc::new(SubscriberSet::new(self.subscribers, &handle));
            spawn_forwarder(&handle, &bus, Arc::clone(&subs));
            Some(subs)
        };

        let sink = ErrorSink::new(self.on_error, bus.clone());
        Ok(Arc::new(ListenerMiddleware::new_internal(
            self.cfg,
            self.store,
            self.extra,
            sink,
            Launcher::new(handle),
            bus,
            subscribers,
        )))
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
///
/// The middleware keeps its own handle on the set for drop counts. Whoever holds the
/// last handle closes the lanes; the forwarder also waits for the workers to drain.
fn spawn_forwarder(handle: &Handle, bus: &Bus, subs: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    handle.spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("[listenvisor] subscriber forwarder lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        if let Ok(subs) = Arc::try_unwrap(subs) {
            subs.shutdown().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CounterStore;

    #[test]
    fn build_outside_a_runtime_fails() {
        let err = ListenerMiddleware::builder(CounterStore::default())
            .build()
            .unwrap_err();
        assert_eq!(err, RuntimeError::NoRuntime);
    }

    #[test]
    fn build_with_explicit_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mw = ListenerMiddleware::builder(CounterStore::default())
            .with_runtime(rt.handle().clone())
            .with_extra("ctx")
            .build()
            .unwrap();
        assert_eq!(*mw.extra(), "ctx");
        assert_eq!(mw.listener_count(), 0);
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl Subscribe for Stalled {
        async fn on_event(&self, _event: &crate::events::Event) {
            std::future::pending::<()>().await;
        }

        fn name(&self) -> &'static str {
            "stalled"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_counts_are_readable_from_the_middleware() {
        let mw = ListenerMiddleware::builder(CounterStore::default())
            .with_subscribers(vec![Arc::new(Stalled)])
            .build()
            .unwrap();
        assert_eq!(mw.dropped_events("stalled"), Some(0));
        assert_eq!(mw.dropped_events("missing"), None);

        // The worker holds the first event forever and the lane holds one more.
        for _ in 0..4 {
            mw.clear_listeners();
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(mw.dropped_events("stalled"), Some(2));

        let plain = ListenerMiddleware::builder(CounterStore::default()).build().unwrap();
        assert_eq!(plain.dropped_events("stalled"), None);
    }
}
