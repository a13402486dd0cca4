use crate::error::EventError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ListenerId = u64;
type Listener<T> = Arc<dyn Fn(&T) -> BoxFuture<'static, Result<(), EventError>> + Send + Sync>;

/// How listeners run within one `emit_all`/`emit_race` call (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Sequential,
    Parallel,
}

/// A typed, multi-listener event with fire-and-forget, await-all, and
/// first-settled emission modes (§4.10).
pub struct EventBus<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
    concurrency: Concurrency,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    pub fn new(concurrency: Concurrency) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            concurrency,
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) -> BoxFuture<'static, Result<(), EventError>> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    fn snapshot_ids(&self) -> Vec<ListenerId> {
        self.listeners.lock().iter().map(|(id, _)| *id).collect()
    }

    fn lookup(&self, id: ListenerId) -> Option<Listener<T>> {
        self.listeners
            .lock()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, f)| f.clone())
    }

    /// Fire-and-forget: runs every listener, surfacing errors to `on_error`
    /// rather than to the caller (§4.10 `emit`).
    pub fn emit(&self, event: T, on_error: impl Fn(EventError)) {
        if let Err(errors) = futures::executor::block_on(self.emit_all(event)) {
            for err in errors {
                on_error(err);
            }
        }
    }

    /// Awaits every currently-subscribed listener, aggregating failures
    /// (§4.10 `emitAll`).
    ///
    /// In [`Concurrency::Sequential`] mode, the listener list is
    /// re-resolved by id before each invocation: a listener that
    /// unsubscribes another listener from within its own callback prevents
    /// that later listener from running in this emission.
    pub async fn emit_all(&self, event: T) -> Result<(), Vec<EventError>> {
        let mut errors = Vec::new();
        match self.concurrency {
            Concurrency::Sequential => {
                for id in self.snapshot_ids() {
                    let Some(listener) = self.lookup(id) else {
                        continue;
                    };
                    if let Err(err) = listener(&event).await {
                        errors.push(err);
                    }
                }
            }
            Concurrency::Parallel => {
                let ids = self.snapshot_ids();
                let futures_list: Vec<_> = ids
                    .into_iter()
                    .filter_map(|id| self.lookup(id))
                    .map(|listener| listener(&event))
                    .collect();
                for result in futures::future::join_all(futures_list).await {
                    if let Err(err) = result {
                        errors.push(err);
                    }
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolves as soon as the first listener settles (§4.10 `emitRace`).
    pub async fn emit_race(&self, event: T) -> Option<Result<(), EventError>> {
        let ids = self.snapshot_ids();
        let futures_list: Vec<BoxFuture<'static, Result<(), EventError>>> = ids
            .into_iter()
            .filter_map(|id| self.lookup(id))
            .map(|listener| listener(&event))
            .collect();
        if futures_list.is_empty() {
            return None;
        }
        let (result, _index, _remaining) = futures::future::select_all(futures_list).await;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn sequential_unsubscribe_prevents_later_listener() {
        let bus: EventBus<()> = EventBus::new(Concurrency::Sequential);
        let ran_b = Arc::new(AtomicUsize::new(0));
        let ran_b_clone = ran_b.clone();

        let bus = Arc::new(bus);
        let bus_for_a = bus.clone();
        let b_id = Arc::new(Mutex::new(None));
        let b_id_for_a = b_id.clone();
        let a_id = bus.subscribe(move |_: &()| {
            let bus_for_a = bus_for_a.clone();
            let b_id_for_a = b_id_for_a.clone();
            Box::pin(async move {
                if let Some(id) = *b_id_for_a.lock() {
                    bus_for_a.unsubscribe(id);
                }
                Ok(())
            })
        });
        let _ = a_id;
        let id = bus.subscribe(move |_: &()| {
            ran_b_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        });
        *b_id.lock() = Some(id);

        futures::executor::block_on(bus.emit_all(())).unwrap();
        assert_eq!(ran_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn emit_all_aggregates_errors() {
        let bus: EventBus<()> = EventBus::new(Concurrency::Parallel);
        bus.subscribe(|_| Box::pin(async { Err(EventError::ListenerFailed("a".into())) }));
        bus.subscribe(|_| Box::pin(async { Err(EventError::ListenerFailed("b".into())) }));
        let result = futures::executor::block_on(bus.emit_all(()));
        assert_eq!(result.unwrap_err().len(), 2);
    }
}
