//! Connection task execution.
//!
//! The accept loop never runs connection code itself; it hands every
//! connection future to an [`Executor`]. The default one spawns a tokio task
//! per connection and keeps an abort handle for each live task so the whole
//! set can be torn down at shutdown.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// A connection loop, ready to be driven to completion.
pub type ConnectionTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Executor: Send + Sync {
    /// Starts running `task`. Must not block the caller.
    fn submit(&self, task: ConnectionTask);

    /// Force-terminates every task that is still running.
    fn close_all(&self);

    /// Number of tasks submitted and not yet finished.
    fn active_count(&self) -> usize;
}

/// Spawns one tokio task per connection.
///
/// Live tasks are tracked in a registry keyed by connection id. A task
/// removes its own entry when it finishes; `close_all` aborts from a
/// snapshot of the registry so tasks finishing concurrently do not disturb
/// the iteration. Aborting a task drops its future and with it the socket.
#[derive(Debug, Default)]
pub struct DefaultExecutor {
    registry: Arc<DashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
}

impl DefaultExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Removes a registry entry when the owning task ends, however it ends.
struct Deregister {
    registry: Arc<DashMap<u64, AbortHandle>>,
    id: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

impl Executor for DefaultExecutor {
    fn submit(&self, task: ConnectionTask) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.registry);

        // The task waits until its abort handle is registered, so a task that
        // finishes immediately cannot deregister before it was registered.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            let _deregister = Deregister { registry, id };
            task.await;
        });

        self.registry.insert(id, handle.abort_handle());
        let _ = registered_tx.send(());
        tracing::trace!(id, "connection task started");
    }

    fn close_all(&self) {
        let snapshot: Vec<(u64, AbortHandle)> = self
            .registry
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        tracing::debug!(count = snapshot.len(), "aborting connection tasks");
        for (id, handle) in snapshot {
            handle.abort();
            self.registry.remove(&id);
        }
    }

    fn active_count(&self) -> usize {
        self.registry.len()
    }
}
