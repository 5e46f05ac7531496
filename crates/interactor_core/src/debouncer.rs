//! Coalescing scheduler for a single pending async slot.
//!
//! Each request arms a timer. A newer request on the same slot cancels the
//! armed timer before it fires, so only the latest request in a quiescence
//! window runs its work. The slot is guarded by its own lock because requests
//! arrive from whichever context the caller happens to be in.

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::FutureExt;
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::RuntimeError, settings::RuntimeSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceOutcome<T> {
    /// The request won its window; carries whatever the work produced.
    Executed(T),
    /// A later request or an explicit cancel took the slot first.
    Superseded,
}

impl<T> DebounceOutcome<T> {
    pub fn executed(self) -> Option<T> {
        match self {
            DebounceOutcome::Executed(value) => Some(value),
            DebounceOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, DebounceOutcome::Superseded)
    }
}

#[derive(Debug)]
struct PendingRequest {
    ordinal: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Slot {
    ordinal: u64,
    pending: Option<PendingRequest>,
}

/// Clones share the same slot.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    slot: Arc<Mutex<Slot>>,
    runtime: Handle,
}

impl Debouncer {
    /// Binds to the ambient tokio runtime.
    pub fn new(window: Duration) -> Result<Self, RuntimeError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(window, runtime))
    }

    /// Timers run on `runtime`, so requests may come from any thread.
    pub fn with_runtime(window: Duration, runtime: Handle) -> Self {
        Self {
            window,
            slot: Arc::new(Mutex::new(Slot::default())),
            runtime,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self, RuntimeError> {
        Self::new(settings.debounce_window())
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_pending(&self) -> bool {
        self.lock_slot().pending.is_some()
    }

    /// Arms the slot with `work` and returns immediately.
    ///
    /// Dropping the returned handle does not withdraw the request; use
    /// [`Debouncer::cancel`] for that.
    pub fn debounce<F, Fut, T>(&self, work: F) -> DebounceHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let ordinal = {
            let mut slot = self.lock_slot();
            slot.ordinal += 1;
            let ordinal = slot.ordinal;
            let previous = slot.pending.replace(PendingRequest {
                ordinal,
                token: token.clone(),
            });
            if let Some(previous) = previous {
                previous.token.cancel();
                debug!(superseded = previous.ordinal, ordinal, "debounce request superseded");
            }
            ordinal
        };

        let (tx, rx) = oneshot::channel();
        let slot = Arc::clone(&self.slot);
        // Deadline is fixed at request time on the runtime's clock.
        let deadline = {
            let _entered = self.runtime.enter();
            Instant::now() + self.window
        };
        self.runtime.spawn(async move {
            let fired = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = tokio::time::sleep_until(deadline) => claim(&slot, ordinal),
            };
            let outcome = if fired {
                debug!(ordinal, "debounce window elapsed; executing");
                AssertUnwindSafe(async move { work().await })
                    .catch_unwind()
                    .await
                    .map(DebounceOutcome::Executed)
            } else {
                Ok(DebounceOutcome::Superseded)
            };
            let _ = tx.send(outcome);
        });

        DebounceHandle { ordinal, rx }
    }

    /// Returns the slot to idle; the outstanding request resolves as superseded.
    pub fn cancel(&self) {
        let pending = self.lock_slot().pending.take();
        if let Some(pending) = pending {
            pending.token.cancel();
            debug!(ordinal = pending.ordinal, "debounce slot cancelled");
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Takes the slot back to idle if `ordinal` is still the armed request.
fn claim(slot: &Mutex<Slot>, ordinal: u64) -> bool {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    let armed = matches!(
        &slot.pending,
        Some(pending) if pending.ordinal == ordinal && !pending.token.is_cancelled()
    );
    if armed {
        slot.pending = None;
    }
    armed
}

/// Resolves to the outcome of one [`Debouncer::debounce`] request.
///
/// A panic in the executed work is resumed in the task awaiting the handle.
/// If the runtime shuts down before the request is decided, the handle
/// resolves as superseded.
#[derive(Debug)]
pub struct DebounceHandle<T> {
    ordinal: u64,
    rx: oneshot::Receiver<thread::Result<DebounceOutcome<T>>>,
}

impl<T> DebounceHandle<T> {
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl<T> Future for DebounceHandle<T> {
    type Output = DebounceOutcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => DebounceOutcome::Superseded,
        })
    }
}

#[cfg(test)]
#[path = "tests/debouncer_tests.rs"]
mod tests;
