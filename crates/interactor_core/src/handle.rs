//! Caller-visible handle over the units spawned by one dispatch.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Dropping the handle detaches it; the spawned work keeps running.
#[derive(Debug, Clone)]
pub struct EventTaskHandle {
    token: CancellationToken,
    done: Option<watch::Receiver<bool>>,
    effects: usize,
}

impl EventTaskHandle {
    pub(crate) fn new(
        token: CancellationToken,
        done: watch::Receiver<bool>,
        effects: usize,
    ) -> Self {
        Self {
            token,
            done: Some(done),
            effects,
        }
    }

    /// Handle for a dispatch that spawned nothing.
    pub(crate) fn noop() -> Self {
        Self {
            token: CancellationToken::new(),
            done: None,
            effects: 0,
        }
    }

    /// Cancels every aggregated unit, including follow-on units they spawned.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn has_effects(&self) -> bool {
        self.effects > 0
    }

    /// Units spawned directly by the dispatch.
    pub fn effect_count(&self) -> usize {
        self.effects
    }

    pub fn is_finished(&self) -> bool {
        self.done.as_ref().map_or(true, |done| *done.borrow())
    }

    /// Resolves once every aggregated unit has completed or stopped after cancellation.
    pub async fn finish(&self) {
        let Some(done) = &self.done else {
            return;
        };
        let mut done = done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}
