//! Effect runtime: owns the state, drives the interactor, tracks async units.
//!
//! The coordination context is a mutex around the state and the pending
//! effect map. Transitions and emission interpretation happen while it is
//! held; it is never held across an `.await`. Async units run on the tokio
//! runtime and hop back in through [`UnitLink`], which holds only a weak
//! reference so a torn-down orchestrator is not kept alive by its effects.
//!
//! Follow-on units spawned when a unit's action is applied are folded into
//! that unit: they are cancelled with it and it waits for them before it
//! retires. `EventTaskHandle::finish` therefore covers whole effect chains.

use std::{
    collections::HashMap,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use async_trait::async_trait;
use futures::{future::join_all, FutureExt, StreamExt};
use shared::{
    domain::{DispatchId, EffectId, EffectKind},
    error::BridgeError,
};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bridge::{ActionSender, ActionSink, Bridge, StateReader, StateSource},
    emission::{Emission, Observe, Perform},
    error::RuntimeError,
    handle::EventTaskHandle,
    interactor::Interactor,
};

#[derive(Debug, Clone)]
struct PendingEffect {
    kind: EffectKind,
    token: CancellationToken,
}

struct Core<S> {
    state: S,
    pending: HashMap<EffectId, PendingEffect>,
    torn_down: bool,
}

struct Shared<I: Interactor> {
    interactor: I,
    core: Mutex<Core<I::State>>,
    runtime: Handle,
    changes: watch::Sender<I::State>,
    next_effect: AtomicU64,
    next_dispatch: AtomicU64,
}

pub struct Orchestrator<I: Interactor> {
    shared: Arc<Shared<I>>,
}

impl<I: Interactor> Orchestrator<I> {
    /// Binds to the ambient tokio runtime.
    pub fn new(state: I::State, interactor: I) -> Result<Self, RuntimeError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(state, interactor, runtime))
    }

    pub fn with_runtime(state: I::State, interactor: I, runtime: Handle) -> Self {
        let (changes, _) = watch::channel(state.clone());
        Self {
            shared: Arc::new(Shared {
                interactor,
                core: Mutex::new(Core {
                    state,
                    pending: HashMap::new(),
                    torn_down: false,
                }),
                runtime,
                changes,
                next_effect: AtomicU64::new(1),
                next_dispatch: AtomicU64::new(1),
            }),
        }
    }

    /// Applies `action` synchronously and starts whatever async work it requests.
    pub fn dispatch(&self, action: I::Action) -> EventTaskHandle {
        self.shared.dispatch(action)
    }

    pub fn state(&self) -> I::State {
        self.shared.lock_core().state.clone()
    }

    pub fn reader(&self) -> StateReader<I::State> {
        let link: Arc<UnitLink<I>> = Arc::new(UnitLink::new(
            Arc::downgrade(&self.shared),
            CancellationToken::new(),
        ));
        StateReader::new(link)
    }

    /// Receives a fresh snapshot after every dispatch or hop that changed state.
    pub fn subscribe(&self) -> watch::Receiver<I::State> {
        self.shared.changes.subscribe()
    }

    pub fn interactor(&self) -> &I {
        &self.shared.interactor
    }

    /// Live bookkeeping entries, composites included.
    pub fn pending_effects(&self) -> Vec<(EffectId, EffectKind)> {
        let core = self.shared.lock_core();
        let mut pending: Vec<_> = core
            .pending
            .iter()
            .map(|(id, effect)| (*id, effect.kind))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.lock_core().torn_down
    }

    /// Cancels every in-flight unit. Later dispatches become no-ops and late
    /// deliveries from already-running units are dropped.
    pub fn shutdown(&self) {
        self.shared.teardown();
    }
}

impl<I: Interactor> Drop for Orchestrator<I> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl<I: Interactor> Shared<I> {
    fn lock_core(&self) -> MutexGuard<'_, Core<I::State>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, action: I::Action) -> EventTaskHandle {
        let dispatch_id = DispatchId(self.next_dispatch.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();

        let mut core = self.lock_core();
        if core.torn_down {
            debug!(%dispatch_id, "dispatch after teardown ignored");
            return EventTaskHandle::noop();
        }
        let units = self.apply(&mut core, action, &token);
        if units.is_empty() {
            return EventTaskHandle::noop();
        }
        let effects = units.len();
        let composite = self.register(&mut core, EffectKind::Composite, token.clone());
        drop(core);

        debug!(%dispatch_id, effect_id = %composite, effects, "dispatch spawned effects");
        let (done_tx, done_rx) = watch::channel(false);
        let shared = Arc::downgrade(self);
        self.runtime.spawn(async move {
            await_units(units).await;
            if let Some(shared) = shared.upgrade() {
                shared.retire(composite);
            }
            let _ = done_tx.send(true);
        });
        EventTaskHandle::new(token, done_rx, effects)
    }

    /// Transition plus interpretation; publishes the state if it changed.
    fn apply(
        self: &Arc<Self>,
        core: &mut Core<I::State>,
        action: I::Action,
        parent: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let before = core.state.clone();
        let emission = self.interactor.transition(&mut core.state, action);
        let units = self.interpret(core, emission, parent);
        if core.state != before {
            self.changes.send_replace(core.state.clone());
        }
        units
    }

    fn interpret(
        self: &Arc<Self>,
        core: &mut Core<I::State>,
        emission: Emission<I::State, I::Action>,
        parent: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        match emission {
            Emission::None => Vec::new(),
            Emission::Action(action) => {
                let next = self.interactor.transition(&mut core.state, action);
                self.interpret(core, next, parent)
            }
            Emission::Perform(perform) => vec![self.spawn_perform(core, perform, parent)],
            Emission::Observe(observe) => vec![self.spawn_observe(core, observe, parent)],
            Emission::Merge(members) => {
                let mut units = Vec::new();
                for member in members {
                    units.extend(self.interpret(core, member, parent));
                }
                units
            }
        }
    }

    fn register(
        &self,
        core: &mut Core<I::State>,
        kind: EffectKind,
        token: CancellationToken,
    ) -> EffectId {
        let id = EffectId(self.next_effect.fetch_add(1, Ordering::Relaxed));
        core.pending.insert(id, PendingEffect { kind, token });
        debug!(effect_id = %id, kind = kind.as_str(), "effect registered");
        id
    }

    fn retire(&self, id: EffectId) {
        if let Some(effect) = self.lock_core().pending.remove(&id) {
            debug!(effect_id = %id, kind = effect.kind.as_str(), "effect retired");
        }
    }

    fn spawn_perform(
        self: &Arc<Self>,
        core: &mut Core<I::State>,
        perform: Perform<I::State, I::Action>,
        parent: &CancellationToken,
    ) -> JoinHandle<()> {
        let token = parent.child_token();
        let id = self.register(core, EffectKind::Perform, token.clone());
        let link = Arc::new(UnitLink::new(Arc::downgrade(self), token.clone()));
        let bridge = UnitLink::bridge(&link);

        let body = {
            let link = Arc::clone(&link);
            async move {
                let produced = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    action = perform.run(bridge) => action,
                };
                if let Some(action) = produced {
                    if let Err(reason) = link.deliver(action) {
                        debug!(effect_id = %id, %reason, "perform result dropped");
                    }
                }
            }
        };
        self.runtime.spawn(run_unit(link, id, body))
    }

    fn spawn_observe(
        self: &Arc<Self>,
        core: &mut Core<I::State>,
        observe: Observe<I::State, I::Action>,
        parent: &CancellationToken,
    ) -> JoinHandle<()> {
        let token = parent.child_token();
        let id = self.register(core, EffectKind::Observe, token.clone());
        let link = Arc::new(UnitLink::new(Arc::downgrade(self), token.clone()));
        let bridge = UnitLink::bridge(&link);

        let body = {
            let link = Arc::clone(&link);
            async move {
                let mut stream = observe.start(bridge);
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(action)) => {
                            if let Err(reason) = link.deliver(action) {
                                debug!(effect_id = %id, %reason, "observation stopped");
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(
                                effect_id = %id,
                                error = %err,
                                "observed element failed; skipping"
                            );
                        }
                        None => break,
                    }
                }
            }
        };
        self.runtime.spawn(run_unit(link, id, body))
    }

    fn teardown(&self) {
        let cancelled: Vec<PendingEffect> = {
            let mut core = self.lock_core();
            if core.torn_down {
                return;
            }
            core.torn_down = true;
            core.pending.drain().map(|(_, effect)| effect).collect()
        };
        for effect in &cancelled {
            effect.token.cancel();
        }
        info!(cancelled = cancelled.len(), "orchestrator torn down");
    }
}

/// Settles and retires the unit on every exit path, then re-raises a panic
/// from `body` so the composite still reports it.
async fn run_unit<I, F>(link: Arc<UnitLink<I>>, id: EffectId, body: F)
where
    I: Interactor,
    F: Future<Output = ()>,
{
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    link.settle().await;
    link.retire(id);
    if let Err(payload) = outcome {
        panic::resume_unwind(payload);
    }
}

async fn await_units(units: Vec<JoinHandle<()>>) {
    for outcome in join_all(units).await {
        if let Err(err) = outcome {
            if err.is_panic() {
                warn!(error = %err, "effect unit panicked");
            }
        }
    }
}

/// A unit's way back into the coordination context.
struct UnitLink<I: Interactor> {
    shared: Weak<Shared<I>>,
    token: CancellationToken,
    followers: Mutex<Vec<JoinHandle<()>>>,
}

impl<I: Interactor> UnitLink<I> {
    fn new(shared: Weak<Shared<I>>, token: CancellationToken) -> Self {
        Self {
            shared,
            token,
            followers: Mutex::new(Vec::new()),
        }
    }

    fn bridge(link: &Arc<Self>) -> Bridge<I::State, I::Action> {
        let source: Arc<dyn StateSource<I::State>> = link.clone();
        let sink: Arc<dyn ActionSink<I::Action>> = link.clone();
        Bridge::new(StateReader::new(source), ActionSender::new(sink))
    }

    /// Applies `action` exactly as a dispatch would, unless this unit was
    /// cancelled or the orchestrator is gone.
    fn deliver(&self, action: I::Action) -> Result<(), BridgeError> {
        if self.token.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        let shared = self.shared.upgrade().ok_or(BridgeError::Detached)?;
        let units = {
            let mut core = shared.lock_core();
            if core.torn_down {
                return Err(BridgeError::Detached);
            }
            if self.token.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }
            shared.apply(&mut core, action, &self.token)
        };
        if !units.is_empty() {
            self.followers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(units);
        }
        Ok(())
    }

    /// Waits for follow-on units, including ones they add while we wait.
    async fn settle(&self) {
        loop {
            let batch = std::mem::take(
                &mut *self.followers.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                break;
            }
            await_units(batch).await;
        }
    }

    fn retire(&self, id: EffectId) {
        if let Some(shared) = self.shared.upgrade() {
            shared.retire(id);
        }
    }
}

#[async_trait]
impl<I: Interactor> StateSource<I::State> for UnitLink<I> {
    async fn read(&self) -> Result<I::State, BridgeError> {
        if self.token.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        let shared = self.shared.upgrade().ok_or(BridgeError::Detached)?;
        let core = shared.lock_core();
        if core.torn_down {
            return Err(BridgeError::Detached);
        }
        Ok(core.state.clone())
    }
}

#[async_trait]
impl<I: Interactor> ActionSink<I::Action> for UnitLink<I> {
    async fn send(&self, action: I::Action) -> Result<(), BridgeError> {
        self.deliver(action)
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
