//! Reactive state runtime.
//!
//! An [`Interactor`] turns `(state, action)` into a synchronous mutation plus
//! an [`Emission`] describing follow-up async work. The [`Orchestrator`] owns
//! the state, applies transitions one at a time, and runs, tracks and cancels
//! the async units those emissions request. [`Debouncer`] coalesces bursts of
//! requests on a single slot.

pub mod bridge;
pub mod debouncer;
pub mod emission;
pub mod error;
pub mod handle;
pub mod interactor;
pub mod orchestrator;
pub mod settings;

pub use bridge::{ActionSender, ActionSink, Bridge, StateReader, StateSource};
pub use debouncer::{DebounceHandle, DebounceOutcome, Debouncer};
pub use emission::Emission;
pub use error::RuntimeError;
pub use handle::EventTaskHandle;
pub use interactor::{
    combine, from_fn, scope, when, ActionPrism, Combine, FnInteractor, Interactor,
    InteractorExt, Scope, StateLens, When,
};
pub use orchestrator::Orchestrator;
pub use settings::{load_settings, RuntimeSettings};
pub use shared::{
    domain::{EffectId, EffectKind},
    error::BridgeError,
};
