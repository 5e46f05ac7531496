//! State/Send bridge handed to async producers.
//!
//! Producers never touch the orchestrator directly. Every read and every
//! emitted action is a hop back into the coordination context through one of
//! the seams below, so a cancelled or torn-down unit simply stops hopping.

use std::sync::Arc;

use async_trait::async_trait;
use shared::error::BridgeError;
use tracing::debug;

/// Maps a parent state to a child snapshot; `None` when the child is absent.
pub type Projection<P, C> = Arc<dyn Fn(&P) -> Option<C> + Send + Sync>;
/// Wraps a child action into its parent action.
pub type Embed<C, P> = Arc<dyn Fn(C) -> P + Send + Sync>;

#[async_trait]
pub trait StateSource<S>: Send + Sync {
    async fn read(&self) -> Result<S, BridgeError>;
}

#[async_trait]
pub trait ActionSink<A>: Send + Sync {
    async fn send(&self, action: A) -> Result<(), BridgeError>;
}

pub struct StateReader<S> {
    source: Arc<dyn StateSource<S>>,
}

impl<S> Clone for StateReader<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: Send + 'static> StateReader<S> {
    pub fn new(source: Arc<dyn StateSource<S>>) -> Self {
        Self { source }
    }

    /// Fresh snapshot of the state as of the most recently committed mutation.
    pub async fn read(&self) -> Result<S, BridgeError> {
        self.source.read().await
    }
}

pub struct ActionSender<A> {
    sink: Arc<dyn ActionSink<A>>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<A: Send + 'static> ActionSender<A> {
    pub fn new(sink: Arc<dyn ActionSink<A>>) -> Self {
        Self { sink }
    }

    /// Dispatches `action` from inside an effect. Dropped silently when the
    /// owning unit was cancelled or the orchestrator is gone.
    pub async fn send(&self, action: A) {
        if let Err(reason) = self.sink.send(action).await {
            debug!(%reason, "dropped action sent from inactive effect");
        }
    }

    pub async fn try_send(&self, action: A) -> Result<(), BridgeError> {
        self.sink.send(action).await
    }
}

pub struct Bridge<S, A> {
    state: StateReader<S>,
    sender: ActionSender<A>,
}

impl<S, A> Clone for Bridge<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<S, A> Bridge<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    pub fn new(state: StateReader<S>, sender: ActionSender<A>) -> Self {
        Self { state, sender }
    }

    pub async fn read(&self) -> Result<S, BridgeError> {
        self.state.read().await
    }

    pub async fn send(&self, action: A) {
        self.sender.send(action).await
    }

    pub fn reader(&self) -> &StateReader<S> {
        &self.state
    }

    pub fn sender(&self) -> &ActionSender<A> {
        &self.sender
    }

    pub(crate) fn scoped<CS, CA>(
        self,
        projection: Projection<S, CS>,
        embed: Embed<CA, A>,
    ) -> Bridge<CS, CA>
    where
        CS: Send + 'static,
        CA: Send + 'static,
    {
        Bridge {
            state: StateReader::new(Arc::new(ScopedSource {
                parent: self.state,
                projection,
            })),
            sender: ActionSender::new(Arc::new(ScopedSink {
                parent: self.sender,
                embed,
            })),
        }
    }
}

struct ScopedSource<P, C> {
    parent: StateReader<P>,
    projection: Projection<P, C>,
}

#[async_trait]
impl<P, C> StateSource<C> for ScopedSource<P, C>
where
    P: Send + 'static,
    C: Send + 'static,
{
    async fn read(&self) -> Result<C, BridgeError> {
        let parent = self.parent.read().await?;
        (self.projection)(&parent).ok_or(BridgeError::OutOfScope)
    }
}

struct ScopedSink<C, P> {
    parent: ActionSender<P>,
    embed: Embed<C, P>,
}

#[async_trait]
impl<C, P> ActionSink<C> for ScopedSink<C, P>
where
    C: Send + 'static,
    P: Send + 'static,
{
    async fn send(&self, action: C) -> Result<(), BridgeError> {
        self.parent.try_send((self.embed)(action)).await
    }
}
