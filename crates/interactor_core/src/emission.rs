//! Follow-up work returned by a transition.

use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, stream::BoxStream, FutureExt, Stream, StreamExt};
use shared::error::BridgeError;
use tracing::{debug, warn};

use crate::bridge::{Bridge, Embed, Projection};

pub type ProducerFuture<A> = BoxFuture<'static, anyhow::Result<Option<A>>>;
pub type ActionStream<A> = BoxStream<'static, anyhow::Result<A>>;

type PerformFn<S, A> = Box<dyn FnOnce(Bridge<S, A>) -> ProducerFuture<A> + Send>;
type FallbackFn<A> = Box<dyn FnOnce(anyhow::Error) -> Option<A> + Send>;
type ObserveFn<S, A> = Box<dyn FnOnce(Bridge<S, A>) -> ActionStream<A> + Send>;

/// One-shot async producer. Runs outside the coordination context.
pub struct Perform<S, A> {
    producer: PerformFn<S, A>,
    fallback: Option<FallbackFn<A>>,
}

impl<S, A> Perform<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    /// Runs the producer, converting a failure into the fallback action (or none).
    pub(crate) async fn run(self, bridge: Bridge<S, A>) -> Option<A> {
        let Perform { producer, fallback } = self;
        match producer(bridge).await {
            Ok(action) => action,
            Err(err) => {
                if let Some(bridge_err) = err.downcast_ref::<BridgeError>() {
                    if bridge_err.is_expected() {
                        debug!(reason = %bridge_err, "effect producer stopped at hop");
                        return None;
                    }
                }
                warn!(error = %err, "effect producer failed");
                fallback.and_then(|fallback| fallback(err))
            }
        }
    }
}

/// Async sequence producer; every element re-enters the coordination context.
pub struct Observe<S, A> {
    producer: ObserveFn<S, A>,
}

impl<S, A> Observe<S, A> {
    pub(crate) fn start(self, bridge: Bridge<S, A>) -> ActionStream<A> {
        (self.producer)(bridge)
    }
}

pub enum Emission<S, A> {
    None,
    Action(A),
    Perform(Perform<S, A>),
    Observe(Observe<S, A>),
    Merge(Vec<Emission<S, A>>),
}

impl<S, A> Emission<S, A>
where
    S: Send + 'static,
    A: Send + 'static,
{
    pub fn none() -> Self {
        Emission::None
    }

    /// Feeds `action` straight back into the transition before `dispatch` returns.
    pub fn action(action: A) -> Self {
        Emission::Action(action)
    }

    pub fn perform<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Bridge<S, A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<A>>> + Send + 'static,
    {
        Emission::Perform(Perform {
            producer: Box::new(move |bridge| producer(bridge).boxed()),
            fallback: None,
        })
    }

    /// Like [`Emission::perform`], but a producer error is mapped through `fallback`.
    pub fn perform_or_else<F, Fut, E>(producer: F, fallback: E) -> Self
    where
        F: FnOnce(Bridge<S, A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<A>>> + Send + 'static,
        E: FnOnce(anyhow::Error) -> Option<A> + Send + 'static,
    {
        Emission::Perform(Perform {
            producer: Box::new(move |bridge| producer(bridge).boxed()),
            fallback: Some(Box::new(fallback)),
        })
    }

    pub fn observe<F, St>(producer: F) -> Self
    where
        F: FnOnce(Bridge<S, A>) -> St + Send + 'static,
        St: Stream<Item = anyhow::Result<A>> + Send + 'static,
    {
        Emission::Observe(Observe {
            producer: Box::new(move |bridge| producer(bridge).boxed()),
        })
    }

    /// Empty input collapses to `none`, a single member is returned as is.
    pub fn merge(members: impl IntoIterator<Item = Emission<S, A>>) -> Self {
        let mut members: Vec<_> = members.into_iter().filter(|e| !e.is_none()).collect();
        match members.len() {
            0 => Emission::None,
            1 => members.pop().unwrap_or(Emission::None),
            _ => Emission::Merge(members),
        }
    }

    pub fn is_none(&self) -> bool {
        match self {
            Emission::None => true,
            Emission::Merge(members) => members.iter().all(Emission::is_none),
            _ => false,
        }
    }

    /// Number of async units this emission would spawn, ignoring `action` recursion.
    pub fn unit_count(&self) -> usize {
        match self {
            Emission::None | Emission::Action(_) => 0,
            Emission::Perform(_) | Emission::Observe(_) => 1,
            Emission::Merge(members) => members.iter().map(Emission::unit_count).sum(),
        }
    }

    /// Re-expresses a child emission in the parent's state/action space.
    pub(crate) fn lift<PS, PA>(
        self,
        projection: Projection<PS, S>,
        embed: Embed<A, PA>,
    ) -> Emission<PS, PA>
    where
        PS: Send + 'static,
        PA: Send + 'static,
    {
        match self {
            Emission::None => Emission::None,
            Emission::Action(action) => Emission::Action(embed(action)),
            Emission::Perform(Perform { producer, fallback }) => {
                let embed_result = Arc::clone(&embed);
                let fallback = fallback.map(|fallback| {
                    let embed = Arc::clone(&embed);
                    Box::new(move |err: anyhow::Error| fallback(err).map(|action| embed(action)))
                        as FallbackFn<PA>
                });
                Emission::Perform(Perform {
                    producer: Box::new(move |parent: Bridge<PS, PA>| {
                        let future = producer(parent.scoped(projection, embed));
                        async move {
                            let action = future.await?;
                            Ok::<_, anyhow::Error>(action.map(|action| embed_result(action)))
                        }
                        .boxed()
                    }),
                    fallback,
                })
            }
            Emission::Observe(Observe { producer }) => Emission::Observe(Observe {
                producer: Box::new(move |parent: Bridge<PS, PA>| {
                    let embed_item = Arc::clone(&embed);
                    producer(parent.scoped(projection, embed))
                        .map(move |item| item.map(|action| embed_item(action)))
                        .boxed()
                }),
            }),
            Emission::Merge(members) => Emission::Merge(
                members
                    .into_iter()
                    .map(|member| member.lift(Arc::clone(&projection), Arc::clone(&embed)))
                    .collect(),
            ),
        }
    }
}

impl<S, A> Default for Emission<S, A> {
    fn default() -> Self {
        Emission::None
    }
}

impl<S, A: fmt::Debug> fmt::Debug for Emission<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emission::None => f.write_str("None"),
            Emission::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Emission::Perform(_) => f.write_str("Perform(..)"),
            Emission::Observe(_) => f.write_str("Observe(..)"),
            Emission::Merge(members) => f.debug_tuple("Merge").field(members).finish(),
        }
    }
}

#[cfg(test)]
#[path = "tests/emission_tests.rs"]
mod tests;
