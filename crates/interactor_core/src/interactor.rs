//! The transition contract and the combinators used to compose interactors.
//!
//! A transition runs synchronously inside the coordination context and is the
//! only place state changes. Anything asynchronous is described by the
//! returned [`Emission`] and started afterwards by the orchestrator.

use std::{marker::PhantomData, sync::Arc};

use tracing::debug;

use crate::{
    bridge::{Embed, Projection},
    emission::Emission,
};

pub trait Interactor: Send + Sync + 'static {
    type State: Clone + PartialEq + Send + Sync + 'static;
    type Action: Send + 'static;

    fn transition(
        &self,
        state: &mut Self::State,
        action: Self::Action,
    ) -> Emission<Self::State, Self::Action>;
}

pub struct FnInteractor<S, A, F> {
    transition: F,
    _marker: PhantomData<fn(&mut S, A)>,
}

/// Builds an interactor from a plain transition closure.
pub fn from_fn<S, A, F>(transition: F) -> FnInteractor<S, A, F>
where
    F: Fn(&mut S, A) -> Emission<S, A> + Send + Sync + 'static,
{
    FnInteractor {
        transition,
        _marker: PhantomData,
    }
}

impl<S, A, F> Interactor for FnInteractor<S, A, F>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    A: Send + 'static,
    F: Fn(&mut S, A) -> Emission<S, A> + Send + Sync + 'static,
{
    type State = S;
    type Action = A;

    fn transition(&self, state: &mut S, action: A) -> Emission<S, A> {
        (self.transition)(state, action)
    }
}

impl<I: Interactor> Interactor for Arc<I> {
    type State = I::State;
    type Action = I::Action;

    fn transition(&self, state: &mut I::State, action: I::Action) -> Emission<I::State, I::Action> {
        I::transition(self, state, action)
    }
}

/// Runs both interactors on every action, `first` before `second`.
pub struct Combine<L, R> {
    first: L,
    second: R,
}

pub fn combine<L, R>(first: L, second: R) -> Combine<L, R>
where
    L: Interactor,
    L::Action: Clone,
    R: Interactor<State = L::State, Action = L::Action>,
{
    Combine { first, second }
}

impl<L, R> Interactor for Combine<L, R>
where
    L: Interactor,
    L::Action: Clone,
    R: Interactor<State = L::State, Action = L::Action>,
{
    type State = L::State;
    type Action = L::Action;

    fn transition(
        &self,
        state: &mut L::State,
        action: L::Action,
    ) -> Emission<L::State, L::Action> {
        let first = self.first.transition(state, action.clone());
        let second = self.second.transition(state, action);
        Emission::merge([first, second])
    }
}

/// Focus from a parent state onto a child state.
///
/// A lens whose getters return `None` for some parent values acts as a case
/// match: the scoped child only runs while the parent is in that case.
pub struct StateLens<P, C> {
    get: Arc<dyn Fn(&P) -> Option<&C> + Send + Sync>,
    get_mut: Arc<dyn Fn(&mut P) -> Option<&mut C> + Send + Sync>,
}

impl<P, C> Clone for StateLens<P, C> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            get_mut: Arc::clone(&self.get_mut),
        }
    }
}

impl<P: 'static, C: 'static> StateLens<P, C> {
    pub fn new<G, M>(get: G, get_mut: M) -> Self
    where
        G: Fn(&P) -> Option<&C> + Send + Sync + 'static,
        M: Fn(&mut P) -> Option<&mut C> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            get_mut: Arc::new(get_mut),
        }
    }

    /// Lens over a child that is always present.
    pub fn field(get: fn(&P) -> &C, get_mut: fn(&mut P) -> &mut C) -> Self {
        Self::new(move |parent| Some(get(parent)), move |parent| Some(get_mut(parent)))
    }

    pub fn get<'a>(&self, parent: &'a P) -> Option<&'a C> {
        (self.get)(parent)
    }

    pub fn get_mut<'a>(&self, parent: &'a mut P) -> Option<&'a mut C> {
        (self.get_mut)(parent)
    }
}

impl<P, C> StateLens<P, C>
where
    P: 'static,
    C: Clone + 'static,
{
    fn projection(&self) -> Projection<P, C> {
        let lens = self.clone();
        Arc::new(move |parent: &P| lens.get(parent).cloned())
    }
}

/// Partial mapping between a parent action and a child action.
pub struct ActionPrism<P, C> {
    extract: Arc<dyn Fn(P) -> Option<C> + Send + Sync>,
    embed: Embed<C, P>,
}

impl<P, C> Clone for ActionPrism<P, C> {
    fn clone(&self) -> Self {
        Self {
            extract: Arc::clone(&self.extract),
            embed: Arc::clone(&self.embed),
        }
    }
}

impl<P: 'static, C: 'static> ActionPrism<P, C> {
    pub fn new<X, E>(extract: X, embed: E) -> Self
    where
        X: Fn(P) -> Option<C> + Send + Sync + 'static,
        E: Fn(C) -> P + Send + Sync + 'static,
    {
        Self {
            extract: Arc::new(extract),
            embed: Arc::new(embed),
        }
    }

    pub fn extract(&self, action: P) -> Option<C> {
        (self.extract)(action)
    }

    pub fn embed(&self, action: C) -> P {
        (self.embed)(action)
    }
}

/// Child interactor lifted into a parent state/action space.
pub struct Scope<I: Interactor, PS, PA> {
    child: I,
    lens: StateLens<PS, I::State>,
    prism: ActionPrism<PA, I::Action>,
}

pub fn scope<I, PS, PA>(
    child: I,
    lens: StateLens<PS, I::State>,
    prism: ActionPrism<PA, I::Action>,
) -> Scope<I, PS, PA>
where
    I: Interactor,
    PS: Clone + PartialEq + Send + Sync + 'static,
    PA: Send + 'static,
{
    Scope { child, lens, prism }
}

impl<I, PS, PA> Interactor for Scope<I, PS, PA>
where
    I: Interactor,
    PS: Clone + PartialEq + Send + Sync + 'static,
    PA: Send + 'static,
{
    type State = PS;
    type Action = PA;

    fn transition(&self, state: &mut PS, action: PA) -> Emission<PS, PA> {
        let Some(child_action) = self.prism.extract(action) else {
            return Emission::none();
        };
        let Some(child_state) = self.lens.get_mut(state) else {
            debug!("scoped action ignored; child state is not present");
            return Emission::none();
        };
        self.child
            .transition(child_state, child_action)
            .lift(self.lens.projection(), Arc::clone(&self.prism.embed))
    }
}

/// Routes actions to `child` only while `predicate` holds for the current state.
pub struct When<I, F> {
    child: I,
    predicate: F,
}

pub fn when<I, F>(child: I, predicate: F) -> When<I, F>
where
    I: Interactor,
    F: Fn(&I::State) -> bool + Send + Sync + 'static,
{
    When { child, predicate }
}

impl<I, F> Interactor for When<I, F>
where
    I: Interactor,
    F: Fn(&I::State) -> bool + Send + Sync + 'static,
{
    type State = I::State;
    type Action = I::Action;

    fn transition(&self, state: &mut I::State, action: I::Action) -> Emission<I::State, I::Action> {
        if (self.predicate)(state) {
            self.child.transition(state, action)
        } else {
            Emission::none()
        }
    }
}

pub trait InteractorExt: Interactor + Sized {
    fn scoped<PS, PA>(
        self,
        lens: StateLens<PS, Self::State>,
        prism: ActionPrism<PA, Self::Action>,
    ) -> Scope<Self, PS, PA>
    where
        PS: Clone + PartialEq + Send + Sync + 'static,
        PA: Send + 'static,
    {
        scope(self, lens, prism)
    }

    fn when<F>(self, predicate: F) -> When<Self, F>
    where
        F: Fn(&Self::State) -> bool + Send + Sync + 'static,
    {
        when(self, predicate)
    }

    fn combine<R>(self, other: R) -> Combine<Self, R>
    where
        Self::Action: Clone,
        R: Interactor<State = Self::State, Action = Self::Action>,
    {
        combine(self, other)
    }
}

impl<I: Interactor> InteractorExt for I {}

#[cfg(test)]
#[path = "tests/interactor_tests.rs"]
mod tests;
