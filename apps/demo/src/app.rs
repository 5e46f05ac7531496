//! Forecast/search/clock application wired onto the interactor runtime.

use std::time::Duration;

use anyhow::bail;
use futures::StreamExt;
use interactor_core::{
    from_fn, ActionPrism, Bridge, Debouncer, Emission, Interactor, InteractorExt, StateLens,
};
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

const KNOWN_PLACES: &[&str] = &[
    "Lisbon", "Lima", "Linz", "Liverpool", "Porto", "Paris", "Prague", "Oslo", "Osaka",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastState {
    pub nonce: u64,
    pub loading: bool,
    pub location: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub stale_results: u32,
}

#[derive(Debug, Clone)]
pub enum ForecastAction {
    LocationTapped(String),
    Loaded { nonce: u64, summary: String },
    Failed { nonce: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    pub query: String,
    pub searching: bool,
    pub suggestions: Vec<String>,
    pub superseded: u32,
}

#[derive(Debug, Clone)]
pub enum SearchAction {
    QueryChanged(String),
    SuggestionsLoaded(Vec<String>),
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClockState {
    pub running: bool,
    pub ticks: u32,
}

#[derive(Debug, Clone)]
pub enum ClockAction {
    Start { ticks: usize, period: Duration },
    Tick,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub offline: bool,
    pub forecast: ForecastState,
    pub search: SearchState,
    pub clock: ClockState,
}

#[derive(Debug, Clone)]
pub enum AppAction {
    SetOffline(bool),
    Forecast(ForecastAction),
    Search(SearchAction),
    Clock(ClockAction),
}

/// Stand-in for a remote weather backend.
pub async fn lookup_forecast(location: &str) -> anyhow::Result<String> {
    let latency = 15 * (location.len() as u64 % 4 + 1);
    tokio::time::sleep(Duration::from_millis(latency)).await;
    if !KNOWN_PLACES
        .iter()
        .any(|place| place.eq_ignore_ascii_case(location))
    {
        bail!("no weather station near '{location}'");
    }
    Ok(format!("{location}: 21C, clear skies"))
}

pub fn suggest(query: &str) -> Vec<String> {
    let needle = query.to_ascii_lowercase();
    KNOWN_PLACES
        .iter()
        .filter(|place| place.to_ascii_lowercase().starts_with(&needle))
        .map(|place| place.to_string())
        .collect()
}

pub fn forecast() -> impl Interactor<State = ForecastState, Action = ForecastAction> {
    from_fn(|state: &mut ForecastState, action: ForecastAction| match action {
        ForecastAction::LocationTapped(location) => {
            state.nonce += 1;
            state.loading = true;
            state.error = None;
            state.location = Some(location.clone());
            let nonce = state.nonce;
            Emission::perform_or_else(
                move |_| async move {
                    let summary = lookup_forecast(&location).await?;
                    Ok(Some(ForecastAction::Loaded { nonce, summary }))
                },
                move |err| {
                    Some(ForecastAction::Failed {
                        nonce,
                        reason: err.to_string(),
                    })
                },
            )
        }
        ForecastAction::Loaded { nonce, summary } => {
            if nonce != state.nonce {
                state.stale_results += 1;
                debug!(nonce, current = state.nonce, "stale forecast discarded");
                return Emission::none();
            }
            state.loading = false;
            state.summary = Some(summary);
            Emission::none()
        }
        ForecastAction::Failed { nonce, reason } => {
            if nonce != state.nonce {
                state.stale_results += 1;
                return Emission::none();
            }
            state.loading = false;
            state.summary = None;
            state.error = Some(reason);
            Emission::none()
        }
    })
}

/// Suggestions are fetched only for the last query typed within one window.
pub struct SearchInteractor {
    debouncer: Debouncer,
}

impl SearchInteractor {
    pub fn new(debouncer: Debouncer) -> Self {
        Self { debouncer }
    }
}

impl Interactor for SearchInteractor {
    type State = SearchState;
    type Action = SearchAction;

    fn transition(
        &self,
        state: &mut SearchState,
        action: SearchAction,
    ) -> Emission<SearchState, SearchAction> {
        match action {
            SearchAction::QueryChanged(query) => {
                state.query = query.clone();
                if query.trim().is_empty() {
                    self.debouncer.cancel();
                    state.searching = false;
                    state.suggestions.clear();
                    return Emission::none();
                }
                state.searching = true;
                let pending = self.debouncer.debounce(move || async move { suggest(&query) });
                Emission::perform(move |bridge: Bridge<SearchState, SearchAction>| async move {
                    let outcome = pending.await;
                    if outcome.is_superseded() {
                        return Ok(Some(SearchAction::Superseded));
                    }
                    // The query may have been cleared while the window was open.
                    if bridge.read().await?.query.trim().is_empty() {
                        return Ok(None);
                    }
                    Ok(outcome.executed().map(SearchAction::SuggestionsLoaded))
                })
            }
            SearchAction::SuggestionsLoaded(suggestions) => {
                state.searching = false;
                state.suggestions = suggestions;
                Emission::none()
            }
            SearchAction::Superseded => {
                state.superseded += 1;
                Emission::none()
            }
        }
    }
}

pub fn clock() -> impl Interactor<State = ClockState, Action = ClockAction> {
    from_fn(|state: &mut ClockState, action: ClockAction| match action {
        ClockAction::Start { ticks, period } => {
            if state.running {
                return Emission::none();
            }
            state.running = true;
            Emission::observe(move |_| {
                // The first interval tick is immediate; skip it.
                IntervalStream::new(tokio::time::interval(period))
                    .skip(1)
                    .take(ticks)
                    .map(|_| Ok(ClockAction::Tick))
                    .chain(futures::stream::once(async { Ok(ClockAction::Stopped) }))
            })
        }
        ClockAction::Tick => {
            if state.running {
                state.ticks += 1;
            }
            Emission::none()
        }
        ClockAction::Stopped => {
            state.running = false;
            Emission::none()
        }
    })
}

fn connectivity() -> impl Interactor<State = AppState, Action = AppAction> {
    from_fn(|state: &mut AppState, action: AppAction| {
        if let AppAction::SetOffline(offline) = action {
            state.offline = offline;
        }
        Emission::none()
    })
}

/// Whole application: network-backed features only run while online.
pub fn app(debouncer: Debouncer) -> impl Interactor<State = AppState, Action = AppAction> {
    let online = |state: &AppState| !state.offline;

    let forecast = forecast()
        .scoped(
            StateLens::field(
                |app: &AppState| &app.forecast,
                |app: &mut AppState| &mut app.forecast,
            ),
            ActionPrism::new(
                |action| match action {
                    AppAction::Forecast(inner) => Some(inner),
                    _ => None,
                },
                AppAction::Forecast,
            ),
        )
        .when(online);
    let search = SearchInteractor::new(debouncer)
        .scoped(
            StateLens::field(
                |app: &AppState| &app.search,
                |app: &mut AppState| &mut app.search,
            ),
            ActionPrism::new(
                |action| match action {
                    AppAction::Search(inner) => Some(inner),
                    _ => None,
                },
                AppAction::Search,
            ),
        )
        .when(online);
    let clock = clock().scoped(
        StateLens::field(|app: &AppState| &app.clock, |app: &mut AppState| &mut app.clock),
        ActionPrism::new(
            |action| match action {
                AppAction::Clock(inner) => Some(inner),
                _ => None,
            },
            AppAction::Clock,
        ),
    );

    connectivity().combine(forecast).combine(search).combine(clock)
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
