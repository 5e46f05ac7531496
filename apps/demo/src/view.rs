//! Stateless mapping from application state to what the terminal shows.

use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppView {
    pub status: &'static str,
    pub forecast: String,
    pub search: SearchView,
    pub clock: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchView {
    pub query: String,
    pub hint: String,
    pub suggestions: Vec<String>,
}

pub fn present(state: &AppState) -> AppView {
    let forecast = &state.forecast;
    let forecast_line = match (&forecast.location, forecast.loading) {
        (None, _) => "Tap a location to see its forecast".to_string(),
        (Some(location), true) => format!("Loading forecast for {location}..."),
        (Some(location), false) => match (&forecast.summary, &forecast.error) {
            (Some(summary), _) => summary.clone(),
            (None, Some(error)) => format!("Forecast unavailable: {error}"),
            (None, None) => format!("No forecast for {location}"),
        },
    };

    let search = &state.search;
    let hint = if search.query.is_empty() {
        String::new()
    } else if search.searching {
        "searching...".to_string()
    } else if search.suggestions.is_empty() {
        "no matches".to_string()
    } else {
        format!("{} matches", search.suggestions.len())
    };

    AppView {
        status: if state.offline { "offline" } else { "online" },
        forecast: forecast_line,
        search: SearchView {
            query: search.query.clone(),
            hint,
            suggestions: search.suggestions.clone(),
        },
        clock: if state.clock.running {
            format!("tick {}", state.clock.ticks)
        } else {
            format!("stopped after {} ticks", state.clock.ticks)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ForecastState, SearchState};

    #[test]
    fn fresh_state_prompts_for_a_location() {
        let view = present(&AppState::default());
        assert_eq!(view.status, "online");
        assert_eq!(view.forecast, "Tap a location to see its forecast");
        assert_eq!(view.search.hint, "");
        assert_eq!(view.clock, "stopped after 0 ticks");
    }

    #[test]
    fn failed_forecast_is_reported() {
        let state = AppState {
            forecast: ForecastState {
                location: Some("Atlantis".into()),
                error: Some("no weather station near 'Atlantis'".into()),
                ..ForecastState::default()
            },
            ..AppState::default()
        };
        assert_eq!(
            present(&state).forecast,
            "Forecast unavailable: no weather station near 'Atlantis'"
        );
    }

    #[test]
    fn view_serializes_for_the_terminal() {
        let state = AppState {
            offline: true,
            search: SearchState {
                query: "li".into(),
                suggestions: vec!["Lisbon".into(), "Lima".into()],
                ..SearchState::default()
            },
            ..AppState::default()
        };
        let json = serde_json::to_value(present(&state)).expect("serialize view");
        assert_eq!(json["status"], "offline");
        assert_eq!(json["search"]["hint"], "2 matches");
        assert_eq!(json["search"]["suggestions"][1], "Lima");
    }
}
