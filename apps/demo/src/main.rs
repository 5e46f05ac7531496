use std::{path::PathBuf, time::Duration};

mod app;
mod view;

use anyhow::Result;
use clap::Parser;
use interactor_core::{load_settings, Debouncer, EventTaskHandle, Interactor, Orchestrator};
use tokio::sync::watch;
use tracing::info;

use crate::{
    app::{AppAction, AppState, ClockAction, ForecastAction, SearchAction},
    view::present,
};

#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `interactor.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    debounce_ms: Option<u64>,
    /// Search queries, typed back to back.
    #[arg(long = "query")]
    queries: Vec<String>,
    /// Locations tapped back to back; only the last one's forecast is kept.
    #[arg(long = "location")]
    locations: Vec<String>,
    #[arg(long, default_value_t = 3)]
    ticks: usize,
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Start offline; forecast and search requests are ignored.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(debounce_ms) = args.debounce_ms {
        settings.debounce_window_ms = debounce_ms;
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();
    info!(debounce_ms = settings.debounce_window_ms, "starting session");

    let interactor = app::app(Debouncer::from_settings(&settings)?);
    let orchestrator = Orchestrator::new(AppState::default(), interactor)?;
    let printer = tokio::spawn(print_views(orchestrator.subscribe()));

    let handles = run_session(&orchestrator, &args);
    for handle in &handles {
        handle.finish().await;
    }
    let final_view = present(&orchestrator.state());
    drop(orchestrator);
    printer.await??;

    println!("final: {}", serde_json::to_string_pretty(&final_view)?);
    Ok(())
}

fn run_session<I>(orchestrator: &Orchestrator<I>, args: &Args) -> Vec<EventTaskHandle>
where
    I: Interactor<State = AppState, Action = AppAction>,
{
    let locations = if args.locations.is_empty() {
        vec!["Porto".to_string(), "Lisbon".to_string()]
    } else {
        args.locations.clone()
    };
    let queries = if args.queries.is_empty() {
        vec!["l".to_string(), "li".to_string(), "lis".to_string()]
    } else {
        args.queries.clone()
    };

    let mut handles = Vec::new();
    if args.offline {
        handles.push(orchestrator.dispatch(AppAction::SetOffline(true)));
    }
    handles.push(orchestrator.dispatch(AppAction::Clock(ClockAction::Start {
        ticks: args.ticks,
        period: Duration::from_millis(args.tick_ms),
    })));
    for location in locations {
        handles.push(orchestrator.dispatch(AppAction::Forecast(ForecastAction::LocationTapped(
            location,
        ))));
    }
    for query in queries {
        handles.push(orchestrator.dispatch(AppAction::Search(SearchAction::QueryChanged(query))));
    }
    info!(
        effects = handles.iter().map(EventTaskHandle::effect_count).sum::<usize>(),
        "session dispatched"
    );
    handles
}

async fn print_views(mut changes: watch::Receiver<AppState>) -> Result<()> {
    while changes.changed().await.is_ok() {
        let view = present(&changes.borrow_and_update());
        println!("{}", serde_json::to_string(&view)?);
    }
    Ok(())
}
