use super::*;

#[derive(Debug, Clone, PartialEq, Default)]
struct Counter {
    value: i64,
    log: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
enum CounterAction {
    Add(i64),
    AddThenReset(i64),
    Reset,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    Idle,
    Editing(Counter),
}

#[derive(Debug, Clone, PartialEq)]
struct App {
    total: Counter,
    screen: Screen,
    enabled: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            total: Counter::default(),
            screen: Screen::Idle,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AppAction {
    Total(CounterAction),
    Screen(CounterAction),
}

fn counter() -> impl Interactor<State = Counter, Action = CounterAction> {
    from_fn(|state: &mut Counter, action: CounterAction| match action {
        CounterAction::Add(delta) => {
            state.value += delta;
            Emission::none()
        }
        CounterAction::AddThenReset(delta) => {
            state.value += delta;
            Emission::action(CounterAction::Reset)
        }
        CounterAction::Reset => {
            state.value = 0;
            Emission::none()
        }
        CounterAction::Fetch => Emission::perform(|_| async { Ok(Some(CounterAction::Add(1))) }),
    })
}

fn total_scope() -> impl Interactor<State = App, Action = AppAction> {
    counter().scoped(
        StateLens::field(|app: &App| &app.total, |app: &mut App| &mut app.total),
        ActionPrism::new(
            |action| match action {
                AppAction::Total(inner) => Some(inner),
                _ => None,
            },
            AppAction::Total,
        ),
    )
}

fn editing_scope() -> impl Interactor<State = App, Action = AppAction> {
    counter().scoped(
        StateLens::new(
            |app: &App| match &app.screen {
                Screen::Editing(counter) => Some(counter),
                Screen::Idle => None,
            },
            |app: &mut App| match &mut app.screen {
                Screen::Editing(counter) => Some(counter),
                Screen::Idle => None,
            },
        ),
        ActionPrism::new(
            |action| match action {
                AppAction::Screen(inner) => Some(inner),
                _ => None,
            },
            AppAction::Screen,
        ),
    )
}

#[test]
fn closure_interactor_mutates_state() {
    let interactor = counter();
    let mut state = Counter::default();
    let emission = interactor.transition(&mut state, CounterAction::Add(4));
    assert!(emission.is_none());
    assert_eq!(state.value, 4);
}

#[test]
fn combined_interactors_run_in_declaration_order() {
    let first = from_fn(|state: &mut Counter, _: CounterAction| {
        state.log.push("first");
        Emission::none()
    });
    let second = from_fn(|state: &mut Counter, _: CounterAction| {
        state.log.push("second");
        Emission::perform(|_| async { Ok(None) })
    });
    let combined = combine(first, second);

    let mut state = Counter::default();
    let emission = combined.transition(&mut state, CounterAction::Reset);
    assert_eq!(state.log, vec!["first", "second"]);
    assert_eq!(emission.unit_count(), 1);
}

#[test]
fn combined_emissions_are_merged() {
    let combined = counter().combine(counter());
    let mut state = Counter::default();
    let emission = combined.transition(&mut state, CounterAction::Fetch);
    assert_eq!(emission.unit_count(), 2);
}

#[test]
fn scope_routes_only_matching_actions() {
    let interactor = total_scope();
    let mut app = App::default();

    let emission = interactor.transition(&mut app, AppAction::Total(CounterAction::Add(3)));
    assert!(emission.is_none());
    assert_eq!(app.total.value, 3);

    let emission = interactor.transition(&mut app, AppAction::Screen(CounterAction::Add(9)));
    assert!(emission.is_none());
    assert_eq!(app.total.value, 3);
}

#[test]
fn scope_lifts_child_actions_into_parent_space() {
    let interactor = total_scope();
    let mut app = App::default();
    let emission =
        interactor.transition(&mut app, AppAction::Total(CounterAction::AddThenReset(2)));

    assert_eq!(app.total.value, 2);
    assert!(matches!(
        emission,
        Emission::Action(AppAction::Total(CounterAction::Reset))
    ));
}

#[test]
fn scope_lifts_child_effects() {
    let interactor = total_scope();
    let mut app = App::default();
    let emission = interactor.transition(&mut app, AppAction::Total(CounterAction::Fetch));
    assert_eq!(emission.unit_count(), 1);
}

#[test]
fn case_scope_ignores_actions_while_case_does_not_match() {
    let interactor = editing_scope();
    let mut app = App::default();

    let emission = interactor.transition(&mut app, AppAction::Screen(CounterAction::Add(5)));
    assert!(emission.is_none());
    assert_eq!(app.screen, Screen::Idle);

    app.screen = Screen::Editing(Counter::default());
    interactor.transition(&mut app, AppAction::Screen(CounterAction::Add(5)));
    assert_eq!(
        app.screen,
        Screen::Editing(Counter {
            value: 5,
            log: Vec::new(),
        })
    );
}

#[test]
fn when_routes_only_while_predicate_holds() {
    let interactor = total_scope().when(|app: &App| app.enabled);
    let mut app = App::default();

    interactor.transition(&mut app, AppAction::Total(CounterAction::Add(1)));
    assert_eq!(app.total.value, 1);

    app.enabled = false;
    let emission = interactor.transition(&mut app, AppAction::Total(CounterAction::Fetch));
    assert!(emission.is_none());
    assert_eq!(app.total.value, 1);
}

#[test]
fn scopes_compose_into_one_parent_interactor() {
    let interactor = total_scope().combine(editing_scope());
    let mut app = App {
        screen: Screen::Editing(Counter::default()),
        ..App::default()
    };

    interactor.transition(&mut app, AppAction::Total(CounterAction::Add(2)));
    interactor.transition(&mut app, AppAction::Screen(CounterAction::Add(7)));

    assert_eq!(app.total.value, 2);
    assert!(matches!(app.screen, Screen::Editing(Counter { value: 7, .. })));
}

#[test]
fn shared_interactor_delegates_through_arc() {
    let interactor = Arc::new(counter());
    let mut state = Counter::default();
    interactor.transition(&mut state, CounterAction::Add(6));
    assert_eq!(state.value, 6);
}
