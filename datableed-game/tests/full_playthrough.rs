use datableed_game::clock::ManualClock;
use datableed_game::mechanics::MechanicKind;
use datableed_game::mechanics::investigation::InvestigationTool;
use datableed_game::realtime::{DecisionOutcome, PerformanceTier};
use datableed_game::session::{PlaySession, RouteStatus};
use datableed_game::storage::{MemorySessionStore, SessionStore};
use datableed_game::{BundledContent, Character, GameEngine};
use std::rc::Rc;
use std::time::Duration;

fn engine() -> (GameEngine<BundledContent, MemorySessionStore>, MemorySessionStore) {
    let store = MemorySessionStore::new();
    (GameEngine::new(BundledContent, store.clone()), store)
}

fn correct_option(session: &PlaySession<MemorySessionStore>) -> String {
    let view = session.mechanics().puzzle().current_challenge().unwrap();
    let template = session
        .mechanics()
        .puzzle()
        .library()
        .get(&view.puzzle_id)
        .unwrap();
    template.challenges[view.index]
        .options
        .iter()
        .find(|o| o.correct)
        .unwrap()
        .id
        .clone()
}

#[test]
fn maya_investigates_then_answers_under_pressure() {
    let (engine, store) = engine();
    let mut session = engine
        .create_session(7, Rc::new(ManualClock::new()))
        .unwrap();

    session.fire_trigger("maya_intro").unwrap();
    let choice = session
        .make_choice(Character::Maya, "investigate_profile")
        .unwrap();
    assert_eq!(choice.route, RouteStatus::Routed(MechanicKind::Investigation));
    assert_eq!(choice.outcome.next.as_ref().unwrap().node_id, "maya_date_plans");

    let miss = session
        .use_tool(InvestigationTool::MetadataViewer, "profile_photos")
        .unwrap();
    assert!(!miss.finding.as_ref().unwrap().red_flag);
    session
        .use_tool(InvestigationTool::ReverseImageSearch, "profile_photos")
        .unwrap();
    session
        .use_tool(InvestigationTool::ProfileAnalyzer, "bio")
        .unwrap();
    let last = session
        .use_tool(InvestigationTool::LinkScanner, "chat_link")
        .unwrap();
    let outcome = last.outcome.expect("three red flags close the board");
    assert_eq!(outcome.tier, PerformanceTier::Excellent);
    assert_eq!(session.mechanics().active_count(), 0);
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("story"));

    session.make_choice(Character::Maya, "keep_distance").unwrap();
    let choice = session.make_choice(Character::Maya, "respond_now").unwrap();
    assert_eq!(choice.route, RouteStatus::Routed(MechanicKind::Realtime));
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("realtime"));

    let first = session.submit_decision("decline_and_report").unwrap();
    assert!(matches!(first, DecisionOutcome::Advanced { .. }));
    let done = session.submit_decision("reverse_image_search").unwrap();
    assert_eq!(done.report().unwrap().optimal_count, 2);

    let progress = session.story().progress(Character::Maya);
    assert_eq!(progress.trust_score, 71);
    assert_eq!(progress.metric("security_awareness"), 5);
    assert!(progress.completed_mechanics.contains(&MechanicKind::Investigation));
    assert!(progress.completed_mechanics.contains(&MechanicKind::Realtime));
    assert!(session.current_node(Character::Maya).is_none());
    assert_eq!(session.events().count_named("mechanicCompleted"), 2);
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("story"));
}

#[test]
fn eli_solves_the_puzzle_and_holds_the_stream() {
    let (engine, _store) = engine();
    let clock = ManualClock::new();
    let mut session = engine.create_session(99, Rc::new(clock.clone())).unwrap();

    session.fire_trigger("eli_intro").unwrap();
    session.make_choice(Character::Eli, "ignore_giveaway").unwrap();
    let choice = session.make_choice(Character::Eli, "decode_offer").unwrap();
    assert_eq!(choice.route, RouteStatus::Routed(MechanicKind::Puzzle));

    let mut puzzle_outcome = None;
    while session.mechanics().is_active(MechanicKind::Puzzle) {
        let option = correct_option(&session);
        puzzle_outcome = session.answer_puzzle(&option).unwrap().outcome;
    }
    let puzzle_outcome = puzzle_outcome.unwrap();
    assert_eq!(puzzle_outcome.score, puzzle_outcome.max_score);

    let choice = session.make_choice(Character::Eli, "defend_stream").unwrap();
    assert_eq!(choice.route, RouteStatus::Routed(MechanicKind::Action));
    let mut action_outcome = None;
    while let Some(phase) = session.mechanics().action().current_phase() {
        let sequence = session
            .mechanics()
            .action()
            .library()
            .get(&phase.sequence_id)
            .unwrap();
        let best = sequence.phases[phase.index]
            .actions
            .iter()
            .max_by_key(|a| a.points)
            .unwrap()
            .id
            .clone();
        clock.advance(Duration::from_secs(2));
        action_outcome = session.perform_action(&best).unwrap().outcome;
        if action_outcome.is_some() {
            break;
        }
    }
    let action_outcome = action_outcome.unwrap();
    assert_eq!(action_outcome.tier, PerformanceTier::Excellent);
    assert_eq!(
        session.story().progress(Character::Eli).completed_mechanics,
        vec![MechanicKind::Puzzle, MechanicKind::Action]
    );
}

#[test]
fn progress_survives_a_reload() {
    let (engine, _store) = engine();
    let mut session = engine.create_session(5, Rc::new(ManualClock::new())).unwrap();
    session.fire_trigger("stanley_intro").unwrap();
    session
        .make_choice(Character::Stanley, "call_refund_line")
        .unwrap();
    engine.save_progress(&session).unwrap();

    let restored = engine
        .load_progress(5, Rc::new(ManualClock::new()))
        .unwrap()
        .expect("snapshot saved");
    assert_eq!(restored.story().trust_score(Character::Stanley), 40);
    assert_eq!(
        restored
            .current_node(Character::Stanley)
            .map(|node| node.node_id),
        Some("stanley_popup".to_string())
    );
}

#[test]
fn realtime_timeout_through_the_session_returns_to_story() {
    let (engine, store) = engine();
    let clock = ManualClock::new();
    let mut session = engine.create_session(1, Rc::new(clock.clone())).unwrap();
    session.fire_trigger("stanley_intro").unwrap();
    session
        .make_choice(Character::Stanley, "inspect_invoice")
        .unwrap();
    session
        .make_choice(Character::Stanley, "handle_popup")
        .unwrap();
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("realtime"));

    clock.advance(Duration::from_secs(31));
    let outcomes = session.tick().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].score, 0);
    assert_eq!(outcomes[0].tier, PerformanceTier::Poor);
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("story"));
    assert_eq!(
        session
            .story()
            .progress(Character::Stanley)
            .metric("timeout_penalty"),
        -2
    );
}
