use datableed_game::clock::ManualClock;
use datableed_game::mechanics::MechanicKind;
use datableed_game::router::DecisionEvent;
use datableed_game::session::{PlaySession, RouteStatus};
use datableed_game::storage::{MemorySessionStore, SessionStore};
use datableed_game::{Character, ContentPack, EngineConfig, EngineEnv, EventBus, StoryState};
use std::rc::Rc;

fn session() -> (PlaySession<MemorySessionStore>, MemorySessionStore) {
    let store = MemorySessionStore::new();
    let session = PlaySession::new(
        ContentPack::bundled().unwrap(),
        &EngineConfig::default(),
        0x5EED,
        Rc::new(ManualClock::new()),
        store.clone(),
    );
    (session, store)
}

#[test]
fn mechanic_choices_route_and_update_current_mode() {
    let (mut session, store) = session();
    session.fire_trigger("eli_intro").unwrap();
    let result = session.make_choice(Character::Eli, "check_giveaway").unwrap();
    assert_eq!(result.route, RouteStatus::Routed(MechanicKind::Investigation));
    assert_eq!(
        session.mechanics().active_mechanic(),
        Some(MechanicKind::Investigation)
    );
    assert_eq!(
        store.get_item("currentMode").unwrap().as_deref(),
        Some("investigation")
    );
    let board = session.mechanics().investigation().board().unwrap();
    assert_eq!(board.id, "eli_discord_giveaway");
    assert_eq!(session.router().stats().successful_routes, 1);
}

#[test]
fn only_one_mechanic_is_ever_active() {
    let (mut session, _store) = session();
    session.fire_trigger("eli_intro").unwrap();
    session.make_choice(Character::Eli, "check_giveaway").unwrap();
    let result = session.make_choice(Character::Eli, "quick_alert").unwrap();
    assert_eq!(result.route, RouteStatus::Routed(MechanicKind::Realtime));
    assert_eq!(session.mechanics().active_count(), 1);
    assert!(!session.mechanics().is_active(MechanicKind::Investigation));
    assert_eq!(session.events().count_named("mechanicDeactivated"), 1);
}

#[test]
fn unbound_character_fails_the_route_and_stays_in_story() {
    let (mut session, store) = session();
    session.fire_trigger("stanley_intro").unwrap();
    session
        .make_choice(Character::Stanley, "call_refund_line")
        .unwrap();
    session
        .make_choice(Character::Stanley, "handle_popup")
        .unwrap();
    session.abandon_mechanic().unwrap();
    let result = session
        .make_choice(Character::Stanley, "secure_accounts")
        .unwrap();
    assert_eq!(result.route, RouteStatus::Failed(MechanicKind::Action));
    assert_eq!(session.mechanics().active_count(), 0);
    assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("story"));
    let stats = session.router().stats();
    assert_eq!(stats.total_routes, 2);
    assert_eq!(stats.failed_routes, 1);
}

#[test]
fn unmapped_mechanic_kind_returns_false_without_panicking() {
    let (mut session, _store) = session();
    session.router_mut().table_mut().remove_rule(MechanicKind::Puzzle);
    session.fire_trigger("maya_intro").unwrap();
    session.make_choice(Character::Maya, "move_chat").unwrap();
    let result = session
        .make_choice(Character::Maya, "read_carefully")
        .unwrap();
    assert_eq!(result.route, RouteStatus::Failed(MechanicKind::Puzzle));
    assert_eq!(session.router().stats().failed_routes, 1);
    let record = session.router().history().last().unwrap();
    assert_eq!(record.choice_id, "read_carefully");
    assert!(!record.success);
}

#[test]
fn router_can_drive_a_standalone_engine() {
    let pack = ContentPack::bundled().unwrap();
    let mut mechanics = datableed_game::GamingMechanicsEngine::new(
        pack.threats,
        pack.investigations,
        pack.puzzles,
        pack.actions,
        &EngineConfig::default(),
        Rc::new(ManualClock::new()),
    );
    let mut router = datableed_game::MechanicRouter::new(pack.routing, 3);
    let mut story = StoryState::new();
    let mut bus = EventBus::new(32);
    let mut env = EngineEnv::new(&mut story, &mut bus);
    for character in Character::ALL {
        let routed = router.route_decision(
            &DecisionEvent {
                character,
                choice_id: format!("{character}_puzzle"),
                mechanic: MechanicKind::Puzzle,
            },
            &mut mechanics,
            &mut env,
        );
        assert!(routed, "{character} puzzle should route");
        let view = mechanics.puzzle().current_challenge().unwrap();
        assert!(view.puzzle_id.starts_with(character.id()));
    }
    assert_eq!(router.stats().successful_routes, 3);
    assert!((router.stats().success_rate() - 1.0).abs() < f64::EPSILON);
}
