use datableed_game::clock::ManualClock;
use datableed_game::events::{EngineEnv, EventBus};
use datableed_game::realtime::{
    DecisionOutcome, PerformanceTier, RealTimeDecisionEngine, RealTimeError, SessionStatus,
    timing_score,
};
use datableed_game::story::StoryState;
use datableed_game::threats::{Correctness, ThreatDatabase, Urgency};
use datableed_game::{Character, EngineConfig};
use std::rc::Rc;
use std::time::Duration;

struct Rig {
    clock: ManualClock,
    engine: RealTimeDecisionEngine,
    story: StoryState,
    bus: EventBus,
}

impl Rig {
    fn new() -> Self {
        let clock = ManualClock::new();
        let engine = RealTimeDecisionEngine::new(
            ThreatDatabase::bundled().unwrap(),
            EngineConfig::default(),
            Rc::new(clock.clone()),
        );
        Self {
            clock,
            engine,
            story: StoryState::new(),
            bus: EventBus::new(64),
        }
    }

    fn start(&mut self, character: Character, scenario: &str, urgency: Urgency) -> String {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        self.engine
            .start_real_time_scenario(character, scenario, urgency, &mut env)
            .unwrap()
            .session_id
    }
}

#[test]
fn remaining_at_the_optimal_window_scores_full() {
    for allowed in [6.0, 8.0, 10.0, 12.0] {
        let score = timing_score(allowed, allowed * 0.6, 0.6);
        assert!((score - 1.0).abs() < 1e-9, "allowed {allowed}: {score}");
    }
}

#[test]
fn no_time_left_scores_zero_and_never_negative() {
    assert!(timing_score(8.0, 0.0, 0.6).abs() < f64::EPSILON);
    for tenth in -50..=150 {
        let remaining = f64::from(tenth) / 10.0;
        let score = timing_score(8.0, remaining, 0.6);
        assert!((0.0..=1.0).contains(&score), "remaining {remaining}: {score}");
    }
}

#[test]
fn eli_high_urgency_gets_fifteen_seconds_and_overflow_is_clamped() {
    let mut rig = Rig::new();
    let id = rig.start(Character::Eli, "gaming_scam_detection", Urgency::High);
    let view = rig.engine.current_phase_view(&id).unwrap();
    assert_eq!(view.time_remaining, 15);
    assert!((view.time_allowed - 8.0).abs() < f64::EPSILON);

    let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
    let outcome = rig
        .engine
        .process_decision(&id, "ignore_and_report", 10.0, &mut env)
        .unwrap();
    let result = outcome.result();
    assert_eq!(result.correctness, Correctness::Optimal);
    assert!((result.timing_score - 1.0).abs() < f64::EPSILON);
}

#[test]
fn every_phase_answered_completes_and_leaves_the_map() {
    let mut rig = Rig::new();
    let id = rig.start(Character::Stanley, "tech_support_scam", Urgency::Low);
    let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
    let first = rig
        .engine
        .submit_decision(&id, "close_browser", &mut env)
        .unwrap();
    assert!(matches!(first, DecisionOutcome::Advanced { .. }));
    let last = rig
        .engine
        .submit_decision(&id, "hang_up_and_call_bank", &mut env)
        .unwrap();
    let report = last.report().expect("final phase completes").clone();
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.optimal_count, 2);
    assert_eq!(report.tier, PerformanceTier::Excellent);
    assert!(rig.engine.session(&id).is_none());
    assert_eq!(rig.engine.active_sessions(), 0);
    assert_eq!(
        rig.engine.submit_decision(&id, "close_browser", &mut env),
        Err(RealTimeError::UnknownSession(id.clone()))
    );
    assert_eq!(rig.story.trust_score(Character::Stanley), 70);
}

#[test]
fn silence_until_expiry_times_out_with_penalty() {
    let mut rig = Rig::new();
    let id = rig.start(Character::Maya, "romance_scam_response", Urgency::Critical);
    rig.clock.advance(Duration::from_secs(9));
    {
        let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
        assert!(rig.engine.tick(&mut env).is_empty());
    }
    rig.clock.advance(Duration::from_secs(1));
    let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
    let reports = rig.engine.tick(&mut env);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.session_id, id);
    assert_eq!(report.status, SessionStatus::Timeout);
    let last = report.decisions.last().unwrap();
    assert_eq!(last.consequences.get("timeout_penalty"), Some(&-2));
    assert!(report.feedback.contains("Time ran out"));
    assert_eq!(
        rig.story.progress(Character::Maya).metric("timeout_penalty"),
        -2
    );
    assert_eq!(rig.bus.count_named("timerExpired"), 1);
    assert_eq!(rig.bus.count_named("realTimeScenarioCompleted"), 1);
}

#[test]
fn decisions_from_other_phases_are_rejected_without_side_effects() {
    let mut rig = Rig::new();
    let id = rig.start(Character::Eli, "gaming_scam_detection", Urgency::Medium);
    let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
    let err = rig
        .engine
        .submit_decision(&id, "change_password_directly", &mut env)
        .unwrap_err();
    assert!(matches!(err, RealTimeError::DecisionNotInPhase { .. }));
    assert_eq!(rig.story.trust_score(Character::Eli), 50);
    assert!(rig.story.progress(Character::Eli).decisions.is_empty());
}
