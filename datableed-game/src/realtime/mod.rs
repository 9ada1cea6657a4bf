//! Real-time decision engine.
//!
//! A scenario session moves `Active -> Completed | Timeout | Cancelled`. Each
//! decision is validated against the current phase, scored for timing and
//! applied to story state before the session advances. Sessions leave the
//! active map as soon as they reach a terminal state.

mod feedback;
mod session;

pub use feedback::{PerformanceTier, scenario_feedback};
pub use session::{
    DecisionOutcome, DecisionResult, OptionView, PhaseView, ScenarioReport, ScenarioSession,
    SessionStatus,
};

use crate::character::Character;
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::constants::{KEY_TIMEOUT_PENALTY, TIMEOUT_DECISION_ID};
use crate::events::{EngineEnv, GameEvent, ScenarioStarted};
use crate::numbers::{ratio, usize_to_f64};
use crate::seed::short_id;
use crate::threats::{Consequences, Correctness, ThreatDatabase, Urgency};
use crate::timer::TimerManager;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealTimeError {
    #[error("unknown real-time session '{0}'")]
    UnknownSession(String),
    #[error("no '{scenario_type}' scenario for {character}")]
    UnknownScenario {
        character: Character,
        scenario_type: String,
    },
    #[error("decision '{decision_id}' is not offered in phase '{phase_id}' of session '{session_id}'")]
    DecisionNotInPhase {
        session_id: String,
        phase_id: String,
        decision_id: String,
    },
    #[error("session '{session_id}' is {status}")]
    SessionNotActive {
        session_id: String,
        status: SessionStatus,
    },
}

/// Score a response against a phase allowance.
///
/// `time_used = max(0, time_allowed - time_remaining)`. Anything inside the
/// optimal window scores 1.0; past it the score decays linearly to 0.0 at the
/// end of the allowance.
#[must_use]
pub fn timing_score(time_allowed: f64, time_remaining: f64, optimal_window: f64) -> f64 {
    if !(time_allowed.is_finite() && time_allowed > 0.0) {
        return 0.0;
    }
    let remaining = if time_remaining.is_finite() {
        time_remaining
    } else {
        0.0
    };
    let time_used = (time_allowed - remaining).max(0.0);
    let optimal = time_allowed * optimal_window;
    if time_used <= optimal {
        return 1.0;
    }
    let decay_window = time_allowed - optimal;
    if decay_window <= 0.0 {
        return 0.0;
    }
    (1.0 - (time_used - optimal) / decay_window).clamp(0.0, 1.0)
}

#[derive(Debug)]
pub struct RealTimeDecisionEngine {
    threats: ThreatDatabase,
    config: EngineConfig,
    clock: SharedClock,
    timers: TimerManager,
    sessions: BTreeMap<String, ScenarioSession>,
    current_scenario_id: Option<String>,
    started: u64,
}

impl RealTimeDecisionEngine {
    #[must_use]
    pub fn new(threats: ThreatDatabase, config: EngineConfig, clock: SharedClock) -> Self {
        let timers = TimerManager::new(clock.clone());
        Self {
            threats,
            config,
            clock,
            timers,
            sessions: BTreeMap::new(),
            current_scenario_id: None,
            started: 0,
        }
    }

    #[must_use]
    pub const fn threats(&self) -> &ThreatDatabase {
        &self.threats
    }

    #[must_use]
    pub fn current_scenario_id(&self) -> Option<&str> {
        self.current_scenario_id.as_deref()
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<&ScenarioSession> {
        self.sessions.get(session_id)
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn time_remaining(&self, session_id: &str) -> u32 {
        self.timers.get_time_remaining(session_id)
    }

    /// Build a session, start its timer and make it current.
    ///
    /// # Errors
    ///
    /// Returns [`RealTimeError::UnknownScenario`] when the character has no
    /// scenario of that type.
    pub fn start_real_time_scenario(
        &mut self,
        character: Character,
        scenario_type: &str,
        urgency: Urgency,
        env: &mut EngineEnv<'_>,
    ) -> Result<PhaseView, RealTimeError> {
        let scenario = self
            .threats
            .scenario(character, scenario_type, urgency, &self.config.time_limits)
            .ok_or_else(|| RealTimeError::UnknownScenario {
                character,
                scenario_type: scenario_type.to_string(),
            })?;

        let now = self.clock.now();
        self.started += 1;
        let session_id = short_id(
            "rt",
            &[
                character.id().as_bytes(),
                scenario.id.as_bytes(),
                &self.started.to_le_bytes(),
                &now.as_nanos().to_le_bytes(),
            ],
        );
        let time_limit = scenario.time_limit;
        let session = ScenarioSession {
            id: session_id.clone(),
            character,
            scenario,
            current_phase: 0,
            decisions: Vec::new(),
            status: SessionStatus::Active,
            started_at: now,
        };
        let view = self.view_of(&session)?;

        self.timers.start(session_id.clone(), f64::from(time_limit));
        log::info!(
            "real-time scenario {} started for {character} ({urgency}, {time_limit}s) as {session_id}",
            session.scenario.id
        );
        env.publish(GameEvent::RealTimeScenarioStarted(ScenarioStarted {
            session_id: session_id.clone(),
            character,
            scenario_id: session.scenario.id.clone(),
            urgency,
            time_limit,
        }));
        self.sessions.insert(session_id.clone(), session);
        self.current_scenario_id = Some(session_id);
        Ok(view)
    }

    /// View of the phase a session is waiting on.
    ///
    /// # Errors
    ///
    /// Returns [`RealTimeError::UnknownSession`] when no such session is active.
    pub fn current_phase_view(&self, session_id: &str) -> Result<PhaseView, RealTimeError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RealTimeError::UnknownSession(session_id.to_string()))?;
        self.view_of(session)
    }

    fn view_of(&self, session: &ScenarioSession) -> Result<PhaseView, RealTimeError> {
        let phase = session
            .phase()
            .ok_or_else(|| RealTimeError::SessionNotActive {
                session_id: session.id.clone(),
                status: session.status,
            })?;
        let remaining = if self.timers.is_running(&session.id) {
            self.timers.get_time_remaining(&session.id)
        } else {
            session.scenario.time_limit
        };
        Ok(PhaseView::build(session, phase, remaining))
    }

    /// Score and apply a decision for the session's current phase.
    ///
    /// # Errors
    ///
    /// Fails when the session is unknown or not active, or the decision is not
    /// offered in the current phase. Nothing is applied on failure.
    pub fn process_decision(
        &mut self,
        session_id: &str,
        decision_id: &str,
        time_remaining: f64,
        env: &mut EngineEnv<'_>,
    ) -> Result<DecisionOutcome, RealTimeError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RealTimeError::UnknownSession(session_id.to_string()))?;
        if session.status.is_terminal() {
            return Err(RealTimeError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status,
            });
        }
        let Some(phase) = session.scenario.phase(session.current_phase) else {
            return Err(RealTimeError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status,
            });
        };
        let decision =
            phase
                .decision(decision_id)
                .ok_or_else(|| RealTimeError::DecisionNotInPhase {
                    session_id: session_id.to_string(),
                    phase_id: phase.id.clone(),
                    decision_id: decision_id.to_string(),
                })?;

        let result = DecisionResult {
            phase_id: phase.id.clone(),
            decision_id: decision.id.clone(),
            correctness: decision.correctness,
            time_remaining,
            timing_score: timing_score(
                phase.time_allowed,
                time_remaining,
                self.config.optimal_window,
            ),
            consequences: decision.consequences.clone(),
        };
        log::debug!(
            "session {session_id} phase {} decision {} ({:?}, timing {:.2})",
            result.phase_id,
            result.decision_id,
            result.correctness,
            result.timing_score
        );

        let character = session.character;
        session.decisions.push(result.clone());
        env.story
            .record_decision(character, format!("realtime:{}", result.decision_id));
        env.apply_consequences(character, &result.consequences);

        if session.is_last_phase() {
            session.status = SessionStatus::Completed;
            let report = self.finish(session_id, env)?;
            return Ok(DecisionOutcome::Completed { result, report });
        }
        session.current_phase += 1;
        let next = self.current_phase_view(session_id)?;
        Ok(DecisionOutcome::Advanced { result, next })
    }

    /// [`Self::process_decision`] using the time left on the session timer.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process_decision`].
    pub fn submit_decision(
        &mut self,
        session_id: &str,
        decision_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<DecisionOutcome, RealTimeError> {
        let remaining = f64::from(self.timers.get_time_remaining(session_id));
        self.process_decision(session_id, decision_id, remaining, env)
    }

    /// Stop a session without rolling back consequences already applied.
    ///
    /// # Errors
    ///
    /// Returns [`RealTimeError::UnknownSession`] when no such session is active.
    pub fn cancel_scenario(&mut self, session_id: &str) -> Result<ScenarioSession, RealTimeError> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| RealTimeError::UnknownSession(session_id.to_string()))?;
        self.timers.stop_timer(session_id);
        self.release_current(session_id);
        session.status = SessionStatus::Cancelled;
        log::info!("real-time session {session_id} cancelled");
        Ok(session)
    }

    /// Hand "current" to the most recently started session left, if any.
    fn release_current(&mut self, session_id: &str) {
        if self.current_scenario_id.as_deref() != Some(session_id) {
            return;
        }
        self.current_scenario_id = self
            .sessions
            .values()
            .max_by_key(|s| (s.started_at, s.id.clone()))
            .map(|s| s.id.clone());
    }

    /// Cancel every active session. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.iter()
            .filter(|id| self.cancel_scenario(id).is_ok())
            .count()
    }

    /// Poll timers, time out expired sessions and return their reports.
    pub fn tick(&mut self, env: &mut EngineEnv<'_>) -> Vec<ScenarioReport> {
        let mut reports = Vec::new();
        for timer_id in self.timers.poll() {
            env.publish(GameEvent::TimerExpired {
                timer_id: timer_id.clone(),
            });
            match self.handle_timeout(&timer_id, env) {
                Ok(report) => reports.push(report),
                Err(err) => log::debug!("timer {timer_id} expired without a session: {err}"),
            }
        }
        reports
    }

    fn handle_timeout(
        &mut self,
        session_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ScenarioReport, RealTimeError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RealTimeError::UnknownSession(session_id.to_string()))?;
        if session.status.is_terminal() {
            return Err(RealTimeError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status,
            });
        }
        let phase_id = session
            .phase()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        let mut consequences = Consequences::new();
        consequences.insert(KEY_TIMEOUT_PENALTY.to_string(), self.config.timeout_penalty);
        let result = DecisionResult {
            phase_id,
            decision_id: TIMEOUT_DECISION_ID.to_string(),
            correctness: Correctness::Poor,
            time_remaining: 0.0,
            timing_score: 0.0,
            consequences,
        };
        let character = session.character;
        session.decisions.push(result.clone());
        session.status = SessionStatus::Timeout;
        log::warn!("real-time session {session_id} timed out");
        env.story
            .record_decision(character, format!("realtime:{TIMEOUT_DECISION_ID}"));
        env.apply_consequences(character, &result.consequences);
        self.finish(session_id, env)
    }

    fn finish(
        &mut self,
        session_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ScenarioReport, RealTimeError> {
        let session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| RealTimeError::UnknownSession(session_id.to_string()))?;
        self.timers.stop_timer(session_id);
        self.release_current(session_id);

        let total = session.decisions.len();
        let optimal_count = session.optimal_count();
        let optimal_ratio = ratio(optimal_count, total);
        let average_timing = if total == 0 {
            0.0
        } else {
            session.decisions.iter().map(|d| d.timing_score).sum::<f64>() / usize_to_f64(total)
        };
        let tier = PerformanceTier::from_ratio(optimal_ratio, &self.config.tiers);
        let report = ScenarioReport {
            session_id: session.id.clone(),
            character: session.character,
            scenario_id: session.scenario.id.clone(),
            status: session.status,
            feedback: scenario_feedback(
                session.character,
                tier,
                optimal_count,
                total,
                session.status == SessionStatus::Timeout,
            ),
            decisions: session.decisions,
            optimal_count,
            optimal_ratio,
            average_timing,
            tier,
        };
        log::info!(
            "real-time session {session_id} finished: {} ({}/{total} optimal, {tier})",
            report.status,
            optimal_count
        );
        env.publish(GameEvent::RealTimeScenarioCompleted(report.clone()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::story::StoryState;
    use std::rc::Rc;
    use std::time::Duration;

    struct Rig {
        engine: RealTimeDecisionEngine,
        clock: ManualClock,
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
                engine,
                clock,
                story: StoryState::new(),
                bus: EventBus::new(64),
            }
        }

        fn start(&mut self) -> PhaseView {
            let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
            self.engine
                .start_real_time_scenario(
                    Character::Eli,
                    "gaming_scam_detection",
                    Urgency::High,
                    &mut env,
                )
                .unwrap()
        }

        fn decide(&mut self, id: &str, decision: &str, remaining: f64) -> DecisionOutcome {
            let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
            self.engine
                .process_decision(id, decision, remaining, &mut env)
                .unwrap()
        }
    }

    #[test]
    fn timing_score_window_and_floor() {
        assert!((timing_score(10.0, 6.0, 0.6) - 1.0).abs() < f64::EPSILON);
        assert!((timing_score(8.0, 10.0, 0.6) - 1.0).abs() < f64::EPSILON);
        assert!(timing_score(8.0, 0.0, 0.6).abs() < 1e-12);
        assert!(timing_score(8.0, -3.0, 0.6).abs() < 1e-12);
        let mid = timing_score(10.0, 2.0, 0.6);
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn starts_with_phase_zero_and_high_urgency_limit() {
        let mut rig = Rig::new();
        let view = rig.start();
        assert_eq!(view.phase_index, 0);
        assert_eq!(view.phase_id, "suspicious_trade_offer");
        assert_eq!(view.time_remaining, 15);
        assert_eq!(
            rig.engine.current_scenario_id(),
            Some(view.session_id.as_str())
        );
        assert_eq!(rig.bus.count_named("realTimeScenarioStarted"), 1);
    }

    #[test]
    fn completing_every_phase_removes_session() {
        let mut rig = Rig::new();
        let id = rig.start().session_id;
        let first = rig.decide(&id, "ignore_and_report", 10.0);
        assert!((first.result().timing_score - 1.0).abs() < f64::EPSILON);
        let DecisionOutcome::Advanced { next, .. } = first else {
            panic!("expected next phase");
        };
        assert_eq!(next.phase_id, "account_alert");

        let done = rig.decide(&id, "change_password_directly", 5.0);
        let report = done.report().unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.tier, PerformanceTier::Excellent);
        assert_eq!(rig.engine.active_sessions(), 0);
        assert!(rig.engine.current_scenario_id().is_none());
        assert_eq!(rig.story.trust_score(Character::Eli), 70);
        assert_eq!(rig.story.progress(Character::Eli).metric("security_awareness"), 4);
    }

    #[test]
    fn stale_decision_is_rejected_without_side_effects() {
        let mut rig = Rig::new();
        let id = rig.start().session_id;
        rig.decide(&id, "ignore_and_report", 8.0);
        let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
        let err = rig
            .engine
            .process_decision(&id, "ignore_and_report", 8.0, &mut env)
            .unwrap_err();
        assert!(matches!(err, RealTimeError::DecisionNotInPhase { .. }));
        assert_eq!(rig.engine.session(&id).unwrap().decisions.len(), 1);
    }

    #[test]
    fn expiry_forces_timeout_penalty() {
        let mut rig = Rig::new();
        let id = rig.start().session_id;
        rig.clock.advance(Duration::from_millis(14_900));
        let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
        assert!(rig.engine.tick(&mut env).is_empty());
        rig.clock.advance(Duration::from_millis(100));
        let reports = rig.engine.tick(&mut env);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.session_id, id);
        assert_eq!(report.status, SessionStatus::Timeout);
        let last = report.decisions.last().unwrap();
        assert_eq!(last.decision_id, "timeout");
        assert_eq!(last.consequences.get("timeout_penalty"), Some(&-2));
        assert_eq!(rig.story.progress(Character::Eli).metric("timeout_penalty"), -2);
        assert_eq!(rig.bus.count_named("timerExpired"), 1);
        assert_eq!(rig.engine.active_sessions(), 0);
    }

    #[test]
    fn cancel_keeps_applied_consequences() {
        let mut rig = Rig::new();
        let id = rig.start().session_id;
        rig.decide(&id, "log_in_quickly", 7.0);
        let cancelled = rig.engine.cancel_scenario(&id).unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(rig.story.trust_score(Character::Eli), 35);
        assert!(matches!(
            rig.engine.cancel_scenario(&id),
            Err(RealTimeError::UnknownSession(_))
        ));
        rig.clock.advance(Duration::from_secs(20));
        let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
        assert!(rig.engine.tick(&mut env).is_empty());
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        let mut rig = Rig::new();
        let mut env = EngineEnv::new(&mut rig.story, &mut rig.bus);
        let err = rig
            .engine
            .start_real_time_scenario(Character::Stanley, "loot_box", Urgency::Low, &mut env)
            .unwrap_err();
        assert!(matches!(err, RealTimeError::UnknownScenario { .. }));
    }
}
