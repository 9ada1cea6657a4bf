//! Gaming mechanics engine.
//!
//! Four mini-games plug into the engine through [`Mechanic`]. Dispatch goes
//! through an exhaustive match on [`MechanicKind`], and at most one mechanic
//! is active at a time: activating one first deactivates the rest.

pub mod action;
pub mod investigation;
pub mod puzzle;
pub mod realtime;

use crate::character::Character;
use crate::clock::SharedClock;
use crate::config::{EngineConfig, TierThresholds};
use crate::events::{EngineEnv, GameEvent};
use crate::realtime::{DecisionOutcome, PerformanceTier, RealTimeError};
use crate::threats::{ThreatDatabase, Urgency};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use action::{ActionLibrary, ActionMechanic, ActionReport};
use investigation::{InvestigationLibrary, InvestigationMechanic, InvestigationTool, ToolReport};
use puzzle::{AnswerReport, PuzzleLibrary, PuzzleMechanic};
use realtime::RealTimeMechanic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MechanicKind {
    Investigation,
    Realtime,
    Puzzle,
    Action,
}

impl MechanicKind {
    pub const ALL: [Self; 4] = [
        Self::Investigation,
        Self::Realtime,
        Self::Puzzle,
        Self::Action,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Investigation => "investigation",
            Self::Realtime => "realtime",
            Self::Puzzle => "puzzle",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for MechanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mechanic '{0}'")]
pub struct UnknownMechanic(pub String);

impl FromStr for MechanicKind {
    type Err = UnknownMechanic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.id() == needle)
            .ok_or_else(|| UnknownMechanic(s.to_string()))
    }
}

/// Everything a mechanic needs to know when it is activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanicContext {
    pub kind: MechanicKind,
    pub character: Character,
    pub area: String,
    pub target: String,
    pub urgency: Urgency,
    pub trust_score: i32,
    #[serde(default)]
    pub metrics: BTreeMap<String, i32>,
    pub seed: u64,
}

/// Final score of a finished mechanic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanicOutcome {
    pub kind: MechanicKind,
    pub character: Character,
    pub content_id: String,
    pub score: u32,
    pub max_score: u32,
    pub tier: PerformanceTier,
    pub feedback: String,
}

/// Canned closing text per tier, authored alongside each mini-game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GradeFeedback {
    pub excellent: String,
    pub good: String,
    pub fair: String,
    pub poor: String,
}

impl GradeFeedback {
    #[must_use]
    pub fn for_tier(&self, tier: PerformanceTier) -> &str {
        match tier {
            PerformanceTier::Excellent => &self.excellent,
            PerformanceTier::Good => &self.good,
            PerformanceTier::Fair => &self.fair,
            PerformanceTier::Poor => &self.poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MechanicError {
    #[error("mechanic {0} is not registered")]
    NotRegistered(MechanicKind),
    #[error("mechanic {0} is not active")]
    NotActive(MechanicKind),
    #[error("{kind} has no content '{id}'")]
    UnknownContent { kind: MechanicKind, id: String },
    #[error("{kind} content '{id}' belongs to another storyline than {character}")]
    WrongCharacter {
        kind: MechanicKind,
        id: String,
        character: Character,
    },
    #[error("nothing named '{target}' to investigate on board '{board}'")]
    UnknownTarget { board: String, target: String },
    #[error("'{option}' is not a choice in '{step}'")]
    UnknownOption { step: String, option: String },
    #[error(transparent)]
    RealTime(#[from] RealTimeError),
}

/// Activation hooks every mini-game implements.
pub trait Mechanic {
    fn kind(&self) -> MechanicKind;

    /// # Errors
    ///
    /// Returns an error when the context names content this mechanic lacks.
    fn activate(
        &mut self,
        ctx: &MechanicContext,
        env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError>;

    fn deactivate(&mut self, env: &mut EngineEnv<'_>);

    fn is_active(&self) -> bool;
}

pub(crate) fn score_ratio(score: u32, max_score: u32) -> f64 {
    if max_score == 0 {
        return 0.0;
    }
    f64::from(score) / f64::from(max_score)
}

pub(crate) fn grade(
    kind: MechanicKind,
    character: Character,
    content_id: &str,
    score: u32,
    max_score: u32,
    tiers: &TierThresholds,
    feedback: &GradeFeedback,
) -> MechanicOutcome {
    let tier = PerformanceTier::from_ratio(score_ratio(score, max_score), tiers);
    MechanicOutcome {
        kind,
        character,
        content_id: content_id.to_string(),
        score,
        max_score,
        tier,
        feedback: feedback.for_tier(tier).to_string(),
    }
}

#[derive(Debug)]
pub struct GamingMechanicsEngine {
    investigation: InvestigationMechanic,
    realtime: RealTimeMechanic,
    puzzle: PuzzleMechanic,
    action: ActionMechanic,
    registered: BTreeSet<MechanicKind>,
    active: BTreeSet<MechanicKind>,
    completed: Vec<MechanicOutcome>,
}

impl GamingMechanicsEngine {
    /// Engine with every mechanic registered.
    #[must_use]
    pub fn new(
        threats: ThreatDatabase,
        investigations: InvestigationLibrary,
        puzzles: PuzzleLibrary,
        actions: ActionLibrary,
        config: &EngineConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            investigation: InvestigationMechanic::new(investigations, config.tiers.clone()),
            realtime: RealTimeMechanic::new(threats, config.clone(), clock.clone()),
            puzzle: PuzzleMechanic::new(puzzles, config.tiers.clone()),
            action: ActionMechanic::new(actions, config.tiers.clone(), clock),
            registered: MechanicKind::ALL.into_iter().collect(),
            active: BTreeSet::new(),
            completed: Vec::new(),
        }
    }

    fn mechanic_mut(&mut self, kind: MechanicKind) -> &mut dyn Mechanic {
        match kind {
            MechanicKind::Investigation => &mut self.investigation,
            MechanicKind::Realtime => &mut self.realtime,
            MechanicKind::Puzzle => &mut self.puzzle,
            MechanicKind::Action => &mut self.action,
        }
    }

    pub fn register(&mut self, kind: MechanicKind) -> bool {
        self.registered.insert(kind)
    }

    /// Remove a mechanic from the registry, deactivating it first if needed.
    pub fn unregister(&mut self, kind: MechanicKind, env: &mut EngineEnv<'_>) -> bool {
        if self.active.contains(&kind) {
            self.deactivate_mechanic(kind, env);
        }
        self.registered.remove(&kind)
    }

    #[must_use]
    pub fn is_registered(&self, kind: MechanicKind) -> bool {
        self.registered.contains(&kind)
    }

    #[must_use]
    pub fn is_active(&self, kind: MechanicKind) -> bool {
        self.active.contains(&kind)
    }

    #[must_use]
    pub fn active_mechanic(&self) -> Option<MechanicKind> {
        self.active.iter().next().copied()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn completed(&self) -> &[MechanicOutcome] {
        &self.completed
    }

    /// Deactivate whatever is running, then activate `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error when `kind` is not registered or its activation
    /// fails. Mechanics deactivated beforehand stay deactivated.
    pub fn activate_mechanic(
        &mut self,
        kind: MechanicKind,
        ctx: &MechanicContext,
        env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError> {
        if !self.registered.contains(&kind) {
            return Err(MechanicError::NotRegistered(kind));
        }
        self.deactivate_all(env);
        self.mechanic_mut(kind).activate(ctx, env)?;
        self.active.insert(kind);
        log::info!("mechanic {kind} activated for {}", ctx.character);
        env.publish(GameEvent::MechanicActivated {
            kind,
            character: ctx.character,
        });
        Ok(())
    }

    pub fn deactivate_mechanic(&mut self, kind: MechanicKind, env: &mut EngineEnv<'_>) {
        if self.active.remove(&kind) {
            self.mechanic_mut(kind).deactivate(env);
            log::debug!("mechanic {kind} deactivated");
            env.publish(GameEvent::MechanicDeactivated { kind });
        }
    }

    pub fn deactivate_all(&mut self, env: &mut EngineEnv<'_>) {
        let active: Vec<MechanicKind> = self.active.iter().copied().collect();
        for kind in active {
            self.deactivate_mechanic(kind, env);
        }
    }

    /// Record a finished mechanic in story state and announce it.
    ///
    /// Real-time play stays active while other scenarios are still running.
    pub fn complete_mechanic(&mut self, outcome: MechanicOutcome, env: &mut EngineEnv<'_>) {
        let kind = outcome.kind;
        let still_running = kind == MechanicKind::Realtime && self.realtime.is_active();
        if !still_running {
            self.active.remove(&kind);
            self.mechanic_mut(kind).deactivate(env);
        }
        env.story.mark_completed(outcome.character, kind);
        log::info!(
            "mechanic {kind} completed for {}: {}/{} ({})",
            outcome.character,
            outcome.score,
            outcome.max_score,
            outcome.tier
        );
        self.completed.push(outcome.clone());
        env.publish(GameEvent::MechanicCompleted(outcome));
    }

    #[must_use]
    pub const fn investigation(&self) -> &InvestigationMechanic {
        &self.investigation
    }

    #[must_use]
    pub const fn realtime(&self) -> &RealTimeMechanic {
        &self.realtime
    }

    pub fn realtime_mut(&mut self) -> &mut RealTimeMechanic {
        &mut self.realtime
    }

    #[must_use]
    pub const fn puzzle(&self) -> &PuzzleMechanic {
        &self.puzzle
    }

    #[must_use]
    pub const fn action(&self) -> &ActionMechanic {
        &self.action
    }

    fn require_active(&self, kind: MechanicKind) -> Result<(), MechanicError> {
        if self.active.contains(&kind) {
            Ok(())
        } else {
            Err(MechanicError::NotActive(kind))
        }
    }

    /// # Errors
    ///
    /// Fails unless the investigation is active and `target` is on its board.
    pub fn use_tool(
        &mut self,
        tool: InvestigationTool,
        target: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ToolReport, MechanicError> {
        self.require_active(MechanicKind::Investigation)?;
        let report = self.investigation.use_tool(tool, target)?;
        if let Some(outcome) = &report.outcome {
            self.complete_mechanic(outcome.clone(), env);
        }
        Ok(report)
    }

    /// # Errors
    ///
    /// Fails unless a puzzle is active and `option_id` is offered.
    pub fn answer_puzzle(
        &mut self,
        option_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<AnswerReport, MechanicError> {
        self.require_active(MechanicKind::Puzzle)?;
        let report = self.puzzle.answer(option_id, env)?;
        if let Some(outcome) = &report.outcome {
            self.complete_mechanic(outcome.clone(), env);
        }
        Ok(report)
    }

    /// # Errors
    ///
    /// Fails unless an action sequence is active and `action_id` is offered.
    pub fn perform_action(
        &mut self,
        action_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ActionReport, MechanicError> {
        self.require_active(MechanicKind::Action)?;
        let report = self.action.perform(action_id, env)?;
        if let Some(outcome) = &report.outcome {
            self.complete_mechanic(outcome.clone(), env);
        }
        Ok(report)
    }

    /// Answer the current real-time phase using the session timer.
    ///
    /// # Errors
    ///
    /// Fails when no scenario is current or the decision is rejected.
    pub fn submit_realtime_decision(
        &mut self,
        decision_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<DecisionOutcome, MechanicError> {
        let outcome = self.realtime.submit_current(decision_id, env)?;
        if let Some(report) = outcome.report() {
            let finished = RealTimeMechanic::outcome_from_report(report);
            self.complete_mechanic(finished, env);
        }
        Ok(outcome)
    }

    /// Advance timers. Returns outcomes for scenarios that timed out.
    pub fn tick(&mut self, env: &mut EngineEnv<'_>) -> Vec<MechanicOutcome> {
        let reports = self.realtime.engine_mut().tick(env);
        let mut outcomes = Vec::with_capacity(reports.len());
        for report in &reports {
            let outcome = RealTimeMechanic::outcome_from_report(report);
            self.complete_mechanic(outcome.clone(), env);
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::ContentPack;
    use crate::events::EventBus;
    use crate::story::StoryState;
    use std::rc::Rc;

    fn engine() -> GamingMechanicsEngine {
        engine_on(&ManualClock::new())
    }

    fn engine_on(clock: &ManualClock) -> GamingMechanicsEngine {
        let pack = ContentPack::bundled().unwrap();
        GamingMechanicsEngine::new(
            pack.threats,
            pack.investigations,
            pack.puzzles,
            pack.actions,
            &EngineConfig::default(),
            Rc::new(clock.clone()),
        )
    }

    fn ctx(kind: MechanicKind, character: Character, area: &str, target: &str) -> MechanicContext {
        MechanicContext {
            kind,
            character,
            area: area.into(),
            target: target.into(),
            urgency: Urgency::High,
            trust_score: 50,
            metrics: BTreeMap::new(),
            seed: 7,
        }
    }

    #[test]
    fn activation_keeps_a_single_active_mechanic() {
        let mut mechanics = engine();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(64);
        let mut env = EngineEnv::new(&mut story, &mut bus);

        mechanics
            .activate_mechanic(
                MechanicKind::Realtime,
                &ctx(MechanicKind::Realtime, Character::Eli, "home", "gaming_scam_detection"),
                &mut env,
            )
            .unwrap();
        assert_eq!(mechanics.realtime().engine().active_sessions(), 1);

        mechanics
            .activate_mechanic(
                MechanicKind::Puzzle,
                &ctx(MechanicKind::Puzzle, Character::Eli, "discord", "eli_trade_bait"),
                &mut env,
            )
            .unwrap();
        assert_eq!(mechanics.active_count(), 1);
        assert_eq!(mechanics.active_mechanic(), Some(MechanicKind::Puzzle));
        assert_eq!(mechanics.realtime().engine().active_sessions(), 0);
        assert_eq!(bus.count_named("mechanicDeactivated"), 1);
    }

    #[test]
    fn failed_activation_leaves_nothing_active() {
        let mut mechanics = engine();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(64);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        let err = mechanics
            .activate_mechanic(
                MechanicKind::Puzzle,
                &ctx(MechanicKind::Puzzle, Character::Maya, "app", "no_such_puzzle"),
                &mut env,
            )
            .unwrap_err();
        assert!(matches!(err, MechanicError::UnknownContent { .. }));
        assert_eq!(mechanics.active_count(), 0);
    }

    #[test]
    fn unregistered_mechanic_cannot_activate() {
        let mut mechanics = engine();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(8);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        assert!(mechanics.unregister(MechanicKind::Action, &mut env));
        let err = mechanics
            .activate_mechanic(
                MechanicKind::Action,
                &ctx(MechanicKind::Action, Character::Eli, "stream", "eli_stream_raid"),
                &mut env,
            )
            .unwrap_err();
        assert_eq!(err, MechanicError::NotRegistered(MechanicKind::Action));
        assert!(mechanics.register(MechanicKind::Action));
    }

    #[test]
    fn operations_require_the_mechanic_to_be_active() {
        let mut mechanics = engine();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(8);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        assert_eq!(
            mechanics.answer_puzzle("x", &mut env).unwrap_err(),
            MechanicError::NotActive(MechanicKind::Puzzle)
        );
        assert!(matches!(
            mechanics.submit_realtime_decision("x", &mut env),
            Err(MechanicError::NotActive(MechanicKind::Realtime))
        ));
    }

    #[test]
    fn one_timeout_leaves_other_realtime_sessions_running() {
        let clock = ManualClock::new();
        let mut mechanics = engine_on(&clock);
        let mut story = StoryState::new();
        let mut bus = EventBus::new(64);
        let mut env = EngineEnv::new(&mut story, &mut bus);

        let engine = mechanics.realtime_mut().engine_mut();
        let maya = engine
            .start_real_time_scenario(Character::Maya, "romance_scam_response", Urgency::Low, &mut env)
            .unwrap()
            .session_id;
        let eli = engine
            .start_real_time_scenario(
                Character::Eli,
                "gaming_scam_detection",
                Urgency::Critical,
                &mut env,
            )
            .unwrap()
            .session_id;

        clock.advance(std::time::Duration::from_secs(10));
        let outcomes = mechanics.tick(&mut env);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].character, Character::Eli);

        let engine = mechanics.realtime().engine();
        assert!(engine.session(&eli).is_none());
        assert!(engine.session(&maya).is_some());
        assert_eq!(engine.current_scenario_id(), Some(maya.as_str()));
        assert_eq!(engine.time_remaining(&maya), 20);
        assert!(mechanics.realtime().is_active());

        clock.advance(std::time::Duration::from_secs(20));
        let outcomes = mechanics.tick(&mut env);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].character, Character::Maya);
        assert!(!mechanics.realtime().is_active());
        assert_eq!(bus.count_named("mechanicCompleted"), 2);
    }

    #[test]
    fn mechanic_kind_parses_case_insensitively() {
        assert_eq!("RealTime".parse::<MechanicKind>(), Ok(MechanicKind::Realtime));
        assert!("minigame".parse::<MechanicKind>().is_err());
    }
}
