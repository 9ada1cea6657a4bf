//! One player's run through the game.
//!
//! [`PlaySession`] owns every piece of mutable game state and threads it
//! through the subsystems as an [`EngineEnv`]. The session store mirrors the
//! selected character and current mode after every change.

use crate::character::Character;
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::content::ContentPack;
use crate::events::{EngineEnv, EventBus};
use crate::mechanics::investigation::{InvestigationTool, ToolReport};
use crate::mechanics::{
    GamingMechanicsEngine, MechanicError, MechanicKind, MechanicOutcome,
};
use crate::mechanics::action::ActionReport;
use crate::mechanics::puzzle::AnswerReport;
use crate::narrative::{ChoiceOutcome, NarrativeEngine, NarrativeError, NodeView};
use crate::realtime::DecisionOutcome;
use crate::router::MechanicRouter;
use crate::storage::{GameMode, ProgressSnapshot, SessionPrefs, SessionStore, StorageError};
use crate::story::StoryState;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Narrative(#[from] NarrativeError),
    #[error(transparent)]
    Mechanic(#[from] MechanicError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What happened to a choice's mechanic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    NotRequested,
    Routed(MechanicKind),
    Failed(MechanicKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceResult {
    pub outcome: ChoiceOutcome,
    pub route: RouteStatus,
}

#[derive(Debug)]
pub struct PlaySession<S: SessionStore> {
    seed: u64,
    clock: SharedClock,
    story: StoryState,
    bus: EventBus,
    mechanics: GamingMechanicsEngine,
    router: MechanicRouter,
    narrative: NarrativeEngine,
    store: S,
    prefs: SessionPrefs,
    tick_interval: Duration,
}

impl<S: SessionStore> PlaySession<S> {
    /// Build a session from loaded content. Existing prefs in `store` are
    /// kept when they parse.
    #[must_use]
    pub fn new(
        pack: ContentPack,
        config: &EngineConfig,
        seed: u64,
        clock: SharedClock,
        store: S,
    ) -> Self {
        let prefs = SessionPrefs::load(&store).unwrap_or_else(|err| {
            log::warn!("ignoring stored session prefs: {err}");
            SessionPrefs::default()
        });
        let mechanics = GamingMechanicsEngine::new(
            pack.threats,
            pack.investigations,
            pack.puzzles,
            pack.actions,
            config,
            clock.clone(),
        );
        Self {
            seed,
            clock,
            story: StoryState::new(),
            bus: EventBus::new(config.event_history),
            mechanics,
            router: MechanicRouter::new(pack.routing, seed),
            narrative: NarrativeEngine::new(pack.story),
            store,
            prefs,
            tick_interval: config.tick_interval(),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Cadence at which hosts should call [`PlaySession::tick`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    #[must_use]
    pub const fn story(&self) -> &StoryState {
        &self.story
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    #[must_use]
    pub const fn mechanics(&self) -> &GamingMechanicsEngine {
        &self.mechanics
    }

    #[must_use]
    pub const fn router(&self) -> &MechanicRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut MechanicRouter {
        &mut self.router
    }

    #[must_use]
    pub const fn narrative(&self) -> &NarrativeEngine {
        &self.narrative
    }

    #[must_use]
    pub const fn prefs(&self) -> SessionPrefs {
        self.prefs
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn current_node(&self, character: Character) -> Option<NodeView> {
        self.narrative.current_node(character).map(NodeView::from)
    }

    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn select_character(&mut self, character: Character) -> Result<(), StorageError> {
        self.prefs.character = Some(character);
        self.prefs.current_mode = Some(GameMode::Story);
        self.prefs.save(&self.store)
    }

    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn set_3d_mode(&mut self, active: bool) -> Result<(), StorageError> {
        self.prefs.three_d_mode = active;
        self.prefs.save(&self.store)
    }

    /// # Errors
    ///
    /// Fails for unknown triggers or when the store cannot be written.
    pub fn fire_trigger(&mut self, trigger: &str) -> Result<NodeView, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let view = self.narrative.fire_trigger(trigger, &mut env)?;
        self.select_character(view.character)?;
        Ok(view)
    }

    /// Take a story choice. Mechanic choices get one routing attempt; a
    /// failed route leaves the player in story mode.
    ///
    /// # Errors
    ///
    /// Fails when the choice is not available or the store cannot be written.
    pub fn make_choice(
        &mut self,
        character: Character,
        choice_id: &str,
    ) -> Result<ChoiceResult, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let outcome = self.narrative.choose(character, choice_id, &mut env)?;
        let route = match &outcome.route {
            None => RouteStatus::NotRequested,
            Some(event) => {
                if self
                    .router
                    .route_decision(event, &mut self.mechanics, &mut env)
                {
                    RouteStatus::Routed(event.mechanic)
                } else {
                    RouteStatus::Failed(event.mechanic)
                }
            }
        };
        self.sync_mode()?;
        Ok(ChoiceResult { outcome, route })
    }

    /// # Errors
    ///
    /// See [`GamingMechanicsEngine::use_tool`].
    pub fn use_tool(
        &mut self,
        tool: InvestigationTool,
        target: &str,
    ) -> Result<ToolReport, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let report = self.mechanics.use_tool(tool, target, &mut env)?;
        self.sync_mode()?;
        Ok(report)
    }

    /// # Errors
    ///
    /// See [`GamingMechanicsEngine::answer_puzzle`].
    pub fn answer_puzzle(&mut self, option_id: &str) -> Result<AnswerReport, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let report = self.mechanics.answer_puzzle(option_id, &mut env)?;
        self.sync_mode()?;
        Ok(report)
    }

    /// # Errors
    ///
    /// See [`GamingMechanicsEngine::perform_action`].
    pub fn perform_action(&mut self, action_id: &str) -> Result<ActionReport, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let report = self.mechanics.perform_action(action_id, &mut env)?;
        self.sync_mode()?;
        Ok(report)
    }

    /// # Errors
    ///
    /// See [`GamingMechanicsEngine::submit_realtime_decision`].
    pub fn submit_decision(&mut self, decision_id: &str) -> Result<DecisionOutcome, SessionError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let outcome = self
            .mechanics
            .submit_realtime_decision(decision_id, &mut env)?;
        self.sync_mode()?;
        Ok(outcome)
    }

    /// Leave whatever mechanic is running and return to the story.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn abandon_mechanic(&mut self) -> Result<(), StorageError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        self.mechanics.deactivate_all(&mut env);
        self.sync_mode()
    }

    /// Poll timers. Returns outcomes of scenarios that ran out of time.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn tick(&mut self) -> Result<Vec<MechanicOutcome>, StorageError> {
        let mut env = EngineEnv::new(&mut self.story, &mut self.bus);
        let outcomes = self.mechanics.tick(&mut env);
        if !outcomes.is_empty() {
            self.sync_mode()?;
        }
        Ok(outcomes)
    }

    /// Tick on a tokio interval at [`PlaySession::tick_interval`] until no
    /// real-time scenario is left. Timed-out outcomes go to `on_timeout`;
    /// returns how many there were.
    ///
    /// # Errors
    ///
    /// Stops at the first store write failure.
    #[cfg(feature = "async")]
    pub async fn run_timers(
        &mut self,
        mut on_timeout: impl FnMut(&MechanicOutcome),
    ) -> Result<usize, StorageError> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut timed_out = 0;
        while self.mechanics.realtime().engine().active_sessions() > 0 {
            interval.tick().await;
            for outcome in self.tick()? {
                on_timeout(&outcome);
                timed_out += 1;
            }
        }
        Ok(timed_out)
    }

    fn sync_mode(&mut self) -> Result<(), StorageError> {
        let mode = self
            .mechanics
            .active_mechanic()
            .map_or(GameMode::Story, GameMode::from);
        if self.prefs.current_mode == Some(mode) {
            return Ok(());
        }
        log::debug!("mode -> {mode}");
        self.prefs.current_mode = Some(mode);
        self.prefs.save(&self.store)
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            saved_at: Utc::now(),
            story: self.story.clone(),
            positions: self.narrative.positions().clone(),
        }
    }

    /// Replace story state and node positions with a saved snapshot.
    pub fn restore(&mut self, snapshot: ProgressSnapshot) {
        self.story = snapshot.story;
        self.narrative.restore_positions(snapshot.positions);
    }
}
