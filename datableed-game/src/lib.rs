//! Data_Bleed Game Engine
//!
//! Platform-agnostic core for the Data_Bleed cybersecurity-awareness game:
//! three storylines (Maya, Eli, Stanley), timed real-time decisions, routed
//! mini-games and the character chat. No UI or platform dependencies.

pub mod character;
pub mod chat;
pub mod clock;
pub mod config;
pub mod constants;
pub mod content;
pub mod events;
pub mod mechanics;
pub mod narrative;
pub mod numbers;
pub mod realtime;
pub mod router;
pub mod seed;
pub mod session;
pub mod storage;
pub mod story;
pub mod threats;
pub mod timer;

pub use character::{Character, Storyline};
pub use chat::{
    ChatBackend, ChatClient, ChatConfig, ChatError, ChatReply, ChatRequest, ChatResponse,
    ChatTransport, InProcessTransport, Persona, ReplyGenerator, TransportError,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
#[cfg(feature = "async")]
pub use clock::TokioClock;
pub use config::{ConfigError, EngineConfig, TierThresholds, UrgencyLimits};
pub use content::{BundledContent, ContentError, ContentLoader, ContentPack};
pub use events::{EngineEnv, EventBus, EventEnvelope, GameEvent};
pub use mechanics::{
    GamingMechanicsEngine, MechanicContext, MechanicError, MechanicKind, MechanicOutcome,
};
pub use narrative::{NarrativeEngine, NarrativeError, NodeView, StoryGraph};
pub use realtime::{
    DecisionOutcome, PerformanceTier, PhaseView, RealTimeDecisionEngine, RealTimeError,
    ScenarioReport, SessionStatus, timing_score,
};
pub use router::{DecisionEvent, MechanicRouter, RouteError, RouterStats, RoutingTable};
pub use seed::derive_stream_seed;
pub use session::{ChoiceResult, PlaySession, RouteStatus, SessionError};
pub use storage::{
    GameMode, MemorySessionStore, ProgressSnapshot, SessionPrefs, SessionStore, StorageError,
};
pub use story::{CharacterProgress, ConsequenceReceipt, StoryState};
pub use threats::{Consequences, Correctness, Decision, Scenario, ThreatDatabase, Urgency};
pub use timer::TimerManager;

use std::rc::Rc;

/// Main engine: builds play sessions from content and persists progress.
pub struct GameEngine<L, S>
where
    L: ContentLoader,
    S: SessionStore + Clone,
{
    loader: L,
    store: S,
    config: EngineConfig,
}

impl<L, S> GameEngine<L, S>
where
    L: ContentLoader,
    S: SessionStore + Clone,
{
    /// Create an engine with the default configuration.
    pub fn new(loader: L, store: S) -> Self {
        Self {
            loader,
            store,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invariant `config` violates.
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if any content table cannot be loaded.
    pub fn create_session(&self, seed: u64, clock: SharedClock) -> Result<PlaySession<S>, L::Error> {
        let pack = ContentPack::load(&self.loader)?;
        log::info!("new play session (seed {seed:#x})");
        Ok(PlaySession::new(
            pack,
            &self.config,
            seed,
            clock,
            self.store.clone(),
        ))
    }

    /// Chat backend over the loader's character configs.
    ///
    /// # Errors
    ///
    /// Returns an error if the character configs cannot be loaded.
    pub fn chat_backend(&self) -> Result<Rc<ChatBackend>, L::Error> {
        Ok(Rc::new(ChatBackend::new(self.loader.load_chat_characters()?)))
    }

    /// Save a session's story progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or stored.
    pub fn save_progress(&self, session: &PlaySession<S>) -> Result<(), StorageError> {
        storage::save_progress(&self.store, &session.snapshot())
    }

    /// Rebuild a session from saved progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or content cannot be
    /// loaded.
    pub fn load_progress(
        &self,
        seed: u64,
        clock: SharedClock,
    ) -> Result<Option<PlaySession<S>>, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let Some(snapshot) = storage::load_progress(&self.store)? else {
            return Ok(None);
        };
        let mut session = self.create_session(seed, clock).map_err(Into::into)?;
        log::info!("restoring progress saved at {}", snapshot.saved_at);
        session.restore(snapshot);
        Ok(Some(session))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear_progress(&self) -> Result<(), StorageError> {
        storage::clear_progress(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::CharacterConfigs;
    use crate::mechanics::action::ActionLibrary;
    use crate::mechanics::investigation::InvestigationLibrary;
    use crate::mechanics::puzzle::PuzzleLibrary;
    use std::convert::Infallible;

    #[derive(Clone, Copy, Default)]
    struct FixtureLoader;

    impl ContentLoader for FixtureLoader {
        type Error = Infallible;

        fn load_threats(&self) -> Result<ThreatDatabase, Self::Error> {
            Ok(ThreatDatabase::empty())
        }

        fn load_puzzles(&self) -> Result<PuzzleLibrary, Self::Error> {
            Ok(PuzzleLibrary::default())
        }

        fn load_action_sequences(&self) -> Result<ActionLibrary, Self::Error> {
            Ok(ActionLibrary::default())
        }

        fn load_investigations(&self) -> Result<InvestigationLibrary, Self::Error> {
            Ok(InvestigationLibrary::default())
        }

        fn load_story(&self) -> Result<StoryGraph, Self::Error> {
            Ok(StoryGraph::from_json(
                r#"{ "triggers": { "go": "n" }, "nodes": [
                    { "id": "n", "character": "maya", "text": "N", "choices": [
                        { "id": "safe", "text": "Safe", "consequences": { "trust_score": 10 } }
                    ] }
                ] }"#,
            )
            .unwrap_or_default())
        }

        fn load_routing(&self) -> Result<RoutingTable, Self::Error> {
            Ok(RoutingTable::default())
        }

        fn load_chat_characters(&self) -> Result<CharacterConfigs, Self::Error> {
            Ok(CharacterConfigs::default())
        }
    }

    #[test]
    fn engine_saves_and_restores_progress() {
        let engine = GameEngine::new(FixtureLoader, MemorySessionStore::new());
        let mut session = engine
            .create_session(0xABCD, Rc::new(ManualClock::new()))
            .unwrap();
        session.fire_trigger("go").unwrap();
        session.make_choice(Character::Maya, "safe").unwrap();
        engine.save_progress(&session).unwrap();

        let loaded = engine
            .load_progress(0xABCD, Rc::new(ManualClock::new()))
            .unwrap()
            .expect("progress saved");
        assert_eq!(loaded.story().trust_score(Character::Maya), 60);

        engine.clear_progress().unwrap();
        assert!(
            engine
                .load_progress(1, Rc::new(ManualClock::new()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            timeout_penalty: 3,
            ..EngineConfig::default()
        };
        assert!(
            GameEngine::new(FixtureLoader, MemorySessionStore::new())
                .with_config(config)
                .is_err()
        );
    }

    #[test]
    fn chat_backend_starts_in_demo_mode() {
        let engine = GameEngine::new(BundledContent, MemorySessionStore::new());
        let backend = engine.chat_backend().unwrap();
        assert!(backend.is_demo_mode());
        assert_eq!(backend.configs().len(), 3);
    }
}
