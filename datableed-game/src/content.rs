//! Bundled game content and the loader seam hosts can replace.

use crate::chat::backend::CharacterConfigs;
use crate::mechanics::action::ActionLibrary;
use crate::mechanics::investigation::InvestigationLibrary;
use crate::mechanics::puzzle::PuzzleLibrary;
use crate::narrative::StoryGraph;
use crate::router::RoutingTable;
use crate::threats::ThreatDatabase;
use thiserror::Error;

/// Errors raised while parsing or validating content.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("malformed content JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scenario '{0}' has no phases")]
    EmptyScenario(String),
    #[error("phase '{phase}' of '{scenario}' offers no choices")]
    EmptyPhase { scenario: String, phase: String },
    #[error("phase '{phase}' of '{scenario}' needs a positive time allowance")]
    InvalidAllowance { scenario: String, phase: String },
    #[error("keyword pattern failed to compile: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("duplicate content id '{0}'")]
    Duplicate(String),
    #[error("{kind} '{id}' references missing {target} '{reference}'")]
    DanglingReference {
        kind: &'static str,
        id: String,
        target: &'static str,
        reference: String,
    },
}

/// Source of every content table the engine needs.
pub trait ContentLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if the threat table cannot be loaded.
    fn load_threats(&self) -> Result<ThreatDatabase, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the puzzle table cannot be loaded.
    fn load_puzzles(&self) -> Result<PuzzleLibrary, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the action sequences cannot be loaded.
    fn load_action_sequences(&self) -> Result<ActionLibrary, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the investigation boards cannot be loaded.
    fn load_investigations(&self) -> Result<InvestigationLibrary, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the story graph cannot be loaded.
    fn load_story(&self) -> Result<StoryGraph, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the routing table cannot be loaded.
    fn load_routing(&self) -> Result<RoutingTable, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the chat character configs cannot be loaded.
    fn load_chat_characters(&self) -> Result<CharacterConfigs, Self::Error>;
}

/// Content compiled into the crate from `assets/data`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledContent;

impl ContentLoader for BundledContent {
    type Error = ContentError;

    fn load_threats(&self) -> Result<ThreatDatabase, Self::Error> {
        ThreatDatabase::bundled()
    }

    fn load_puzzles(&self) -> Result<PuzzleLibrary, Self::Error> {
        PuzzleLibrary::bundled()
    }

    fn load_action_sequences(&self) -> Result<ActionLibrary, Self::Error> {
        ActionLibrary::bundled()
    }

    fn load_investigations(&self) -> Result<InvestigationLibrary, Self::Error> {
        InvestigationLibrary::bundled()
    }

    fn load_story(&self) -> Result<StoryGraph, Self::Error> {
        StoryGraph::bundled()
    }

    fn load_routing(&self) -> Result<RoutingTable, Self::Error> {
        RoutingTable::bundled()
    }

    fn load_chat_characters(&self) -> Result<CharacterConfigs, Self::Error> {
        CharacterConfigs::bundled()
    }
}

/// Every content table for one play session.
#[derive(Debug, Clone)]
pub struct ContentPack {
    pub threats: ThreatDatabase,
    pub puzzles: PuzzleLibrary,
    pub actions: ActionLibrary,
    pub investigations: InvestigationLibrary,
    pub story: StoryGraph,
    pub routing: RoutingTable,
}

impl ContentPack {
    /// # Errors
    ///
    /// Propagates the first loader failure.
    pub fn load<L: ContentLoader>(loader: &L) -> Result<Self, L::Error> {
        Ok(Self {
            threats: loader.load_threats()?,
            puzzles: loader.load_puzzles()?,
            actions: loader.load_action_sequences()?,
            investigations: loader.load_investigations()?,
            story: loader.load_story()?,
            routing: loader.load_routing()?,
        })
    }

    /// # Errors
    ///
    /// Returns an error if any bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::load(&BundledContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_pack_loads() {
        let pack = ContentPack::bundled().unwrap();
        assert!(!pack.threats.is_empty());
        assert!(!pack.puzzles.is_empty());
        assert!(!pack.actions.is_empty());
        assert!(!pack.investigations.is_empty());
        assert!(BundledContent.load_chat_characters().is_ok());
    }
}
