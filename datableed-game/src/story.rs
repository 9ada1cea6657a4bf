//! Per-character story state shared by every subsystem.
//!
//! Writers are independent and there is no transaction boundary: the last
//! write wins and nothing is rolled back when a mechanic is cancelled.

use crate::character::Character;
use crate::constants::{
    KEY_TRUST_SCORE, MAX_DECISION_LOG, TRUST_SCORE_MAX, TRUST_SCORE_MIN, TRUST_SCORE_START,
};
use crate::mechanics::MechanicKind;
use crate::threats::Consequences;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProgress {
    pub trust_score: i32,
    #[serde(default)]
    pub metrics: BTreeMap<String, i32>,
    #[serde(default)]
    pub decisions: VecDeque<String>,
    #[serde(default)]
    pub completed_mechanics: Vec<MechanicKind>,
}

impl Default for CharacterProgress {
    fn default() -> Self {
        Self {
            trust_score: TRUST_SCORE_START,
            metrics: BTreeMap::new(),
            decisions: VecDeque::new(),
            completed_mechanics: Vec::new(),
        }
    }
}

impl CharacterProgress {
    #[must_use]
    pub fn metric(&self, key: &str) -> i32 {
        self.metrics.get(key).copied().unwrap_or(0)
    }
}

/// What a consequence application changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsequenceReceipt {
    pub character: Character,
    pub trust_before: i32,
    pub trust_after: i32,
    pub applied: Consequences,
}

impl ConsequenceReceipt {
    #[must_use]
    pub const fn trust_delta(&self) -> i32 {
        self.trust_after - self.trust_before
    }

    #[must_use]
    pub const fn trust_changed(&self) -> bool {
        self.trust_after != self.trust_before
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoryState {
    #[serde(default)]
    characters: BTreeMap<Character, CharacterProgress>,
}

impl StoryState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn progress(&self, character: Character) -> CharacterProgress {
        self.characters.get(&character).cloned().unwrap_or_default()
    }

    pub fn progress_mut(&mut self, character: Character) -> &mut CharacterProgress {
        self.characters.entry(character).or_default()
    }

    #[must_use]
    pub fn trust_score(&self, character: Character) -> i32 {
        self.characters
            .get(&character)
            .map_or(TRUST_SCORE_START, |p| p.trust_score)
    }

    /// Apply every delta in `consequences`.
    ///
    /// `trust_score` adjusts the clamped trust score; any other key accumulates
    /// into the character's metrics.
    pub fn apply_consequences(
        &mut self,
        character: Character,
        consequences: &Consequences,
    ) -> ConsequenceReceipt {
        let progress = self.progress_mut(character);
        let trust_before = progress.trust_score;
        for (key, delta) in consequences {
            if key == KEY_TRUST_SCORE {
                progress.trust_score = progress
                    .trust_score
                    .saturating_add(*delta)
                    .clamp(TRUST_SCORE_MIN, TRUST_SCORE_MAX);
            } else {
                let slot = progress.metrics.entry(key.clone()).or_insert(0);
                *slot = slot.saturating_add(*delta);
            }
        }
        ConsequenceReceipt {
            character,
            trust_before,
            trust_after: progress.trust_score,
            applied: consequences.clone(),
        }
    }

    /// Append to the bounded decision log.
    pub fn record_decision(&mut self, character: Character, label: impl Into<String>) {
        let progress = self.progress_mut(character);
        if progress.decisions.len() == MAX_DECISION_LOG {
            progress.decisions.pop_front();
        }
        progress.decisions.push_back(label.into());
    }

    pub fn mark_completed(&mut self, character: Character, kind: MechanicKind) {
        let progress = self.progress_mut(character);
        if !progress.completed_mechanics.contains(&kind) {
            progress.completed_mechanics.push(kind);
        }
    }

    pub fn characters(&self) -> impl Iterator<Item = (&Character, &CharacterProgress)> {
        self.characters.iter()
    }

    pub fn reset(&mut self, character: Character) {
        self.characters.remove(&character);
    }
}
