//! Social-engineering puzzles: read a suspicious message, then name the
//! manipulation tactic or the safe response for each challenge.

use super::{
    GradeFeedback, Mechanic, MechanicContext, MechanicError, MechanicKind, MechanicOutcome, grade,
};
use crate::character::Character;
use crate::config::TierThresholds;
use crate::content::ContentError;
use crate::events::EngineEnv;
use crate::realtime::OptionView;
use crate::seed::derive_stream_seed;
use crate::threats::Consequences;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_PUZZLE_DATA: &str = include_str!("../../assets/data/puzzles.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousMessage {
    pub sender: String,
    pub channel: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub consequences: Consequences,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub prompt: String,
    pub options: Vec<PuzzleOption>,
    pub points: u32,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleTemplate {
    pub id: String,
    pub character: Character,
    pub title: String,
    pub message: SuspiciousMessage,
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub feedback: GradeFeedback,
}

impl PuzzleTemplate {
    fn max_score(&self) -> u32 {
        self.challenges.iter().map(|c| c.points).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PuzzleFile {
    #[serde(default)]
    puzzles: Vec<PuzzleTemplate>,
}

#[derive(Debug, Clone, Default)]
pub struct PuzzleLibrary {
    puzzles: BTreeMap<String, PuzzleTemplate>,
}

impl PuzzleLibrary {
    /// # Errors
    ///
    /// Returns an error for malformed JSON, duplicate ids, empty puzzles or
    /// challenges without a correct option.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: PuzzleFile = serde_json::from_str(json)?;
        let mut puzzles = BTreeMap::new();
        for puzzle in file.puzzles {
            if puzzle.challenges.is_empty() {
                return Err(ContentError::EmptyScenario(puzzle.id));
            }
            for challenge in &puzzle.challenges {
                if challenge.options.len() < 2 || !challenge.options.iter().any(|o| o.correct) {
                    return Err(ContentError::EmptyPhase {
                        scenario: puzzle.id.clone(),
                        phase: challenge.id.clone(),
                    });
                }
            }
            if puzzles.contains_key(&puzzle.id) {
                return Err(ContentError::Duplicate(puzzle.id));
            }
            puzzles.insert(puzzle.id.clone(), puzzle);
        }
        Ok(Self { puzzles })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_PUZZLE_DATA)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PuzzleTemplate> {
        self.puzzles.get(id)
    }

    pub fn for_character(&self, character: Character) -> impl Iterator<Item = &PuzzleTemplate> {
        self.puzzles
            .values()
            .filter(move |p| p.character == character)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeView {
    pub puzzle_id: String,
    pub message: SuspiciousMessage,
    pub index: usize,
    pub count: usize,
    pub prompt: String,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerReport {
    pub challenge_id: String,
    pub correct: bool,
    pub points_awarded: u32,
    pub explanation: String,
    pub outcome: Option<MechanicOutcome>,
}

#[derive(Debug, Clone)]
struct PuzzleRun {
    template: PuzzleTemplate,
    character: Character,
    index: usize,
    orders: Vec<Vec<usize>>,
    score: u32,
}

#[derive(Debug)]
pub struct PuzzleMechanic {
    library: PuzzleLibrary,
    tiers: TierThresholds,
    run: Option<PuzzleRun>,
}

impl PuzzleMechanic {
    #[must_use]
    pub const fn new(library: PuzzleLibrary, tiers: TierThresholds) -> Self {
        Self {
            library,
            tiers,
            run: None,
        }
    }

    #[must_use]
    pub const fn library(&self) -> &PuzzleLibrary {
        &self.library
    }

    #[must_use]
    pub fn current_challenge(&self) -> Option<ChallengeView> {
        let run = self.run.as_ref()?;
        let challenge = run.template.challenges.get(run.index)?;
        let order = run.orders.get(run.index)?;
        Some(ChallengeView {
            puzzle_id: run.template.id.clone(),
            message: run.template.message.clone(),
            index: run.index,
            count: run.template.challenges.len(),
            prompt: challenge.prompt.clone(),
            options: order
                .iter()
                .filter_map(|&i| challenge.options.get(i))
                .map(|o| OptionView {
                    id: o.id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
        })
    }

    /// Answer the current challenge.
    ///
    /// # Errors
    ///
    /// Fails when no puzzle is running or `option_id` is not offered.
    pub fn answer(
        &mut self,
        option_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<AnswerReport, MechanicError> {
        let run = self
            .run
            .as_mut()
            .ok_or(MechanicError::NotActive(MechanicKind::Puzzle))?;
        let challenge = run
            .template
            .challenges
            .get(run.index)
            .ok_or(MechanicError::NotActive(MechanicKind::Puzzle))?;
        let option = challenge
            .options
            .iter()
            .find(|o| o.id == option_id)
            .ok_or_else(|| MechanicError::UnknownOption {
                step: challenge.id.clone(),
                option: option_id.to_string(),
            })?;

        let points_awarded = if option.correct { challenge.points } else { 0 };
        let challenge_id = challenge.id.clone();
        let explanation = challenge.explanation.clone();
        let correct = option.correct;
        let consequences = option.consequences.clone();

        run.score += points_awarded;
        run.index += 1;
        env.story
            .record_decision(run.character, format!("puzzle:{challenge_id}:{option_id}"));
        env.apply_consequences(run.character, &consequences);

        let outcome = (run.index >= run.template.challenges.len()).then(|| {
            grade(
                MechanicKind::Puzzle,
                run.character,
                &run.template.id,
                run.score,
                run.template.max_score(),
                &self.tiers,
                &run.template.feedback,
            )
        });
        Ok(AnswerReport {
            challenge_id,
            correct,
            points_awarded,
            explanation,
            outcome,
        })
    }
}

impl Mechanic for PuzzleMechanic {
    fn kind(&self) -> MechanicKind {
        MechanicKind::Puzzle
    }

    fn activate(
        &mut self,
        ctx: &MechanicContext,
        _env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError> {
        let template =
            self.library
                .get(&ctx.target)
                .cloned()
                .ok_or_else(|| MechanicError::UnknownContent {
                    kind: MechanicKind::Puzzle,
                    id: ctx.target.clone(),
                })?;
        if template.character != ctx.character {
            return Err(MechanicError::WrongCharacter {
                kind: MechanicKind::Puzzle,
                id: template.id,
                character: ctx.character,
            });
        }
        let mut rng = ChaCha20Rng::seed_from_u64(derive_stream_seed(ctx.seed, b"puzzle"));
        let orders = template
            .challenges
            .iter()
            .map(|challenge| {
                let mut order: Vec<usize> = (0..challenge.options.len()).collect();
                order.shuffle(&mut rng);
                order
            })
            .collect();
        self.run = Some(PuzzleRun {
            template,
            character: ctx.character,
            index: 0,
            orders,
            score: 0,
        });
        Ok(())
    }

    fn deactivate(&mut self, _env: &mut EngineEnv<'_>) {
        self.run = None;
    }

    fn is_active(&self) -> bool {
        self.run.is_some()
    }
}
