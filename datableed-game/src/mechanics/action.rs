//! Timed action sequences. Each phase has its own time limit; an action
//! performed after the limit still advances the sequence but scores nothing.

use super::{
    GradeFeedback, Mechanic, MechanicContext, MechanicError, MechanicKind, MechanicOutcome, grade,
};
use crate::character::Character;
use crate::clock::SharedClock;
use crate::config::TierThresholds;
use crate::content::ContentError;
use crate::events::EngineEnv;
use crate::realtime::OptionView;
use crate::threats::Consequences;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_ACTION_DATA: &str = include_str!("../../assets/data/action_sequences.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub points: u32,
    /// Applied whether or not the action was on time.
    #[serde(default)]
    pub consequences: Consequences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPhase {
    pub id: String,
    pub prompt: String,
    /// Seconds before actions in this phase stop scoring.
    pub time_limit: f64,
    pub actions: Vec<ActionOption>,
}

impl ActionPhase {
    fn best_points(&self) -> u32 {
        self.actions.iter().map(|a| a.points).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSequence {
    pub id: String,
    pub character: Character,
    pub title: String,
    pub phases: Vec<ActionPhase>,
    #[serde(default)]
    pub feedback: GradeFeedback,
}

impl ActionSequence {
    fn max_score(&self) -> u32 {
        self.phases.iter().map(ActionPhase::best_points).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActionFile {
    #[serde(default)]
    sequences: Vec<ActionSequence>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionLibrary {
    sequences: BTreeMap<String, ActionSequence>,
}

impl ActionLibrary {
    /// # Errors
    ///
    /// Returns an error for malformed JSON, duplicate ids, empty sequences or
    /// phases, or non-positive time limits.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: ActionFile = serde_json::from_str(json)?;
        let mut sequences = BTreeMap::new();
        for sequence in file.sequences {
            if sequence.phases.is_empty() {
                return Err(ContentError::EmptyScenario(sequence.id));
            }
            for phase in &sequence.phases {
                if phase.actions.is_empty() {
                    return Err(ContentError::EmptyPhase {
                        scenario: sequence.id.clone(),
                        phase: phase.id.clone(),
                    });
                }
                if !(phase.time_limit.is_finite() && phase.time_limit > 0.0) {
                    return Err(ContentError::InvalidAllowance {
                        scenario: sequence.id.clone(),
                        phase: phase.id.clone(),
                    });
                }
            }
            if sequences.contains_key(&sequence.id) {
                return Err(ContentError::Duplicate(sequence.id));
            }
            sequences.insert(sequence.id.clone(), sequence);
        }
        Ok(Self { sequences })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_ACTION_DATA)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ActionSequence> {
        self.sequences.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPhaseView {
    pub sequence_id: String,
    pub index: usize,
    pub count: usize,
    pub prompt: String,
    pub time_limit: f64,
    pub time_remaining: f64,
    pub actions: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub phase_id: String,
    pub action_id: String,
    pub elapsed: f64,
    pub on_time: bool,
    pub points_awarded: u32,
    pub outcome: Option<MechanicOutcome>,
}

#[derive(Debug, Clone)]
struct ActionRun {
    sequence: ActionSequence,
    character: Character,
    index: usize,
    phase_started: Duration,
    score: u32,
}

#[derive(Debug)]
pub struct ActionMechanic {
    library: ActionLibrary,
    tiers: TierThresholds,
    clock: SharedClock,
    run: Option<ActionRun>,
}

impl ActionMechanic {
    #[must_use]
    pub const fn new(library: ActionLibrary, tiers: TierThresholds, clock: SharedClock) -> Self {
        Self {
            library,
            tiers,
            clock,
            run: None,
        }
    }

    #[must_use]
    pub const fn library(&self) -> &ActionLibrary {
        &self.library
    }

    #[must_use]
    pub fn current_phase(&self) -> Option<ActionPhaseView> {
        let run = self.run.as_ref()?;
        let phase = run.sequence.phases.get(run.index)?;
        let elapsed = self.clock.now().saturating_sub(run.phase_started);
        Some(ActionPhaseView {
            sequence_id: run.sequence.id.clone(),
            index: run.index,
            count: run.sequence.phases.len(),
            prompt: phase.prompt.clone(),
            time_limit: phase.time_limit,
            time_remaining: (phase.time_limit - elapsed.as_secs_f64()).max(0.0),
            actions: phase
                .actions
                .iter()
                .map(|a| OptionView {
                    id: a.id.clone(),
                    text: a.label.clone(),
                })
                .collect(),
        })
    }

    /// Perform an action in the current phase and advance.
    ///
    /// # Errors
    ///
    /// Fails when no sequence is running or the action is not offered.
    pub fn perform(
        &mut self,
        action_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ActionReport, MechanicError> {
        let now = self.clock.now();
        let run = self
            .run
            .as_mut()
            .ok_or(MechanicError::NotActive(MechanicKind::Action))?;
        let phase = run
            .sequence
            .phases
            .get(run.index)
            .ok_or(MechanicError::NotActive(MechanicKind::Action))?;
        let action = phase
            .actions
            .iter()
            .find(|a| a.id == action_id)
            .ok_or_else(|| MechanicError::UnknownOption {
                step: phase.id.clone(),
                option: action_id.to_string(),
            })?;

        let elapsed = now.saturating_sub(run.phase_started).as_secs_f64();
        let on_time = elapsed <= phase.time_limit;
        let points_awarded = if on_time { action.points } else { 0 };
        let phase_id = phase.id.clone();
        let consequences = action.consequences.clone();
        if !on_time {
            log::debug!(
                "action {action_id} in {phase_id} was {:.1}s late",
                elapsed - phase.time_limit
            );
        }

        run.score += points_awarded;
        run.index += 1;
        run.phase_started = now;
        env.story
            .record_decision(run.character, format!("action:{phase_id}:{action_id}"));
        env.apply_consequences(run.character, &consequences);

        let outcome = (run.index >= run.sequence.phases.len()).then(|| {
            grade(
                MechanicKind::Action,
                run.character,
                &run.sequence.id,
                run.score,
                run.sequence.max_score(),
                &self.tiers,
                &run.sequence.feedback,
            )
        });
        Ok(ActionReport {
            phase_id,
            action_id: action_id.to_string(),
            elapsed,
            on_time,
            points_awarded,
            outcome,
        })
    }
}

impl Mechanic for ActionMechanic {
    fn kind(&self) -> MechanicKind {
        MechanicKind::Action
    }

    fn activate(
        &mut self,
        ctx: &MechanicContext,
        _env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError> {
        let sequence =
            self.library
                .get(&ctx.target)
                .cloned()
                .ok_or_else(|| MechanicError::UnknownContent {
                    kind: MechanicKind::Action,
                    id: ctx.target.clone(),
                })?;
        if sequence.character != ctx.character {
            return Err(MechanicError::WrongCharacter {
                kind: MechanicKind::Action,
                id: sequence.id,
                character: ctx.character,
            });
        }
        self.run = Some(ActionRun {
            sequence,
            character: ctx.character,
            index: 0,
            phase_started: self.clock.now(),
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
