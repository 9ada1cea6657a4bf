use super::feedback::PerformanceTier;
use crate::character::Character;
use crate::threats::{Consequences, Correctness, Phase, Scenario, Urgency};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Timeout,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scored answer within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub phase_id: String,
    pub decision_id: String,
    pub correctness: Correctness,
    pub time_remaining: f64,
    pub timing_score: f64,
    pub consequences: Consequences,
}

/// Mutable state of one playthrough of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSession {
    pub id: String,
    pub character: Character,
    pub scenario: Scenario,
    pub current_phase: usize,
    pub decisions: Vec<DecisionResult>,
    pub status: SessionStatus,
    pub started_at: Duration,
}

impl ScenarioSession {
    #[must_use]
    pub fn phase(&self) -> Option<&Phase> {
        self.scenario.phase(self.current_phase)
    }

    #[must_use]
    pub fn is_last_phase(&self) -> bool {
        self.current_phase + 1 >= self.scenario.phases.len()
    }

    #[must_use]
    pub fn optimal_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.correctness.is_optimal())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: String,
    pub text: String,
}

/// What a host renders for the current phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseView {
    pub session_id: String,
    pub scenario_title: String,
    pub urgency: Urgency,
    pub phase_index: usize,
    pub phase_count: usize,
    pub phase_id: String,
    pub title: String,
    pub description: String,
    pub time_allowed: f64,
    pub time_remaining: u32,
    pub options: Vec<OptionView>,
}

impl PhaseView {
    pub(crate) fn build(session: &ScenarioSession, phase: &Phase, time_remaining: u32) -> Self {
        Self {
            session_id: session.id.clone(),
            scenario_title: session.scenario.title.clone(),
            urgency: session.scenario.urgency_level,
            phase_index: session.current_phase,
            phase_count: session.scenario.phases.len(),
            phase_id: phase.id.clone(),
            title: phase.title.clone(),
            description: phase.description.clone(),
            time_allowed: phase.time_allowed,
            time_remaining,
            options: phase
                .decisions
                .iter()
                .map(|d| OptionView {
                    id: d.id.clone(),
                    text: d.text.clone(),
                })
                .collect(),
        }
    }
}

/// Summary produced when a session reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub session_id: String,
    pub character: Character,
    pub scenario_id: String,
    pub status: SessionStatus,
    pub decisions: Vec<DecisionResult>,
    pub optimal_count: usize,
    pub optimal_ratio: f64,
    pub average_timing: f64,
    pub tier: PerformanceTier,
    pub feedback: String,
}

/// Result of a processed decision.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Advanced {
        result: DecisionResult,
        next: PhaseView,
    },
    Completed {
        result: DecisionResult,
        report: ScenarioReport,
    },
}

impl DecisionOutcome {
    #[must_use]
    pub const fn result(&self) -> &DecisionResult {
        match self {
            Self::Advanced { result, .. } | Self::Completed { result, .. } => result,
        }
    }

    #[must_use]
    pub const fn report(&self) -> Option<&ScenarioReport> {
        match self {
            Self::Advanced { .. } => None,
            Self::Completed { report, .. } => Some(report),
        }
    }
}
