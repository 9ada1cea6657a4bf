//! Threat database: real-time scenario definitions per character.
//!
//! Scenario templates are authored in `assets/data/threats.json`. A concrete
//! [`Scenario`] is built from a template plus an [`Urgency`], which fixes the
//! overall time limit.

use crate::character::Character;
use crate::config::UrgencyLimits;
use crate::content::ContentError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_THREAT_DATA: &str = include_str!("../assets/data/threats.json");

/// Named numeric deltas applied to story state when a decision is made.
pub type Consequences = BTreeMap<String, i32>;

/// Decisions offered in a single phase; phases rarely carry more than four.
pub type DecisionSet = SmallVec<[Decision; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown urgency '{0}'")]
pub struct UnknownUrgency(pub String);

impl FromStr for Urgency {
    type Err = UnknownUrgency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|u| u.label() == needle)
            .ok_or_else(|| UnknownUrgency(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Optimal,
    Acceptable,
    Poor,
    Dangerous,
}

impl Correctness {
    #[must_use]
    pub const fn is_optimal(self) -> bool {
        matches!(self, Self::Optimal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub text: String,
    pub correctness: Correctness,
    #[serde(default)]
    pub consequences: Consequences,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Seconds the phase allows for a considered answer.
    pub time_allowed: f64,
    pub decisions: DecisionSet,
}

impl Phase {
    #[must_use]
    pub fn decision(&self, decision_id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id == decision_id)
    }

    #[must_use]
    pub fn optimal_decision(&self) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.correctness.is_optimal())
    }
}

/// Authored scenario, independent of urgency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTemplate {
    pub id: String,
    pub character: Character,
    pub scenario_type: String,
    pub title: String,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

/// Playable scenario with its urgency and time limit fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub urgency_level: Urgency,
    /// Seconds before the whole scenario times out.
    pub time_limit: u32,
    pub phases: Vec<Phase>,
}

impl Scenario {
    #[must_use]
    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct ThreatFile {
    #[serde(default)]
    scenarios: Vec<ScenarioTemplate>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThreatDatabase {
    by_character: BTreeMap<Character, BTreeMap<String, ScenarioTemplate>>,
}

impl ThreatDatabase {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse threat definitions from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, duplicate scenario types per
    /// character, or scenarios/phases without playable content.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: ThreatFile = serde_json::from_str(json)?;
        Self::from_templates(file.scenarios)
    }

    /// Build from pre-parsed templates.
    ///
    /// # Errors
    ///
    /// Same validation as [`ThreatDatabase::from_json`].
    pub fn from_templates(templates: Vec<ScenarioTemplate>) -> Result<Self, ContentError> {
        let mut by_character: BTreeMap<Character, BTreeMap<String, ScenarioTemplate>> =
            BTreeMap::new();
        for template in templates {
            validate_template(&template)?;
            let slot = by_character.entry(template.character).or_default();
            if slot.contains_key(&template.scenario_type) {
                return Err(ContentError::Duplicate(template.scenario_type));
            }
            slot.insert(template.scenario_type.clone(), template);
        }
        Ok(Self { by_character })
    }

    /// Bundled threat definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_THREAT_DATA)
    }

    #[must_use]
    pub fn template(&self, character: Character, scenario_type: &str) -> Option<&ScenarioTemplate> {
        self.by_character
            .get(&character)
            .and_then(|types| types.get(scenario_type))
    }

    /// Build a playable scenario for `character` at the given urgency.
    #[must_use]
    pub fn scenario(
        &self,
        character: Character,
        scenario_type: &str,
        urgency: Urgency,
        limits: &UrgencyLimits,
    ) -> Option<Scenario> {
        self.template(character, scenario_type).map(|t| Scenario {
            id: t.id.clone(),
            title: t.title.clone(),
            urgency_level: urgency,
            time_limit: limits.for_urgency(urgency),
            phases: t.phases.clone(),
        })
    }

    /// Scenario types authored for a character, in stable order.
    #[must_use]
    pub fn scenario_types(&self, character: Character) -> Vec<&str> {
        self.by_character
            .get(&character)
            .map(|types| types.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_character.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_template(template: &ScenarioTemplate) -> Result<(), ContentError> {
    if template.phases.is_empty() {
        return Err(ContentError::EmptyScenario(template.id.clone()));
    }
    for phase in &template.phases {
        if phase.decisions.is_empty() {
            return Err(ContentError::EmptyPhase {
                scenario: template.id.clone(),
                phase: phase.id.clone(),
            });
        }
        if !(phase.time_allowed.is_finite() && phase.time_allowed > 0.0) {
            return Err(ContentError::InvalidAllowance {
                scenario: template.id.clone(),
                phase: phase.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_database_covers_every_character() {
        let db = ThreatDatabase::bundled().unwrap();
        for character in Character::ALL {
            assert!(
                !db.scenario_types(character).is_empty(),
                "{character} has no scenarios"
            );
        }
    }

    #[test]
    fn urgency_sets_time_limit() {
        let db = ThreatDatabase::bundled().unwrap();
        let scenario = db
            .scenario(
                Character::Eli,
                "gaming_scam_detection",
                Urgency::High,
                &UrgencyLimits::default(),
            )
            .unwrap();
        assert_eq!(scenario.time_limit, 15);
        assert_eq!(scenario.urgency_level, Urgency::High);
        assert!((scenario.phases[0].time_allowed - 8.0).abs() < f64::EPSILON);
        assert!(scenario.phases[0].optimal_decision().is_some());
    }

    #[test]
    fn rejects_phase_without_decisions() {
        let json = r#"{ "scenarios": [ {
            "id": "s", "character": "maya", "scenario_type": "t", "title": "T",
            "phases": [ { "id": "p", "title": "P", "description": "", "time_allowed": 5, "decisions": [] } ]
        } ] }"#;
        assert!(matches!(
            ThreatDatabase::from_json(json),
            Err(ContentError::EmptyPhase { .. })
        ));
    }

    #[test]
    fn unknown_lookup_is_none() {
        let db = ThreatDatabase::bundled().unwrap();
        assert!(
            db.scenario(
                Character::Maya,
                "gaming_scam_detection",
                Urgency::Low,
                &UrgencyLimits::default()
            )
            .is_none()
        );
        assert_eq!("Critical".parse::<Urgency>(), Ok(Urgency::Critical));
    }
}
