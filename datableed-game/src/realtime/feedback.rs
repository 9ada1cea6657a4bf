use crate::character::Character;
use crate::config::TierThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl PerformanceTier {
    /// Tier for a fraction in `[0, 1]`, e.g. optimal decisions over all decisions.
    #[must_use]
    pub fn from_ratio(ratio: f64, tiers: &TierThresholds) -> Self {
        if ratio >= tiers.excellent {
            Self::Excellent
        } else if ratio >= tiers.good {
            Self::Good
        } else if ratio >= tiers.fair {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closing line for a finished real-time scenario.
#[must_use]
pub fn scenario_feedback(
    character: Character,
    tier: PerformanceTier,
    optimal: usize,
    total: usize,
    timed_out: bool,
) -> String {
    let name = character.display_name();
    let headline = match (character, tier) {
        (Character::Maya, PerformanceTier::Excellent) => {
            "you spotted every pressure tactic before it could land"
        }
        (Character::Maya, PerformanceTier::Good) => {
            "you kept your guard up even when the story pulled at you"
        }
        (Character::Maya, PerformanceTier::Fair) => {
            "some of the urgency got through. Slow down when a match asks for money"
        }
        (Character::Maya, PerformanceTier::Poor) => {
            "the scammer controlled the pace. Verify before you trust"
        }
        (Character::Eli, PerformanceTier::Excellent) => {
            "clean game. No link, no login, no lost inventory"
        }
        (Character::Eli, PerformanceTier::Good) => {
            "solid reads, with a couple of risky clicks along the way"
        }
        (Character::Eli, PerformanceTier::Fair) => {
            "the countdown got to you. Real trades never need a timer"
        }
        (Character::Eli, PerformanceTier::Poor) => {
            "the account would be gone. Lock it down and turn on 2FA"
        }
        (Character::Stanley, PerformanceTier::Excellent) => {
            "you hung up on every fake and called back on numbers you trust"
        }
        (Character::Stanley, PerformanceTier::Good) => {
            "careful choices, and you checked with family when unsure"
        }
        (Character::Stanley, PerformanceTier::Fair) => {
            "a few scare tactics worked. Nobody legitimate demands you act this minute"
        }
        (Character::Stanley, PerformanceTier::Poor) => {
            "the caller got what they wanted. Never grant remote access to a stranger"
        }
    };
    let mut text = format!("{name}: {headline}. {optimal}/{total} optimal decisions.");
    if timed_out {
        text.push_str(" Time ran out before every decision was made.");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_inclusive() {
        let tiers = TierThresholds::default();
        assert_eq!(PerformanceTier::from_ratio(0.8, &tiers), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_ratio(0.6, &tiers), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_ratio(0.4, &tiers), PerformanceTier::Fair);
        assert_eq!(PerformanceTier::from_ratio(0.39, &tiers), PerformanceTier::Poor);
    }

    #[test]
    fn feedback_mentions_counts_and_timeout() {
        let text = scenario_feedback(Character::Eli, PerformanceTier::Poor, 0, 1, true);
        assert!(text.starts_with("Eli:"));
        assert!(text.contains("0/1"));
        assert!(text.contains("Time ran out"));
    }
}
