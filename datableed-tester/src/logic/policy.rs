use std::cmp::Reverse;
use std::fmt;

use datableed_game::constants::KEY_TRUST_SCORE;
use datableed_game::mechanics::action::ActionPhase;
use datableed_game::mechanics::investigation::Evidence;
use datableed_game::mechanics::puzzle::PuzzleOption;
use datableed_game::narrative::StoryNode;
use datableed_game::threats::{Correctness, Phase};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Decision returned by a [`PlayerPolicy`]
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub choice_index: usize,
    pub rationale: Option<String>,
}

impl PolicyDecision {
    #[must_use]
    pub fn new(choice_index: usize, rationale: Option<String>) -> Self {
        Self {
            choice_index,
            rationale,
        }
    }
}

/// A pick made against a running timer. `None` lets the timer run out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPick {
    pub index: Option<usize>,
    pub delay_secs: f64,
}

impl TimedPick {
    const fn after(index: usize, delay_secs: f64) -> Self {
        Self {
            index: Some(index),
            delay_secs,
        }
    }
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Select a choice at a story node.
    fn pick_choice(&mut self, node: &StoryNode) -> PolicyDecision;

    /// Select a real-time decision for the current phase.
    fn pick_decision(&mut self, phase: &Phase, time_limit: u32) -> TimedPick;

    /// Select a puzzle option.
    fn pick_option(&mut self, options: &[PuzzleOption]) -> usize;

    /// Select an action in a timed action phase.
    fn pick_action(&mut self, phase: &ActionPhase) -> TimedPick;

    /// Select the next evidence entry to probe from those not yet revealed.
    fn pick_evidence(&mut self, remaining: &[&Evidence]) -> usize;
}

/// Built-in gameplay strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameplayStrategy {
    Cautious,
    Reckless,
    Hesitant,
    Random,
}

impl GameplayStrategy {
    pub const ALL: [Self; 4] = [Self::Cautious, Self::Reckless, Self::Hesitant, Self::Random];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cautious => "Cautious",
            Self::Reckless => "Reckless",
            Self::Hesitant => "Hesitant",
            Self::Random => "Random",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy> {
        match self {
            Self::Cautious => Box::new(CautiousPolicy),
            Self::Reckless => Box::new(RecklessPolicy),
            Self::Hesitant => Box::new(HesitantPolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
        }
    }
}

impl fmt::Display for GameplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn trust_delta(node: &StoryNode, index: usize) -> i32 {
    node.choices
        .get(index)
        .and_then(|c| c.consequences.get(KEY_TRUST_SCORE).copied())
        .unwrap_or(0)
}

fn correctness_rank(correctness: Correctness) -> u8 {
    match correctness {
        Correctness::Optimal => 0,
        Correctness::Acceptable => 1,
        Correctness::Poor => 2,
        Correctness::Dangerous => 3,
    }
}

fn index_by_rank(phase: &Phase, worst: bool) -> usize {
    let ranked = phase
        .decisions
        .iter()
        .enumerate()
        .map(|(idx, d)| (idx, correctness_rank(d.correctness)));
    let picked = if worst {
        ranked.max_by_key(|(_, rank)| *rank)
    } else {
        ranked.min_by_key(|(_, rank)| *rank)
    };
    picked.map_or(0, |(idx, _)| idx)
}

struct CautiousPolicy;
struct RecklessPolicy;
struct HesitantPolicy;

struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    fn index(&mut self, len: usize) -> usize {
        if len == 0 { 0 } else { self.rng.gen_range(0..len) }
    }
}

impl PlayerPolicy for CautiousPolicy {
    fn name(&self) -> &'static str {
        "Cautious"
    }

    // Prefer choices that open a mechanic, then the best trust swing. Ties go
    // to the earliest choice.
    fn pick_choice(&mut self, node: &StoryNode) -> PolicyDecision {
        let (idx, delta) = node
            .choices
            .iter()
            .enumerate()
            .map(|(idx, choice)| {
                let bonus = if choice.mechanic.is_some() { 100 } else { 0 };
                (idx, trust_delta(node, idx) + bonus)
            })
            .max_by_key(|&(idx, score)| (score, Reverse(idx)))
            .unwrap_or((0, 0));
        PolicyDecision::new(idx, Some(format!("score {delta}")))
    }

    fn pick_decision(&mut self, phase: &Phase, _time_limit: u32) -> TimedPick {
        TimedPick::after(index_by_rank(phase, false), 1.0)
    }

    fn pick_option(&mut self, options: &[PuzzleOption]) -> usize {
        options.iter().position(|o| o.correct).unwrap_or(0)
    }

    fn pick_action(&mut self, phase: &ActionPhase) -> TimedPick {
        let idx = phase
            .actions
            .iter()
            .enumerate()
            .max_by_key(|(_, a)| a.points)
            .map_or(0, |(idx, _)| idx);
        TimedPick::after(idx, (phase.time_limit / 4.0).min(1.0))
    }

    fn pick_evidence(&mut self, remaining: &[&Evidence]) -> usize {
        remaining.iter().position(|e| e.red_flag).unwrap_or(0)
    }
}

impl PlayerPolicy for RecklessPolicy {
    fn name(&self) -> &'static str {
        "Reckless"
    }

    fn pick_choice(&mut self, node: &StoryNode) -> PolicyDecision {
        let idx = (0..node.choices.len())
            .min_by_key(|&idx| trust_delta(node, idx))
            .unwrap_or(0);
        PolicyDecision::new(idx, Some(format!("trust {}", trust_delta(node, idx))))
    }

    fn pick_decision(&mut self, phase: &Phase, _time_limit: u32) -> TimedPick {
        TimedPick::after(index_by_rank(phase, true), 0.0)
    }

    fn pick_option(&mut self, options: &[PuzzleOption]) -> usize {
        options.iter().position(|o| !o.correct).unwrap_or(0)
    }

    fn pick_action(&mut self, phase: &ActionPhase) -> TimedPick {
        let idx = phase
            .actions
            .iter()
            .enumerate()
            .min_by_key(|(_, a)| a.points)
            .map_or(0, |(idx, _)| idx);
        TimedPick::after(idx, phase.time_limit + 1.0)
    }

    fn pick_evidence(&mut self, remaining: &[&Evidence]) -> usize {
        remaining.iter().position(|e| !e.red_flag).unwrap_or(0)
    }
}

impl PlayerPolicy for HesitantPolicy {
    fn name(&self) -> &'static str {
        "Hesitant"
    }

    // Heads for real-time scenarios whenever one is offered.
    fn pick_choice(&mut self, node: &StoryNode) -> PolicyDecision {
        let idx = node
            .choices
            .iter()
            .position(|c| {
                c.mechanic
                    .is_some_and(|m| m == datableed_game::MechanicKind::Realtime)
            })
            .unwrap_or(0);
        PolicyDecision::new(idx, Some("waits it out".to_string()))
    }

    fn pick_decision(&mut self, _phase: &Phase, time_limit: u32) -> TimedPick {
        TimedPick {
            index: None,
            delay_secs: f64::from(time_limit) + 1.0,
        }
    }

    fn pick_option(&mut self, options: &[PuzzleOption]) -> usize {
        options.iter().position(|o| o.correct).unwrap_or(0)
    }

    fn pick_action(&mut self, phase: &ActionPhase) -> TimedPick {
        TimedPick::after(0, phase.time_limit * 0.9)
    }

    fn pick_evidence(&mut self, _remaining: &[&Evidence]) -> usize {
        0
    }
}

impl PlayerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn pick_choice(&mut self, node: &StoryNode) -> PolicyDecision {
        let idx = self.index(node.choices.len());
        PolicyDecision::new(idx, None)
    }

    fn pick_decision(&mut self, phase: &Phase, time_limit: u32) -> TimedPick {
        let idx = self.index(phase.decisions.len());
        let delay = self.rng.gen_range(0.0..f64::from(time_limit.max(1)) * 0.8);
        TimedPick::after(idx, delay)
    }

    fn pick_option(&mut self, options: &[PuzzleOption]) -> usize {
        self.index(options.len())
    }

    fn pick_action(&mut self, phase: &ActionPhase) -> TimedPick {
        let idx = self.index(phase.actions.len());
        let delay = self.rng.gen_range(0.0..phase.time_limit.max(0.1) * 1.5);
        TimedPick::after(idx, delay)
    }

    fn pick_evidence(&mut self, remaining: &[&Evidence]) -> usize {
        self.index(remaining.len())
    }
}
