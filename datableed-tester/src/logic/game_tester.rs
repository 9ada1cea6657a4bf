use anyhow::{Context, Result, bail};
use colored::Colorize;
use datableed_game::clock::ManualClock;
use datableed_game::constants::STORAGE_KEY_CURRENT_MODE;
use datableed_game::mechanics::investigation::Evidence;
use datableed_game::{
    BundledContent, Character, GameEngine, GameMode, MechanicKind, MechanicOutcome,
    MemorySessionStore, PlaySession, RouteStatus, RouterStats, SessionStore, StoryState,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::rc::Rc;

use super::policy::{GameplayStrategy, PlayerPolicy};

const MAX_STEPS_PER_STORYLINE: usize = 200;

type Session = PlaySession<MemorySessionStore>;

/// Check run against a finished [`RunSummary`].
pub type Expectation = fn(&RunSummary) -> Result<()>;

/// What a logic scenario plays and what it expects afterwards.
#[derive(Clone)]
pub struct SimulationPlan {
    pub characters: Vec<Character>,
    pub strategy: GameplayStrategy,
    pub check_restore: bool,
    pub expectations: Vec<Expectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(strategy: GameplayStrategy) -> Self {
        Self {
            characters: Character::ALL.to_vec(),
            strategy,
            check_restore: false,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_characters(mut self, characters: &[Character]) -> Self {
        self.characters = characters.to_vec();
        self
    }

    #[must_use]
    pub const fn with_restore_check(mut self) -> Self {
        self.check_restore = true;
        self
    }

    #[must_use]
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionEntry {
    pub character: Character,
    pub node_id: String,
    pub choice_id: String,
    pub policy_name: &'static str,
    pub rationale: Option<String>,
    pub route: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub strategy: &'static str,
    pub steps: usize,
    pub finished: BTreeSet<Character>,
    pub outcomes: Vec<MechanicOutcome>,
    pub abandoned: Vec<MechanicKind>,
    pub timeouts: usize,
    pub route_stats: RouterStats,
    pub story: StoryState,
    pub decision_log: Vec<DecisionEntry>,
    pub violations: Vec<String>,
    pub restored_matches: Option<bool>,
    pub events_published: u64,
}

impl RunSummary {
    fn new(seed: u64, strategy: GameplayStrategy) -> Self {
        Self {
            seed,
            strategy: strategy.label(),
            steps: 0,
            finished: BTreeSet::new(),
            outcomes: Vec::new(),
            abandoned: Vec::new(),
            timeouts: 0,
            route_stats: RouterStats::default(),
            story: StoryState::new(),
            decision_log: Vec::new(),
            violations: Vec::new(),
            restored_matches: None,
            events_published: 0,
        }
    }

    #[must_use]
    pub fn outcomes_of(&self, kind: MechanicKind) -> impl Iterator<Item = &MechanicOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }
}

/// Plays scripted runs through the bundled content.
#[derive(Debug, Clone, Copy)]
pub struct GameTester {
    verbose: bool,
}

struct RunCtx {
    clock: ManualClock,
    store: MemorySessionStore,
    summary: RunSummary,
}

impl GameTester {
    #[must_use]
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Play every storyline in `plan` with a fresh session.
    ///
    /// # Errors
    ///
    /// Fails when content cannot be loaded or the engine rejects a move the
    /// policy picked from what it was shown.
    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> Result<RunSummary> {
        let store = MemorySessionStore::new();
        let engine = GameEngine::new(BundledContent, store.clone());
        let clock = ManualClock::new();
        let mut session = engine
            .create_session(seed, Rc::new(clock.clone()))
            .context("creating play session")?;
        let mut policy = plan.strategy.create_policy(seed);
        let mut ctx = RunCtx {
            clock,
            store,
            summary: RunSummary::new(seed, plan.strategy),
        };

        for &character in &plan.characters {
            let trigger = trigger_for(&session, character)
                .with_context(|| format!("no story trigger opens {character}'s storyline"))?;
            session.fire_trigger(&trigger)?;
            self.play_storyline(&mut session, policy.as_mut(), character, &mut ctx)?;
        }

        if plan.check_restore {
            engine.save_progress(&session)?;
            let restored = engine.load_progress(seed, Rc::new(ManualClock::new()))?;
            ctx.summary.restored_matches =
                Some(restored.is_some_and(|r| r.story() == session.story()));
        }

        let mut summary = ctx.summary;
        summary.outcomes = session.mechanics().completed().to_vec();
        summary.route_stats = session.router().stats();
        summary.story = session.story().clone();
        summary.events_published = session.events().published();
        let completed_events = session.events().count_named("mechanicCompleted");
        if completed_events != summary.outcomes.len() {
            summary.violations.push(format!(
                "{completed_events} mechanicCompleted events for {} outcomes",
                summary.outcomes.len()
            ));
        }
        Ok(summary)
    }

    fn play_storyline(
        &self,
        session: &mut Session,
        policy: &mut dyn PlayerPolicy,
        character: Character,
        ctx: &mut RunCtx,
    ) -> Result<()> {
        for _ in 0..MAX_STEPS_PER_STORYLINE {
            ctx.summary.steps += 1;
            if let Some(kind) = session.mechanics().active_mechanic() {
                self.play_mechanic_step(session, policy, kind, ctx)?;
            } else if !self.take_story_step(session, policy, character, ctx)? {
                ctx.summary.finished.insert(character);
                return Ok(());
            }
            check_invariants(session, ctx);
        }
        ctx.summary.violations.push(format!(
            "{character} storyline did not finish within {MAX_STEPS_PER_STORYLINE} steps"
        ));
        session.abandon_mechanic()?;
        Ok(())
    }

    /// Returns `false` once the storyline has nothing left to choose.
    fn take_story_step(
        &self,
        session: &mut Session,
        policy: &mut dyn PlayerPolicy,
        character: Character,
        ctx: &mut RunCtx,
    ) -> Result<bool> {
        let Some(view) = session.current_node(character) else {
            return Ok(false);
        };
        let Some(node) = session.narrative().graph().node(&view.node_id).cloned() else {
            bail!("current node {} is not in the story graph", view.node_id);
        };
        if node.choices.is_empty() {
            return Ok(false);
        }
        let decision = policy.pick_choice(&node);
        let Some(choice) = node.choices.get(decision.choice_index) else {
            bail!(
                "{} picked choice {} of {} at {}",
                policy.name(),
                decision.choice_index,
                node.choices.len(),
                node.id
            );
        };
        let result = session.make_choice(character, &choice.id)?;
        let route = match result.route {
            RouteStatus::NotRequested => "-".to_string(),
            RouteStatus::Routed(kind) => format!("routed {kind}"),
            RouteStatus::Failed(kind) => format!("failed {kind}"),
        };
        if self.verbose {
            println!(
                "    {} {} -> {} [{}]",
                character.display_name().bright_white(),
                node.id,
                choice.id,
                route
            );
        }
        ctx.summary.decision_log.push(DecisionEntry {
            character,
            node_id: node.id.clone(),
            choice_id: choice.id.clone(),
            policy_name: policy.name(),
            rationale: decision.rationale,
            route,
        });
        Ok(true)
    }

    fn play_mechanic_step(
        &self,
        session: &mut Session,
        policy: &mut dyn PlayerPolicy,
        kind: MechanicKind,
        ctx: &mut RunCtx,
    ) -> Result<()> {
        let played = match kind {
            MechanicKind::Investigation => play_investigation(session, policy)?,
            MechanicKind::Puzzle => play_puzzle(session, policy)?,
            MechanicKind::Action => play_action(session, policy, &ctx.clock)?,
            MechanicKind::Realtime => play_realtime(session, policy, ctx)?,
        };
        if !played {
            if self.verbose {
                println!("    {} {kind} had nothing left to play", "⚠️".yellow());
            }
            ctx.summary.abandoned.push(kind);
            session.abandon_mechanic()?;
        }
        Ok(())
    }
}

fn trigger_for(session: &Session, character: Character) -> Option<String> {
    let graph = session.narrative().graph();
    graph
        .triggers()
        .find(|t| graph.entry_for(t).is_some_and(|n| n.character == character))
        .map(str::to_string)
}

fn play_investigation(session: &mut Session, policy: &mut dyn PlayerPolicy) -> Result<bool> {
    let investigation = session.mechanics().investigation();
    let Some(board) = investigation.board() else {
        return Ok(false);
    };
    let revealed: BTreeSet<&str> = investigation
        .revealed()
        .into_iter()
        .map(|e| e.id.as_str())
        .collect();
    let remaining: Vec<&Evidence> = board
        .evidence
        .iter()
        .filter(|e| !revealed.contains(e.id.as_str()))
        .collect();
    if remaining.is_empty() {
        return Ok(false);
    }
    let pick = policy.pick_evidence(&remaining).min(remaining.len() - 1);
    let (tool, target) = (remaining[pick].tool, remaining[pick].target.clone());
    session.use_tool(tool, &target)?;
    Ok(true)
}

fn play_puzzle(session: &mut Session, policy: &mut dyn PlayerPolicy) -> Result<bool> {
    let puzzle = session.mechanics().puzzle();
    let Some(view) = puzzle.current_challenge() else {
        return Ok(false);
    };
    let Some(challenge) = puzzle
        .library()
        .get(&view.puzzle_id)
        .and_then(|t| t.challenges.get(view.index))
    else {
        bail!("puzzle {} has no challenge {}", view.puzzle_id, view.index);
    };
    if challenge.options.is_empty() {
        return Ok(false);
    }
    let pick = policy
        .pick_option(&challenge.options)
        .min(challenge.options.len() - 1);
    let option_id = challenge.options[pick].id.clone();
    session.answer_puzzle(&option_id)?;
    Ok(true)
}

fn play_action(
    session: &mut Session,
    policy: &mut dyn PlayerPolicy,
    clock: &ManualClock,
) -> Result<bool> {
    let action = session.mechanics().action();
    let Some(view) = action.current_phase() else {
        return Ok(false);
    };
    let Some(phase) = action
        .library()
        .get(&view.sequence_id)
        .and_then(|s| s.phases.get(view.index))
    else {
        bail!("sequence {} has no phase {}", view.sequence_id, view.index);
    };
    if phase.actions.is_empty() {
        return Ok(false);
    }
    let pick = policy.pick_action(phase);
    let index = pick.index.unwrap_or(0).min(phase.actions.len() - 1);
    let action_id = phase.actions[index].id.clone();
    clock.advance_secs(pick.delay_secs.max(0.0));
    session.perform_action(&action_id)?;
    Ok(true)
}

fn play_realtime(
    session: &mut Session,
    policy: &mut dyn PlayerPolicy,
    ctx: &mut RunCtx,
) -> Result<bool> {
    let engine = session.mechanics().realtime().engine();
    let Some(scenario) = engine
        .current_scenario_id()
        .and_then(|id| engine.session(id))
    else {
        return Ok(false);
    };
    let Some(phase) = scenario.phase() else {
        return Ok(false);
    };
    let pick = policy.pick_decision(phase, scenario.scenario.time_limit);
    let decision_id = pick
        .index
        .and_then(|i| phase.decisions.iter().nth(i))
        .map(|d| d.id.clone());

    ctx.clock.advance_secs(pick.delay_secs.max(0.0));
    let expired = session.tick()?;
    if !expired.is_empty() {
        ctx.summary.timeouts += expired.len();
        return Ok(true);
    }
    match decision_id {
        Some(id) => {
            session.submit_decision(&id)?;
        }
        // Waiting only ends the scenario once the timer fires.
        None => ctx.clock.advance_secs(1.0),
    }
    Ok(true)
}

fn check_invariants(session: &Session, ctx: &mut RunCtx) {
    let mechanics = session.mechanics();
    if mechanics.active_count() > 1 {
        ctx.summary.violations.push(format!(
            "step {}: {} mechanics active at once",
            ctx.summary.steps,
            mechanics.active_count()
        ));
    }

    let expected = mechanics
        .active_mechanic()
        .map_or(GameMode::Story, GameMode::from);
    let stored = ctx.store.get_item(STORAGE_KEY_CURRENT_MODE).ok().flatten();
    if stored.as_deref() != Some(expected.as_str()) {
        ctx.summary.violations.push(format!(
            "step {}: stored mode {stored:?} but {expected} is running",
            ctx.summary.steps
        ));
    }

    for (character, progress) in session.story().characters() {
        if !(0..=100).contains(&progress.trust_score) {
            ctx.summary.violations.push(format!(
                "step {}: {character} trust {} out of range",
                ctx.summary.steps, progress.trust_score
            ));
        }
    }

    let stats = session.router().stats();
    if stats.successful_routes + stats.failed_routes != stats.total_routes {
        ctx.summary
            .violations
            .push(format!("step {}: router stats {stats:?} do not add up", ctx.summary.steps));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cautious_run_finishes_every_storyline() {
        let plan = SimulationPlan::new(GameplayStrategy::Cautious).with_restore_check();
        let summary = GameTester::new(false).run_plan(&plan, 1337).unwrap();
        assert!(summary.violations.is_empty(), "{:?}", summary.violations);
        assert_eq!(summary.finished.len(), 3);
        assert_eq!(summary.restored_matches, Some(true));
        assert!(!summary.outcomes.is_empty());
    }

    #[test]
    fn hesitant_runs_time_out() {
        let plan = SimulationPlan::new(GameplayStrategy::Hesitant)
            .with_characters(&[Character::Stanley]);
        let summary = GameTester::new(false).run_plan(&plan, 9).unwrap();
        assert!(summary.timeouts >= 1);
        assert!(summary.outcomes_of(MechanicKind::Realtime).all(|o| o.score == 0));
    }

    #[test]
    fn random_runs_are_reproducible() {
        let plan = SimulationPlan::new(GameplayStrategy::Random);
        let tester = GameTester::new(false);
        let a = tester.run_plan(&plan, 42).unwrap();
        let b = tester.run_plan(&plan, 42).unwrap();
        let choices = |s: &RunSummary| {
            s.decision_log
                .iter()
                .map(|d| d.choice_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(choices(&a), choices(&b));
        assert_eq!(a.story, b.story);
    }
}
