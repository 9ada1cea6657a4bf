use anyhow::{Result, ensure};
use datableed_game::constants::KEY_TIMEOUT_PENALTY;
use datableed_game::{MechanicKind, PerformanceTier};

use super::{CombinedScenario, TestScenario};
use crate::logic::{GameplayStrategy, RunSummary, SimulationPlan};

fn all_storylines_finish(summary: &RunSummary) -> Result<()> {
    ensure!(
        summary.finished.len() == 3,
        "only {} of 3 storylines finished",
        summary.finished.len()
    );
    Ok(())
}

fn no_failed_routes(summary: &RunSummary) -> Result<()> {
    ensure!(
        summary.route_stats.failed_routes == 0,
        "{} of {} routes failed",
        summary.route_stats.failed_routes,
        summary.route_stats.total_routes
    );
    ensure!(
        summary.route_stats.successful_routes > 0,
        "no mechanic was ever routed"
    );
    Ok(())
}

fn progress_restores(summary: &RunSummary) -> Result<()> {
    ensure!(
        summary.restored_matches == Some(true),
        "saved progress did not restore the same story state"
    );
    Ok(())
}

fn grades_good_or_better(summary: &RunSummary) -> Result<()> {
    for outcome in &summary.outcomes {
        ensure!(
            outcome.tier >= PerformanceTier::Good,
            "{} {} graded {} ({}/{})",
            outcome.character,
            outcome.kind,
            outcome.tier,
            outcome.score,
            outcome.max_score
        );
    }
    Ok(())
}

fn some_grade_below_good(summary: &RunSummary) -> Result<()> {
    ensure!(
        summary
            .outcomes
            .iter()
            .any(|o| o.tier < PerformanceTier::Good),
        "reckless play never graded below good"
    );
    Ok(())
}

fn realtime_timeouts_cost_points(summary: &RunSummary) -> Result<()> {
    ensure!(summary.timeouts > 0, "no real-time scenario timed out");
    for outcome in summary.outcomes_of(MechanicKind::Realtime) {
        ensure!(
            outcome.score == 0,
            "{} scored {} after timing out",
            outcome.character,
            outcome.score
        );
        let penalty = summary
            .story
            .progress(outcome.character)
            .metric(KEY_TIMEOUT_PENALTY);
        ensure!(penalty < 0, "{} has no timeout penalty", outcome.character);
    }
    Ok(())
}

fn scenario(name: &str, plan: SimulationPlan) -> TestScenario {
    TestScenario {
        name: name.to_string(),
        plan,
    }
}

pub struct Smoke;
pub struct CautiousPlay;
pub struct RecklessPlay;
pub struct Timeouts;
pub struct RandomPlay;

impl CombinedScenario for Smoke {
    fn description(&self) -> &'static str {
        "Play every storyline carefully, then save and reload"
    }

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(scenario(
            "Smoke",
            SimulationPlan::new(GameplayStrategy::Cautious)
                .with_restore_check()
                .expect(all_storylines_finish)
                .expect(no_failed_routes)
                .expect(progress_restores),
        ))
    }
}

impl CombinedScenario for CautiousPlay {
    fn description(&self) -> &'static str {
        "Best answers everywhere grade good or better"
    }

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(scenario(
            "Cautious Play",
            SimulationPlan::new(GameplayStrategy::Cautious)
                .expect(all_storylines_finish)
                .expect(grades_good_or_better),
        ))
    }
}

impl CombinedScenario for RecklessPlay {
    fn description(&self) -> &'static str {
        "Worst answers everywhere still finish with low grades"
    }

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(scenario(
            "Reckless Play",
            SimulationPlan::new(GameplayStrategy::Reckless)
                .expect(all_storylines_finish)
                .expect(some_grade_below_good),
        ))
    }
}

impl CombinedScenario for Timeouts {
    fn description(&self) -> &'static str {
        "Let every real-time timer expire"
    }

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(scenario(
            "Timeouts",
            SimulationPlan::new(GameplayStrategy::Hesitant)
                .expect(all_storylines_finish)
                .expect(realtime_timeouts_cost_points),
        ))
    }
}

impl CombinedScenario for RandomPlay {
    fn description(&self) -> &'static str {
        "Seeded random play never breaks engine invariants"
    }

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        Some(scenario(
            "Random Play",
            SimulationPlan::new(GameplayStrategy::Random).expect(all_storylines_finish),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::game_tester::GameTester;

    fn run(scenario: &dyn CombinedScenario, seed: u64) -> Result<()> {
        let test = scenario.as_logic_scenario().unwrap();
        let summary = GameTester::new(false).run_plan(&test.plan, seed)?;
        ensure!(summary.violations.is_empty(), "{:?}", summary.violations);
        for expectation in &test.plan.expectations {
            expectation(&summary)?;
        }
        Ok(())
    }

    #[test]
    fn catalog_scenarios_pass_on_default_seed() {
        let scenarios: [&dyn CombinedScenario; 5] =
            [&Smoke, &CautiousPlay, &RecklessPlay, &Timeouts, &RandomPlay];
        for scenario in scenarios {
            run(scenario, 1337).unwrap();
        }
    }
}
