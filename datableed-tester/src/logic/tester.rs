use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::scenario::TestScenario;
use crate::logic::game_tester::{GameTester, RunSummary, SimulationPlan};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

impl ScenarioResult {
    /// Result of a scenario that runs once, such as a chat script.
    #[must_use]
    pub fn single(name: &str, duration: Duration, failure: Option<String>) -> Self {
        let passed = failure.is_none();
        Self {
            scenario_name: name.to_string(),
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: failure.into_iter().collect(),
            average_duration: duration,
            performance_data: vec![duration],
        }
    }
}

pub struct LogicTester {
    tester: GameTester,
    verbose: bool,
}

impl LogicTester {
    pub const fn new(verbose: bool) -> Self {
        Self {
            tester: GameTester::new(verbose),
            verbose,
        }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> Vec<ScenarioResult> {
        let mut results = Vec::new();

        for &seed in seeds {
            if self.verbose {
                println!(
                    "🧪 Testing scenario: {} (strategy: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.strategy,
                    seed
                );
            }

            results.push(self.run_single_scenario(scenario, seed, iterations));
        }

        results
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> ScenarioResult {
        let (successes, failures, performance_data) =
            self.run_simulation_iterations(&scenario.plan, seed, iterations);

        let avg_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        ScenarioResult {
            scenario_name: scenario.name.clone(),
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration: avg_duration,
            performance_data,
        }
    }

    fn run_simulation_iterations(
        &self,
        plan: &SimulationPlan,
        seed: u64,
        iterations: usize,
    ) -> (usize, Vec<String>, Vec<Duration>) {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            let failure = match self.tester.run_plan(plan, iteration_seed) {
                Ok(summary) => evaluate_expectations(plan, &summary)
                    .map(|err| format!("{err} | {}", summarize_decision_path(&summary))),
                Err(err) => Some(format!("run aborted: {err:#}")),
            };

            if let Some(err) = failure {
                failures.push(format!(
                    "Iteration {} (strategy {}, seed {}): {}",
                    i + 1,
                    plan.strategy,
                    iteration_seed,
                    err
                ));
                if self.verbose {
                    println!("  ❌ Iteration {}/{} failed: {}", i + 1, iterations, err.red());
                }
            } else {
                successes += 1;
                let duration = start_time.elapsed();
                performance_data.push(duration);
                if self.verbose {
                    println!("  ✅ Iteration {}/{} passed ({duration:?})", i + 1, iterations);
                }
            }
        }

        (successes, failures, performance_data)
    }
}

/// Invariant violations fail every plan; then the plan's own expectations run.
fn evaluate_expectations(plan: &SimulationPlan, summary: &RunSummary) -> Option<String> {
    if let Some(violation) = summary.violations.first() {
        return Some(format!(
            "{} invariant violation(s), first: {violation}",
            summary.violations.len()
        ));
    }
    for expectation in &plan.expectations {
        if let Err(err) = expectation(summary) {
            return Some(err.to_string());
        }
    }
    None
}

fn summarize_decision_path(summary: &RunSummary) -> String {
    if summary.decision_log.is_empty() {
        return "no decisions recorded".to_string();
    }

    summary
        .decision_log
        .iter()
        .rev()
        .take(3)
        .map(|entry| {
            format!(
                "{} at {}: {} [{}] {} reason {}",
                entry.character,
                entry.node_id,
                entry.choice_id,
                entry.policy_name,
                entry.route,
                entry.rationale.as_deref().unwrap_or("-")
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_results_count_one_iteration() {
        let ok = ScenarioResult::single("chat", Duration::from_millis(4), None);
        assert!(ok.passed);
        assert_eq!(ok.successful_iterations, 1);

        let failed = ScenarioResult::single("chat", Duration::ZERO, Some("boom".into()));
        assert!(!failed.passed);
        assert_eq!(failed.failures, vec!["boom".to_string()]);
    }

    #[test]
    fn durations_serialize_as_millis() {
        let result = ScenarioResult::single("x", Duration::from_millis(1500), None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["average_duration"], 1500);
        assert_eq!(json["performance_data"][0], 1500);
    }
}
