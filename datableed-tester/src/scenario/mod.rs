use anyhow::Result;
use async_trait::async_trait;
use datableed_game::chat::CharacterConfigs;

use crate::logic::SimulationPlan;

pub mod catalog;
pub mod chat;

/// Shared inputs for chat scenarios.
#[derive(Debug, Clone)]
pub struct ChatCtx {
    pub configs: CharacterConfigs,
    pub verbose: bool,
}

// Logic test scenario
#[derive(Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

// Chat test scenario
#[async_trait(?Send)]
pub trait ChatScenario {
    async fn run_chat(&self, ctx: &ChatCtx) -> Result<()>;
}

/// A named scenario with a logic plan, a chat script, or both.
pub trait CombinedScenario {
    fn description(&self) -> &'static str;

    fn as_logic_scenario(&self) -> Option<TestScenario> {
        None
    }

    fn as_chat_scenario(&self) -> Option<&dyn ChatScenario> {
        None
    }
}

pub fn get_scenario(name: &str) -> Option<Box<dyn CombinedScenario>> {
    match name.to_lowercase().as_str() {
        "smoke" => Some(Box::new(catalog::Smoke)),
        "cautious-play" => Some(Box::new(catalog::CautiousPlay)),
        "reckless-play" => Some(Box::new(catalog::RecklessPlay)),
        "timeouts" => Some(Box::new(catalog::Timeouts)),
        "random-play" => Some(Box::new(catalog::RandomPlay)),
        "chat-trust" => Some(Box::new(chat::TrustProgression)),
        "chat-fallback" => Some(Box::new(chat::GeneratorOutage)),
        "chat-validation" => Some(Box::new(chat::RequestValidation)),
        _ => None,
    }
}

pub const SCENARIO_NAMES: [&str; 8] = [
    "smoke",
    "cautious-play",
    "reckless-play",
    "timeouts",
    "random-play",
    "chat-trust",
    "chat-fallback",
    "chat-validation",
];

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    SCENARIO_NAMES
        .iter()
        .filter_map(|&name| get_scenario(name).map(|s| (name, s.description())))
        .collect()
}
