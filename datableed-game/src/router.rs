//! Mechanic router: turns a story decision into an activated mechanic.
//!
//! Each decision gets exactly one routing attempt. Failures are counted and
//! logged, never raised to the caller.

use crate::character::Character;
use crate::constants::ROUTE_HISTORY_CAPACITY;
use crate::content::ContentError;
use crate::events::{EngineEnv, GameEvent};
use crate::mechanics::{GamingMechanicsEngine, MechanicContext, MechanicError, MechanicKind};
use crate::numbers::ratio;
use crate::seed::derive_stream_seed;
use crate::story::StoryState;
use crate::threats::Urgency;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

const DEFAULT_ROUTING_DATA: &str = include_str!("../assets/data/routing.json");

/// Where a character's version of a mechanic takes place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterBinding {
    pub area: String,
    pub target: String,
    #[serde(default = "CharacterBinding::default_urgency")]
    pub urgency: Urgency,
}

impl CharacterBinding {
    const fn default_urgency() -> Urgency {
        Urgency::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub mechanic: MechanicKind,
    #[serde(default)]
    pub bindings: BTreeMap<Character, CharacterBinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RoutingFile {
    #[serde(default)]
    rules: Vec<RoutingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingTable {
    rules: BTreeMap<MechanicKind, RoutingRule>,
}

impl RoutingTable {
    /// # Errors
    ///
    /// Returns an error for malformed JSON or two rules for one mechanic.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: RoutingFile = serde_json::from_str(json)?;
        let mut rules = BTreeMap::new();
        for rule in file.rules {
            if rules.contains_key(&rule.mechanic) {
                return Err(ContentError::Duplicate(rule.mechanic.to_string()));
            }
            rules.insert(rule.mechanic, rule);
        }
        Ok(Self { rules })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_ROUTING_DATA)
    }

    #[must_use]
    pub fn rule(&self, kind: MechanicKind) -> Option<&RoutingRule> {
        self.rules.get(&kind)
    }

    #[must_use]
    pub fn binding(&self, kind: MechanicKind, character: Character) -> Option<&CharacterBinding> {
        self.rules.get(&kind)?.bindings.get(&character)
    }

    pub fn remove_rule(&mut self, kind: MechanicKind) -> Option<RoutingRule> {
        self.rules.remove(&kind)
    }

    pub fn insert_rule(&mut self, rule: RoutingRule) -> Option<RoutingRule> {
        self.rules.insert(rule.mechanic, rule)
    }
}

/// A story choice that asks for a mechanic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub character: Character,
    pub choice_id: String,
    pub mechanic: MechanicKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no routing rule for mechanic {0}")]
    NoRule(MechanicKind),
    #[error("{character} has no binding for mechanic {kind}")]
    NoBinding {
        kind: MechanicKind,
        character: Character,
    },
    #[error("activation failed: {0}")]
    Activation(#[from] MechanicError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouterStats {
    pub total_routes: u64,
    pub successful_routes: u64,
    pub failed_routes: u64,
}

impl RouterStats {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = usize::try_from(self.total_routes).unwrap_or(usize::MAX);
        let ok = usize::try_from(self.successful_routes).unwrap_or(usize::MAX);
        ratio(ok, total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub character: Character,
    pub choice_id: String,
    pub mechanic: MechanicKind,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MechanicRouter {
    table: RoutingTable,
    seed: u64,
    stats: RouterStats,
    history: VecDeque<RouteRecord>,
}

impl MechanicRouter {
    #[must_use]
    pub fn new(table: RoutingTable, seed: u64) -> Self {
        Self {
            table,
            seed,
            stats: RouterStats::default(),
            history: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn history(&self) -> impl Iterator<Item = &RouteRecord> {
        self.history.iter()
    }

    #[must_use]
    pub const fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut RoutingTable {
        &mut self.table
    }

    /// Route a decision to its mechanic. Returns `false` on any failure.
    pub fn route_decision(
        &mut self,
        event: &DecisionEvent,
        mechanics: &mut GamingMechanicsEngine,
        env: &mut EngineEnv<'_>,
    ) -> bool {
        self.stats.total_routes += 1;
        let result = self.try_route(event, mechanics, env);
        let record = RouteRecord {
            character: event.character,
            choice_id: event.choice_id.clone(),
            mechanic: event.mechanic,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        if self.history.len() == ROUTE_HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(record);
        match result {
            Ok(()) => {
                self.stats.successful_routes += 1;
                true
            }
            Err(err) => {
                self.stats.failed_routes += 1;
                log::warn!(
                    "routing '{}' for {} to {} failed: {err}",
                    event.choice_id,
                    event.character,
                    event.mechanic
                );
                false
            }
        }
    }

    fn try_route(
        &self,
        event: &DecisionEvent,
        mechanics: &mut GamingMechanicsEngine,
        env: &mut EngineEnv<'_>,
    ) -> Result<(), RouteError> {
        let rule = self
            .table
            .rule(event.mechanic)
            .ok_or(RouteError::NoRule(event.mechanic))?;
        let binding = rule
            .bindings
            .get(&event.character)
            .ok_or(RouteError::NoBinding {
                kind: event.mechanic,
                character: event.character,
            })?;
        let ctx = self.build_context(event, binding, &*env.story);
        log::debug!(
            "routing '{}' to {} ({}/{})",
            event.choice_id,
            event.mechanic,
            ctx.area,
            ctx.target
        );
        env.publish(GameEvent::RouteToMechanic(ctx.clone()));
        mechanics.activate_mechanic(event.mechanic, &ctx, env)?;
        Ok(())
    }

    fn build_context(
        &self,
        event: &DecisionEvent,
        binding: &CharacterBinding,
        story: &StoryState,
    ) -> MechanicContext {
        let progress = story.progress(event.character);
        let domain = format!("route:{}", self.stats.total_routes);
        MechanicContext {
            kind: event.mechanic,
            character: event.character,
            area: binding.area.clone(),
            target: binding.target.clone(),
            urgency: binding.urgency,
            trust_score: progress.trust_score,
            metrics: progress.metrics,
            seed: derive_stream_seed(self.seed, domain.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::content::ContentPack;
    use crate::events::EventBus;
    use std::rc::Rc;

    fn rig() -> (MechanicRouter, GamingMechanicsEngine) {
        let pack = ContentPack::bundled().unwrap();
        let mechanics = GamingMechanicsEngine::new(
            pack.threats,
            pack.investigations,
            pack.puzzles,
            pack.actions,
            &EngineConfig::default(),
            Rc::new(ManualClock::new()),
        );
        (MechanicRouter::new(pack.routing, 11), mechanics)
    }

    fn decision(character: Character, mechanic: MechanicKind) -> DecisionEvent {
        DecisionEvent {
            character,
            choice_id: "test_choice".into(),
            mechanic,
        }
    }

    #[test]
    fn routes_bound_decision_and_counts_success() {
        let (mut router, mut mechanics) = rig();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(32);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        assert!(router.route_decision(
            &decision(Character::Eli, MechanicKind::Realtime),
            &mut mechanics,
            &mut env
        ));
        assert_eq!(mechanics.active_mechanic(), Some(MechanicKind::Realtime));
        assert_eq!(router.stats().successful_routes, 1);
        assert_eq!(bus.count_named("routeToMechanic"), 1);
    }

    #[test]
    fn unmapped_mechanic_returns_false_and_counts_failure() {
        let (mut router, mut mechanics) = rig();
        router.table_mut().remove_rule(MechanicKind::Puzzle);
        let mut story = StoryState::new();
        let mut bus = EventBus::new(32);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        assert!(!router.route_decision(
            &decision(Character::Maya, MechanicKind::Puzzle),
            &mut mechanics,
            &mut env
        ));
        let stats = router.stats();
        assert_eq!(stats.failed_routes, 1);
        assert_eq!(stats.total_routes, 1);
        let record = router.history().last().unwrap();
        assert!(!record.success);
        assert!(record.error.as_deref().unwrap().contains("no routing rule"));
    }

    #[test]
    fn character_without_binding_fails() {
        let (mut router, mut mechanics) = rig();
        let mut story = StoryState::new();
        let mut bus = EventBus::new(32);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        assert!(!router.route_decision(
            &decision(Character::Stanley, MechanicKind::Action),
            &mut mechanics,
            &mut env
        ));
        assert_eq!(router.stats().failed_routes, 1);
        assert_eq!(mechanics.active_count(), 0);
    }

    #[test]
    fn context_carries_story_state() {
        let (router, _) = rig();
        let mut story = StoryState::new();
        let mut deltas = crate::threats::Consequences::new();
        deltas.insert("trust_score".into(), -20);
        deltas.insert("risk_exposure".into(), 2);
        story.apply_consequences(Character::Maya, &deltas);
        let event = decision(Character::Maya, MechanicKind::Investigation);
        let binding = router
            .table()
            .binding(MechanicKind::Investigation, Character::Maya)
            .unwrap()
            .clone();
        let ctx = router.build_context(&event, &binding, &story);
        assert_eq!(ctx.trust_score, 30);
        assert_eq!(ctx.metrics.get("risk_exposure"), Some(&2));
        assert_eq!(ctx.area, "dating_profile");
    }

    #[test]
    fn success_rate_handles_no_routes() {
        assert!(RouterStats::default().success_rate().abs() < f64::EPSILON);
    }
}
