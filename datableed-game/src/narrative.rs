//! Branching story graph.
//!
//! Triggers open entry nodes; choosing applies the choice's consequences,
//! moves the character to the next node and, for mechanic choices, yields a
//! [`DecisionEvent`] for the router.

use crate::character::Character;
use crate::content::ContentError;
use crate::events::{DecisionMade, EngineEnv, GameEvent, StoryTrigger};
use crate::mechanics::MechanicKind;
use crate::realtime::OptionView;
use crate::router::DecisionEvent;
use crate::story::ConsequenceReceipt;
use crate::threats::Consequences;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const DEFAULT_STORY_DATA: &str = include_str!("../assets/data/story.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryChoice {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub consequences: Consequences,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub mechanic: Option<MechanicKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: String,
    pub character: Character,
    pub text: String,
    #[serde(default)]
    pub choices: Vec<StoryChoice>,
}

impl StoryNode {
    #[must_use]
    pub fn choice(&self, id: &str) -> Option<&StoryChoice> {
        self.choices.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoryFile {
    #[serde(default)]
    triggers: BTreeMap<String, String>,
    #[serde(default)]
    nodes: Vec<StoryNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoryGraph {
    triggers: BTreeMap<String, String>,
    nodes: BTreeMap<String, StoryNode>,
}

impl StoryGraph {
    /// # Errors
    ///
    /// Returns an error for malformed JSON, duplicate node ids, or triggers and
    /// choices that point at missing nodes.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: StoryFile = serde_json::from_str(json)?;
        let mut nodes = BTreeMap::new();
        for node in file.nodes {
            if nodes.contains_key(&node.id) {
                return Err(ContentError::Duplicate(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }
        for (trigger, node) in &file.triggers {
            if !nodes.contains_key(node) {
                return Err(ContentError::DanglingReference {
                    kind: "trigger",
                    id: trigger.clone(),
                    target: "node",
                    reference: node.clone(),
                });
            }
        }
        for node in nodes.values() {
            for choice in &node.choices {
                if let Some(next) = &choice.next
                    && !nodes.contains_key(next)
                {
                    return Err(ContentError::DanglingReference {
                        kind: "choice",
                        id: format!("{}/{}", node.id, choice.id),
                        target: "node",
                        reference: next.clone(),
                    });
                }
            }
        }
        Ok(Self {
            triggers: file.triggers,
            nodes,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_STORY_DATA)
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn entry_for(&self, trigger: &str) -> Option<&StoryNode> {
        self.triggers.get(trigger).and_then(|id| self.nodes.get(id))
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrativeError {
    #[error("unknown story trigger '{0}'")]
    UnknownTrigger(String),
    #[error("{0} is not at a story node")]
    NoCurrentNode(Character),
    #[error("node '{node}' has no choice '{choice}'")]
    UnknownChoice { node: String, choice: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub node_id: String,
    pub character: Character,
    pub text: String,
    pub choices: Vec<OptionView>,
}

impl From<&StoryNode> for NodeView {
    fn from(node: &StoryNode) -> Self {
        Self {
            node_id: node.id.clone(),
            character: node.character,
            text: node.text.clone(),
            choices: node
                .choices
                .iter()
                .map(|c| OptionView {
                    id: c.id.clone(),
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOutcome {
    pub receipt: ConsequenceReceipt,
    pub next: Option<NodeView>,
    pub route: Option<DecisionEvent>,
}

#[derive(Debug, Clone)]
pub struct NarrativeEngine {
    graph: StoryGraph,
    positions: BTreeMap<Character, String>,
}

impl NarrativeEngine {
    #[must_use]
    pub const fn new(graph: StoryGraph) -> Self {
        Self {
            graph,
            positions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    #[must_use]
    pub fn current_node(&self, character: Character) -> Option<&StoryNode> {
        self.positions
            .get(&character)
            .and_then(|id| self.graph.node(id))
    }

    #[must_use]
    pub const fn positions(&self) -> &BTreeMap<Character, String> {
        &self.positions
    }

    /// Restore saved positions, dropping any that no longer exist.
    pub fn restore_positions(&mut self, positions: BTreeMap<Character, String>) {
        self.positions = positions
            .into_iter()
            .filter(|(_, id)| self.graph.node(id).is_some())
            .collect();
    }

    /// Move the trigger's character to its entry node.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::UnknownTrigger`] for unmapped triggers.
    pub fn fire_trigger(
        &mut self,
        trigger: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<NodeView, NarrativeError> {
        let node = self
            .graph
            .entry_for(trigger)
            .ok_or_else(|| NarrativeError::UnknownTrigger(trigger.to_string()))?;
        let view = NodeView::from(node);
        self.positions.insert(node.character, node.id.clone());
        log::debug!("trigger {trigger} opened {} for {}", node.id, node.character);
        env.publish(GameEvent::StoryTriggerFired(StoryTrigger {
            character: node.character,
            trigger: trigger.to_string(),
            node: node.id.clone(),
        }));
        Ok(view)
    }

    /// Take a choice at the character's current node.
    ///
    /// # Errors
    ///
    /// Fails when the character is not at a node or the choice is not offered.
    pub fn choose(
        &mut self,
        character: Character,
        choice_id: &str,
        env: &mut EngineEnv<'_>,
    ) -> Result<ChoiceOutcome, NarrativeError> {
        let node = self
            .current_node(character)
            .ok_or(NarrativeError::NoCurrentNode(character))?;
        let choice = node
            .choice(choice_id)
            .ok_or_else(|| NarrativeError::UnknownChoice {
                node: node.id.clone(),
                choice: choice_id.to_string(),
            })?;
        let node_id = node.id.clone();
        let choice = choice.clone();

        let receipt = env.apply_consequences(character, &choice.consequences);
        env.story
            .record_decision(character, format!("story:{node_id}:{}", choice.id));
        env.publish(GameEvent::DecisionMade(DecisionMade {
            character,
            node: node_id,
            choice: choice.id.clone(),
            mechanic: choice.mechanic,
        }));

        let next = match &choice.next {
            Some(next_id) => {
                self.positions.insert(character, next_id.clone());
                self.graph.node(next_id).map(NodeView::from)
            }
            None => {
                self.positions.remove(&character);
                None
            }
        };
        let route = choice.mechanic.map(|mechanic| DecisionEvent {
            character,
            choice_id: choice.id.clone(),
            mechanic,
        });
        Ok(ChoiceOutcome {
            receipt,
            next,
            route,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::story::StoryState;

    const GRAPH: &str = r#"{
        "triggers": { "start": "a" },
        "nodes": [
            { "id": "a", "character": "eli", "text": "A", "choices": [
                { "id": "go", "text": "Go", "next": "b", "consequences": { "trust_score": 5 } },
                { "id": "play", "text": "Play", "mechanic": "puzzle" }
            ] },
            { "id": "b", "character": "eli", "text": "B", "choices": [] }
        ]
    }"#;

    #[test]
    fn dangling_references_are_rejected() {
        let err = StoryGraph::from_json(
            r#"{ "triggers": { "t": "missing" }, "nodes": [] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ContentError::DanglingReference { kind: "trigger", .. }));
    }

    #[test]
    fn trigger_then_choice_advances_and_applies() {
        let mut engine = NarrativeEngine::new(StoryGraph::from_json(GRAPH).unwrap());
        let mut story = StoryState::new();
        let mut bus = EventBus::new(16);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        let view = engine.fire_trigger("start", &mut env).unwrap();
        assert_eq!(view.choices.len(), 2);
        let outcome = engine.choose(Character::Eli, "go", &mut env).unwrap();
        assert_eq!(outcome.receipt.trust_after, 55);
        assert_eq!(outcome.next.unwrap().node_id, "b");
        assert!(outcome.route.is_none());
        assert_eq!(bus.count_named("decisionMade"), 1);
        assert_eq!(bus.count_named("storyTriggerFired"), 1);
    }

    #[test]
    fn mechanic_choice_yields_route_and_leaves_graph() {
        let mut engine = NarrativeEngine::new(StoryGraph::from_json(GRAPH).unwrap());
        let mut story = StoryState::new();
        let mut bus = EventBus::new(16);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        engine.fire_trigger("start", &mut env).unwrap();
        let outcome = engine.choose(Character::Eli, "play", &mut env).unwrap();
        assert_eq!(outcome.route.unwrap().mechanic, MechanicKind::Puzzle);
        assert!(engine.current_node(Character::Eli).is_none());
        assert_eq!(
            engine.choose(Character::Eli, "play", &mut env),
            Err(NarrativeError::NoCurrentNode(Character::Eli))
        );
    }

    #[test]
    fn bundled_graph_has_an_entry_per_character() {
        let graph = StoryGraph::bundled().unwrap();
        for character in Character::ALL {
            assert!(
                graph
                    .triggers()
                    .filter_map(|t| graph.entry_for(t))
                    .any(|n| n.character == character),
                "{character} has no entry trigger"
            );
        }
    }
}
