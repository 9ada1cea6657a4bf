//! Typed event bus connecting narrative, router, mechanics and the real-time
//! engine.
//!
//! Every event is stamped with a sequence number and a UTC timestamp when it
//! is published. Subscribers run synchronously in subscription order; the
//! bus also keeps a bounded history that hosts can drain.

use crate::character::Character;
use crate::mechanics::{MechanicContext, MechanicKind, MechanicOutcome};
use crate::realtime::ScenarioReport;
use crate::story::{ConsequenceReceipt, StoryState};
use crate::threats::{Consequences, Urgency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryTrigger {
    pub character: Character,
    pub trigger: String,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMade {
    pub character: Character,
    pub node: String,
    pub choice: String,
    pub mechanic: Option<MechanicKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStarted {
    pub session_id: String,
    pub character: Character,
    pub scenario_id: String,
    pub urgency: Urgency,
    pub time_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub character: Character,
    pub previous: i32,
    pub current: i32,
}

impl From<&ConsequenceReceipt> for TrustUpdate {
    fn from(receipt: &ConsequenceReceipt) -> Self {
        Self {
            character: receipt.character,
            previous: receipt.trust_before,
            current: receipt.trust_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum GameEvent {
    StoryTriggerFired(StoryTrigger),
    DecisionMade(DecisionMade),
    RouteToMechanic(MechanicContext),
    MechanicActivated {
        kind: MechanicKind,
        character: Character,
    },
    MechanicDeactivated {
        kind: MechanicKind,
    },
    MechanicCompleted(MechanicOutcome),
    RealTimeScenarioStarted(ScenarioStarted),
    RealTimeScenarioCompleted(ScenarioReport),
    TrustScoreUpdated(TrustUpdate),
    TimerExpired {
        timer_id: String,
    },
}

impl GameEvent {
    /// Event name as hosts know it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StoryTriggerFired(_) => "storyTriggerFired",
            Self::DecisionMade(_) => "decisionMade",
            Self::RouteToMechanic(_) => "routeToMechanic",
            Self::MechanicActivated { .. } => "mechanicActivated",
            Self::MechanicDeactivated { .. } => "mechanicDeactivated",
            Self::MechanicCompleted(_) => "mechanicCompleted",
            Self::RealTimeScenarioStarted(_) => "realTimeScenarioStarted",
            Self::RealTimeScenarioCompleted(_) => "realTimeScenarioCompleted",
            Self::TrustScoreUpdated(_) => "trustScoreUpdated",
            Self::TimerExpired { .. } => "timerExpired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: GameEvent,
}

pub type SubscriberId = u64;

type Listener = Box<dyn FnMut(&EventEnvelope)>;

pub struct EventBus {
    next_seq: u64,
    next_subscriber: SubscriberId,
    listeners: Vec<(SubscriberId, Listener)>,
    history: VecDeque<EventEnvelope>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("next_seq", &self.next_seq)
            .field("listeners", &self.listeners.len())
            .field("history", &self.history.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            next_subscriber: 0,
            listeners: Vec::new(),
            history: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EventEnvelope) + 'static) -> SubscriberId {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Stamp, deliver and record an event. Returns its sequence number.
    pub fn publish(&mut self, event: GameEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let envelope = EventEnvelope {
            seq,
            at: Utc::now(),
            event,
        };
        log::trace!("event #{seq} {}", envelope.event.name());
        for (_, listener) in &mut self.listeners {
            listener(&envelope);
        }
        if self.capacity > 0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(envelope);
        }
        seq
    }

    pub fn history(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.history.iter()
    }

    /// Take every recorded event, oldest first.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        self.history.drain(..).collect()
    }

    #[must_use]
    pub fn published(&self) -> u64 {
        self.next_seq
    }

    #[must_use]
    pub fn count_named(&self, name: &str) -> usize {
        self.history.iter().filter(|e| e.event.name() == name).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::constants::EVENT_HISTORY_CAPACITY)
    }
}

/// Mutable collaborators handed to every subsystem call.
#[derive(Debug)]
pub struct EngineEnv<'a> {
    pub story: &'a mut StoryState,
    pub bus: &'a mut EventBus,
}

impl<'a> EngineEnv<'a> {
    pub fn new(story: &'a mut StoryState, bus: &'a mut EventBus) -> Self {
        Self { story, bus }
    }

    pub fn publish(&mut self, event: GameEvent) -> u64 {
        self.bus.publish(event)
    }

    /// Apply consequences to story state and announce any trust change.
    pub fn apply_consequences(
        &mut self,
        character: Character,
        consequences: &Consequences,
    ) -> ConsequenceReceipt {
        let receipt = self.story.apply_consequences(character, consequences);
        if receipt.trust_changed() {
            self.bus
                .publish(GameEvent::TrustScoreUpdated(TrustUpdate::from(&receipt)));
        }
        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_see_events_in_order() {
        let mut bus = EventBus::new(8);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = bus.subscribe(move |env| sink.borrow_mut().push(env.seq));
        bus.publish(GameEvent::TimerExpired {
            timer_id: "a".into(),
        });
        bus.publish(GameEvent::MechanicDeactivated {
            kind: MechanicKind::Puzzle,
        });
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(GameEvent::TimerExpired {
            timer_id: "b".into(),
        });
        assert_eq!(seen.borrow().as_slice(), [0, 1]);
        assert_eq!(bus.published(), 3);
    }

    #[test]
    fn history_is_bounded() {
        let mut bus = EventBus::new(2);
        for i in 0..5 {
            bus.publish(GameEvent::TimerExpired {
                timer_id: format!("t{i}"),
            });
        }
        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].seq, 3);
        assert_eq!(bus.history().count(), 0);
    }

    #[test]
    fn serializes_with_host_event_names() {
        let event = GameEvent::TimerExpired {
            timer_id: "rt_1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "timerExpired");
        assert_eq!(json["detail"]["timer_id"], "rt_1");
    }

    #[test]
    fn trust_update_only_published_on_change() {
        let mut story = StoryState::new();
        let mut bus = EventBus::new(8);
        let mut env = EngineEnv::new(&mut story, &mut bus);
        let mut deltas = Consequences::new();
        deltas.insert("security_awareness".into(), 1);
        env.apply_consequences(Character::Maya, &deltas);
        deltas.insert("trust_score".into(), 5);
        env.apply_consequences(Character::Maya, &deltas);
        assert_eq!(bus.count_named("trustScoreUpdated"), 1);
    }
}
