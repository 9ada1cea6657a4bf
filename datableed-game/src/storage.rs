//! Session storage.
//!
//! Mirrors a browser `sessionStorage`: flat string keys and string values.
//! `character`, `currentMode` and `3DModeActive` are plain strings; progress
//! snapshots are JSON under `dataBleed.progress`.

use crate::character::Character;
use crate::constants::{
    STORAGE_KEY_3D_MODE, STORAGE_KEY_CHARACTER, STORAGE_KEY_CURRENT_MODE, STORAGE_KEY_PROGRESS,
};
use crate::mechanics::MechanicKind;
use crate::story::StoryState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

/// Key/value session store.
pub trait SessionStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), Self::Error>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    items: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }
}

impl SessionStore for MemorySessionStore {
    type Error = Infallible;

    fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), Self::Error> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session store failure: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid value '{value}' for key '{key}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("stored progress is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("progress could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Value of the `currentMode` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Story,
    Investigation,
    Realtime,
    Puzzle,
    Action,
}

impl GameMode {
    pub const ALL: [Self; 5] = [
        Self::Story,
        Self::Investigation,
        Self::Realtime,
        Self::Puzzle,
        Self::Action,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Investigation => "investigation",
            Self::Realtime => "realtime",
            Self::Puzzle => "puzzle",
            Self::Action => "action",
        }
    }
}

impl From<MechanicKind> for GameMode {
    fn from(kind: MechanicKind) -> Self {
        match kind {
            MechanicKind::Investigation => Self::Investigation,
            MechanicKind::Realtime => Self::Realtime,
            MechanicKind::Puzzle => Self::Puzzle,
            MechanicKind::Action => Self::Action,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| StorageError::InvalidValue {
                key: STORAGE_KEY_CURRENT_MODE,
                value: s.to_string(),
            })
    }
}

/// Typed view of the plain session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionPrefs {
    pub character: Option<Character>,
    pub current_mode: Option<GameMode>,
    pub three_d_mode: bool,
}

impl SessionPrefs {
    /// Read the plain keys. Missing keys read as defaults.
    ///
    /// # Errors
    ///
    /// Fails on backend errors or values that do not parse.
    pub fn load<S: SessionStore>(store: &S) -> Result<Self, StorageError> {
        let character = store
            .get_item(STORAGE_KEY_CHARACTER)
            .map_err(StorageError::backend)?
            .map(|raw| {
                raw.parse::<Character>()
                    .map_err(|_| StorageError::InvalidValue {
                        key: STORAGE_KEY_CHARACTER,
                        value: raw,
                    })
            })
            .transpose()?;
        let current_mode = store
            .get_item(STORAGE_KEY_CURRENT_MODE)
            .map_err(StorageError::backend)?
            .map(|raw| raw.parse::<GameMode>())
            .transpose()?;
        let three_d_mode = match store
            .get_item(STORAGE_KEY_3D_MODE)
            .map_err(StorageError::backend)?
            .as_deref()
        {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(StorageError::InvalidValue {
                    key: STORAGE_KEY_3D_MODE,
                    value: other.to_string(),
                });
            }
        };
        Ok(Self {
            character,
            current_mode,
            three_d_mode,
        })
    }

    /// Write every key; unset options remove their key.
    ///
    /// # Errors
    ///
    /// Fails on backend errors.
    pub fn save<S: SessionStore>(&self, store: &S) -> Result<(), StorageError> {
        match self.character {
            Some(character) => store.set_item(STORAGE_KEY_CHARACTER, character.id()),
            None => store.remove_item(STORAGE_KEY_CHARACTER),
        }
        .map_err(StorageError::backend)?;
        match self.current_mode {
            Some(mode) => store.set_item(STORAGE_KEY_CURRENT_MODE, mode.as_str()),
            None => store.remove_item(STORAGE_KEY_CURRENT_MODE),
        }
        .map_err(StorageError::backend)?;
        store
            .set_item(
                STORAGE_KEY_3D_MODE,
                if self.three_d_mode { "true" } else { "false" },
            )
            .map_err(StorageError::backend)
    }
}

/// Saved story progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub saved_at: DateTime<Utc>,
    pub story: StoryState,
    #[serde(default)]
    pub positions: BTreeMap<Character, String>,
}

/// # Errors
///
/// Fails on encoding or backend errors.
pub fn save_progress<S: SessionStore>(
    store: &S,
    snapshot: &ProgressSnapshot,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(snapshot).map_err(StorageError::Encode)?;
    store
        .set_item(STORAGE_KEY_PROGRESS, &json)
        .map_err(StorageError::backend)
}

/// # Errors
///
/// Fails on backend errors or a snapshot that does not decode.
pub fn load_progress<S: SessionStore>(store: &S) -> Result<Option<ProgressSnapshot>, StorageError> {
    store
        .get_item(STORAGE_KEY_PROGRESS)
        .map_err(StorageError::backend)?
        .map(|json| serde_json::from_str(&json).map_err(StorageError::Decode))
        .transpose()
}

/// # Errors
///
/// Fails on backend errors.
pub fn clear_progress<S: SessionStore>(store: &S) -> Result<(), StorageError> {
    store
        .remove_item(STORAGE_KEY_PROGRESS)
        .map_err(StorageError::backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threats::Consequences;

    #[test]
    fn prefs_use_plain_string_keys() {
        let store = MemorySessionStore::new();
        let prefs = SessionPrefs {
            character: Some(Character::Stanley),
            current_mode: Some(GameMode::Realtime),
            three_d_mode: true,
        };
        prefs.save(&store).unwrap();
        assert_eq!(store.get_item("character").unwrap().as_deref(), Some("stanley"));
        assert_eq!(store.get_item("currentMode").unwrap().as_deref(), Some("realtime"));
        assert_eq!(store.get_item("3DModeActive").unwrap().as_deref(), Some("true"));
        assert_eq!(SessionPrefs::load(&store).unwrap(), prefs);

        SessionPrefs::default().save(&store).unwrap();
        assert_eq!(store.get_item("character").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn bad_values_are_reported_with_their_key() {
        let store = MemorySessionStore::new();
        store.set_item("3DModeActive", "yes").unwrap();
        let err = SessionPrefs::load(&store).unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidValue {
                key: "3DModeActive",
                ..
            }
        ));
    }

    #[test]
    fn progress_round_trips_through_the_store() {
        let store = MemorySessionStore::new();
        let mut story = StoryState::new();
        let mut deltas = Consequences::new();
        deltas.insert("trust_score".into(), 7);
        story.apply_consequences(Character::Maya, &deltas);
        let snapshot = ProgressSnapshot {
            saved_at: Utc::now(),
            story,
            positions: BTreeMap::from([(Character::Maya, "maya_new_match".to_string())]),
        };
        save_progress(&store, &snapshot).unwrap();
        assert_eq!(load_progress(&store).unwrap(), Some(snapshot));
        clear_progress(&store).unwrap();
        assert_eq!(load_progress(&store).unwrap(), None);
    }

    #[test]
    fn corrupt_progress_is_a_decode_error() {
        let store = MemorySessionStore::new();
        store.set_item("dataBleed.progress", "{not json").unwrap();
        assert!(matches!(load_progress(&store), Err(StorageError::Decode(_))));
    }
}
