//! Playable characters and their storylines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Character {
    Maya,
    Eli,
    Stanley,
}

/// Awareness theme a character's storyline teaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storyline {
    DatingSafety,
    GamingSecurity,
    ElderFraud,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown character '{0}'")]
pub struct UnknownCharacter(pub String);

impl Character {
    pub const ALL: [Self; 3] = [Self::Maya, Self::Eli, Self::Stanley];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Maya => "maya",
            Self::Eli => "eli",
            Self::Stanley => "stanley",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Maya => "Maya",
            Self::Eli => "Eli",
            Self::Stanley => "Stanley",
        }
    }

    #[must_use]
    pub const fn storyline(self) -> Storyline {
        match self {
            Self::Maya => Storyline::DatingSafety,
            Self::Eli => Storyline::GamingSecurity,
            Self::Stanley => Storyline::ElderFraud,
        }
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Character {
    type Err = UnknownCharacter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.id() == needle)
            .ok_or_else(|| UnknownCharacter(s.to_string()))
    }
}
