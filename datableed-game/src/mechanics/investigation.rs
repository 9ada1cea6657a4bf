//! Evidence-board investigations.
//!
//! Each board belongs to one character and area. Applying the right tool to
//! a target reveals its evidence; once enough red flags are revealed the
//! investigation completes.

use super::{
    GradeFeedback, Mechanic, MechanicContext, MechanicError, MechanicKind, MechanicOutcome, grade,
};
use crate::character::Character;
use crate::config::TierThresholds;
use crate::content::ContentError;
use crate::events::EngineEnv;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_INVESTIGATION_DATA: &str = include_str!("../../assets/data/investigations.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationTool {
    ProfileAnalyzer,
    ReverseImageSearch,
    LinkScanner,
    MetadataViewer,
    TransactionTracer,
    CallerLookup,
}

impl InvestigationTool {
    pub const ALL: [Self; 6] = [
        Self::ProfileAnalyzer,
        Self::ReverseImageSearch,
        Self::LinkScanner,
        Self::MetadataViewer,
        Self::TransactionTracer,
        Self::CallerLookup,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::ProfileAnalyzer => "profile_analyzer",
            Self::ReverseImageSearch => "reverse_image_search",
            Self::LinkScanner => "link_scanner",
            Self::MetadataViewer => "metadata_viewer",
            Self::TransactionTracer => "transaction_tracer",
            Self::CallerLookup => "caller_lookup",
        }
    }
}

impl fmt::Display for InvestigationTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown investigation tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for InvestigationTool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.id() == needle)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub target: String,
    pub tool: InvestigationTool,
    pub description: String,
    #[serde(default)]
    pub red_flag: bool,
    #[serde(default)]
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBoard {
    pub id: String,
    pub character: Character,
    pub area: String,
    pub title: String,
    #[serde(default)]
    pub briefing: String,
    pub required_flags: usize,
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub feedback: GradeFeedback,
}

impl EvidenceBoard {
    #[must_use]
    pub fn targets(&self) -> BTreeSet<&str> {
        self.evidence.iter().map(|e| e.target.as_str()).collect()
    }

    #[must_use]
    pub fn red_flag_count(&self) -> usize {
        self.evidence.iter().filter(|e| e.red_flag).count()
    }

    fn max_score(&self) -> u32 {
        self.evidence
            .iter()
            .filter(|e| e.red_flag)
            .map(|e| e.points)
            .sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InvestigationFile {
    #[serde(default)]
    boards: Vec<EvidenceBoard>,
}

#[derive(Debug, Clone, Default)]
pub struct InvestigationLibrary {
    boards: BTreeMap<(Character, String), EvidenceBoard>,
}

impl InvestigationLibrary {
    /// # Errors
    ///
    /// Returns an error for malformed JSON, duplicate boards per area, or
    /// boards whose completion threshold cannot be met.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: InvestigationFile = serde_json::from_str(json)?;
        let mut boards = BTreeMap::new();
        for board in file.boards {
            if board.evidence.is_empty() || board.required_flags == 0 {
                return Err(ContentError::EmptyScenario(board.id));
            }
            if board.required_flags > board.red_flag_count() {
                return Err(ContentError::DanglingReference {
                    kind: "board",
                    id: board.id.clone(),
                    target: "red flag count",
                    reference: board.required_flags.to_string(),
                });
            }
            let key = (board.character, board.area.clone());
            if boards.contains_key(&key) {
                return Err(ContentError::Duplicate(board.id));
            }
            boards.insert(key, board);
        }
        Ok(Self { boards })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_INVESTIGATION_DATA)
    }

    #[must_use]
    pub fn board(&self, character: Character, area: &str) -> Option<&EvidenceBoard> {
        self.boards.get(&(character, area.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}

#[derive(Debug, Clone)]
struct InvestigationRun {
    board: EvidenceBoard,
    revealed: BTreeSet<String>,
    tool_uses: u32,
}

impl InvestigationRun {
    fn red_flags_found(&self) -> usize {
        self.board
            .evidence
            .iter()
            .filter(|e| e.red_flag && self.revealed.contains(&e.id))
            .count()
    }

    fn score(&self) -> u32 {
        self.board
            .evidence
            .iter()
            .filter(|e| e.red_flag && self.revealed.contains(&e.id))
            .map(|e| e.points)
            .sum()
    }
}

/// Result of one tool use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolReport {
    pub tool: InvestigationTool,
    pub target: String,
    pub finding: Option<Evidence>,
    pub red_flags_found: usize,
    pub required_flags: usize,
    pub outcome: Option<MechanicOutcome>,
}

#[derive(Debug)]
pub struct InvestigationMechanic {
    library: InvestigationLibrary,
    tiers: TierThresholds,
    run: Option<InvestigationRun>,
}

impl InvestigationMechanic {
    #[must_use]
    pub const fn new(library: InvestigationLibrary, tiers: TierThresholds) -> Self {
        Self {
            library,
            tiers,
            run: None,
        }
    }

    #[must_use]
    pub fn board(&self) -> Option<&EvidenceBoard> {
        self.run.as_ref().map(|run| &run.board)
    }

    #[must_use]
    pub fn revealed(&self) -> Vec<&Evidence> {
        self.run.as_ref().map_or_else(Vec::new, |run| {
            run.board
                .evidence
                .iter()
                .filter(|e| run.revealed.contains(&e.id))
                .collect()
        })
    }

    /// Apply `tool` to `target` on the active board.
    ///
    /// # Errors
    ///
    /// Fails when no board is open or the board has nothing named `target`.
    pub fn use_tool(
        &mut self,
        tool: InvestigationTool,
        target: &str,
    ) -> Result<ToolReport, MechanicError> {
        let run = self
            .run
            .as_mut()
            .ok_or(MechanicError::NotActive(MechanicKind::Investigation))?;
        if !run.board.evidence.iter().any(|e| e.target == target) {
            return Err(MechanicError::UnknownTarget {
                board: run.board.id.clone(),
                target: target.to_string(),
            });
        }
        run.tool_uses += 1;
        let finding = run
            .board
            .evidence
            .iter()
            .find(|e| e.target == target && e.tool == tool && !run.revealed.contains(&e.id))
            .cloned();
        if let Some(evidence) = &finding {
            log::debug!("{tool} revealed {} on {}", evidence.id, run.board.id);
            run.revealed.insert(evidence.id.clone());
        }
        let red_flags_found = run.red_flags_found();
        let required_flags = run.board.required_flags;
        let outcome = (red_flags_found >= required_flags).then(|| {
            grade(
                MechanicKind::Investigation,
                run.board.character,
                &run.board.id,
                run.score(),
                run.board.max_score(),
                &self.tiers,
                &run.board.feedback,
            )
        });
        Ok(ToolReport {
            tool,
            target: target.to_string(),
            finding,
            red_flags_found,
            required_flags,
            outcome,
        })
    }
}

impl Mechanic for InvestigationMechanic {
    fn kind(&self) -> MechanicKind {
        MechanicKind::Investigation
    }

    fn activate(
        &mut self,
        ctx: &MechanicContext,
        _env: &mut EngineEnv<'_>,
    ) -> Result<(), MechanicError> {
        let board = self
            .library
            .board(ctx.character, &ctx.area)
            .cloned()
            .ok_or_else(|| MechanicError::UnknownContent {
                kind: MechanicKind::Investigation,
                id: format!("{}/{}", ctx.character, ctx.area),
            })?;
        self.run = Some(InvestigationRun {
            board,
            revealed: BTreeSet::new(),
            tool_uses: 0,
        });
        Ok(())
    }

    fn deactivate(&mut self, _env: &mut EngineEnv<'_>) {
        if let Some(run) = self.run.take() {
            log::debug!(
                "investigation {} closed after {} tool use(s)",
                run.board.id,
                run.tool_uses
            );
        }
    }

    fn is_active(&self) -> bool {
        self.run.is_some()
    }
}
