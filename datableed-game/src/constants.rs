//! Centralized tuning constants for Data_Bleed game logic.
//!
//! Defaults for [`crate::config::EngineConfig`] live here so that scoring
//! math can only change through reviewed code.

// Timing -------------------------------------------------------------------
pub(crate) const TIMER_TICK_MS: u64 = 100;
pub(crate) const OPTIMAL_WINDOW_FRACTION: f64 = 0.6;
pub(crate) const TIME_LIMIT_LOW_SECS: u32 = 30;
pub(crate) const TIME_LIMIT_MEDIUM_SECS: u32 = 20;
pub(crate) const TIME_LIMIT_HIGH_SECS: u32 = 15;
pub(crate) const TIME_LIMIT_CRITICAL_SECS: u32 = 10;

// Scoring ------------------------------------------------------------------
pub(crate) const TIMEOUT_PENALTY: i32 = -2;
pub(crate) const TIER_EXCELLENT_MIN: f64 = 0.8;
pub(crate) const TIER_GOOD_MIN: f64 = 0.6;
pub(crate) const TIER_FAIR_MIN: f64 = 0.4;

// Story state --------------------------------------------------------------
pub(crate) const TRUST_SCORE_START: i32 = 50;
pub(crate) const TRUST_SCORE_MIN: i32 = 0;
pub(crate) const TRUST_SCORE_MAX: i32 = 100;
pub(crate) const MAX_DECISION_LOG: usize = 256;

// Consequence keys ---------------------------------------------------------
pub const KEY_TRUST_SCORE: &str = "trust_score";
pub const KEY_TIMEOUT_PENALTY: &str = "timeout_penalty";
pub(crate) const TIMEOUT_DECISION_ID: &str = "timeout";

// Event bus / routing ------------------------------------------------------
pub(crate) const EVENT_HISTORY_CAPACITY: usize = 512;
pub(crate) const ROUTE_HISTORY_CAPACITY: usize = 64;

// Chat ---------------------------------------------------------------------
pub(crate) const CHAT_PATH: &str = "/api/chat";
pub(crate) const CHAT_LOCAL_BASE_URL: &str = "http://127.0.0.1:8000";
pub(crate) const CHAT_MAX_MESSAGE_CHARS: usize = 1000;
pub(crate) const CHAT_MAX_SESSION_ID_CHARS: usize = 100;
pub(crate) const CHAT_DEFAULT_SESSION_ID: &str = "default";
pub(crate) const CHAT_TRUST_STEP: i32 = 20;
pub(crate) const CHAT_LOGO_STAGE_MAX: u8 = 5;
pub(crate) const CHAT_WARN_AFTER: u32 = 2;
pub(crate) const CHAT_FAIL_AFTER: u32 = 4;

// Session storage keys -----------------------------------------------------
pub const STORAGE_KEY_CHARACTER: &str = "character";
pub const STORAGE_KEY_CURRENT_MODE: &str = "currentMode";
pub const STORAGE_KEY_3D_MODE: &str = "3DModeActive";
pub const STORAGE_KEY_PROGRESS: &str = "dataBleed.progress";
