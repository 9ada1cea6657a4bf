//! In-process chat backend.
//!
//! Validates requests, keeps per-session trust, picks a persona, assembles
//! the system prompt and asks a [`ReplyGenerator`] for the reply. Generator
//! failures fall back to canned per-character lines; with no generator the
//! backend runs in demo mode.

use super::{
    ChatError, ChatRequest, ChatResponse, ChatTransport, Persona, TransportError,
    validate_message,
};
use crate::constants::{
    CHAT_DEFAULT_SESSION_ID, CHAT_FAIL_AFTER, CHAT_LOGO_STAGE_MAX, CHAT_MAX_SESSION_ID_CHARS,
    CHAT_PATH, CHAT_TRUST_STEP, CHAT_WARN_AFTER,
};
use crate::content::ContentError;
use crate::seed::short_id;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

const DEFAULT_CHARACTER_DATA: &str = include_str!("../../assets/data/characters.json");

pub const GUARDIAN_PROMPT: &str =
    "You are a calm, empathetic guide. Your goal is to help the player spot red flags and stay safe.";
pub const DECEIVER_PROMPT: &str = "You are manipulative, deceptive, and persuasive. Your goal is to lure the player into making risky decisions.";
const GUARDRAILS: &str =
    "Stay strictly in-character. Be concise. Your goal is to advance the narrative of the Data_Bleed game.";

const FALLBACK_EXCERPT_CHARS: usize = 30;
const DEMO_EXCERPT_CHARS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRules {
    #[serde(default)]
    pub success_keywords: Vec<String>,
    #[serde(default)]
    pub fail_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "Thresholds::default_warn_after")]
    pub warn_after: u32,
    #[serde(default = "Thresholds::default_fail_after")]
    pub fail_after: u32,
}

impl Thresholds {
    const fn default_warn_after() -> u32 {
        CHAT_WARN_AFTER
    }

    const fn default_fail_after() -> u32 {
        CHAT_FAIL_AFTER
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_after: CHAT_WARN_AFTER,
            fail_after: CHAT_FAIL_AFTER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub q: String,
    pub a: String,
}

/// Canned lines; `{excerpt}` is replaced with the start of the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackLines {
    pub rate_limit: String,
    pub connection: String,
    pub invalid_request: String,
    pub generic: String,
    pub demo: String,
}

/// Case-insensitive "contains any of" over a keyword list.
#[derive(Debug, Clone, Default)]
struct KeywordMatcher {
    pattern: Option<Regex>,
}

impl KeywordMatcher {
    fn compile(keywords: &[String]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self::default());
        }
        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub display_name: String,
    #[serde(default)]
    pub lore: String,
    #[serde(default)]
    pub intent_rules: IntentRules,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,
    pub fallbacks: FallbackLines,
    #[serde(skip)]
    success: KeywordMatcher,
    #[serde(skip)]
    fail: KeywordMatcher,
}

impl CharacterConfig {
    fn compile(&mut self) -> Result<(), regex::Error> {
        self.success = KeywordMatcher::compile(&self.intent_rules.success_keywords)?;
        self.fail = KeywordMatcher::compile(&self.intent_rules.fail_keywords)?;
        Ok(())
    }

    #[must_use]
    pub fn is_success(&self, message: &str) -> bool {
        self.success.matches(message)
    }

    #[must_use]
    pub fn is_fail(&self, message: &str) -> bool {
        self.fail.matches(message)
    }

    /// First knowledge answer whose question appears in the message.
    #[must_use]
    pub fn answer_for(&self, message: &str) -> Option<&str> {
        let needle = message.trim().to_lowercase();
        self.knowledge
            .iter()
            .find(|entry| {
                let q = entry.q.to_lowercase();
                !q.is_empty() && needle.contains(&q)
            })
            .map(|entry| entry.a.as_str())
    }

    /// `{base}\n\nGame Lore Context:\n{lore}\n\nRules:\n{guardrails}`
    #[must_use]
    pub fn system_prompt(&self, persona: Persona) -> String {
        let base = match persona {
            Persona::Deceiver => DECEIVER_PROMPT,
            Persona::Guardian => GUARDIAN_PROMPT,
        };
        format!(
            "{base}\n\nGame Lore Context:\n{}\n\nRules:\n{GUARDRAILS}",
            self.lore
        )
    }

    fn fallback_line(&self, error: &GeneratorError, message: &str) -> String {
        let template = match error {
            GeneratorError::RateLimited => &self.fallbacks.rate_limit,
            GeneratorError::Connection(_) => &self.fallbacks.connection,
            GeneratorError::InvalidRequest(_) => &self.fallbacks.invalid_request,
            GeneratorError::Other(_) => &self.fallbacks.generic,
        };
        render(template, message, FALLBACK_EXCERPT_CHARS)
    }

    fn demo_line(&self, message: &str) -> String {
        render(&self.fallbacks.demo, message, DEMO_EXCERPT_CHARS)
    }
}

fn render(template: &str, message: &str, excerpt_chars: usize) -> String {
    let excerpt: String = message.chars().take(excerpt_chars).collect();
    template.replace("{excerpt}", &excerpt)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CharacterFile {
    #[serde(default)]
    global_knowledge: BTreeMap<String, String>,
    #[serde(default)]
    characters: BTreeMap<String, CharacterConfig>,
}

/// Chat configuration for every character, keyed by lowercase id.
#[derive(Debug, Clone, Default)]
pub struct CharacterConfigs {
    global_knowledge: BTreeMap<String, String>,
    characters: BTreeMap<String, CharacterConfig>,
}

impl CharacterConfigs {
    /// # Errors
    ///
    /// Returns an error for malformed JSON or keyword lists that do not
    /// compile.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let file: CharacterFile = serde_json::from_str(json)?;
        let mut characters = BTreeMap::new();
        for (id, mut config) in file.characters {
            config.compile()?;
            characters.insert(id.trim().to_lowercase(), config);
        }
        Ok(Self {
            global_knowledge: file.global_knowledge,
            characters,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the bundled asset fails validation.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_json(DEFAULT_CHARACTER_DATA)
    }

    #[must_use]
    pub fn get(&self, character: &str) -> Option<&CharacterConfig> {
        self.characters.get(character)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.characters.keys().map(String::as_str)
    }

    /// Lore shared by every character, matched on key substrings.
    #[must_use]
    pub fn global_answer(&self, message: &str) -> Option<&str> {
        let needle = message.trim().to_lowercase();
        self.global_knowledge
            .iter()
            .find(|(key, _)| needle.contains(&key.to_lowercase()))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("rate limited")]
    RateLimited,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("generation failed: {0}")]
    Other(String),
}

impl GeneratorError {
    /// Bucket a provider error message the way fallback lines are chosen.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            Self::RateLimited
        } else if lower.contains("timeout") || lower.contains("connection") {
            Self::Connection(message.to_string())
        } else if lower.contains("invalid") || lower.contains("400") {
            Self::InvalidRequest(message.to_string())
        } else {
            Self::Other(message.to_string())
        }
    }
}

/// Produces in-character replies, typically by calling a language model.
#[async_trait(?Send)]
pub trait ReplyGenerator {
    /// # Errors
    ///
    /// Returns the failure category so the backend can pick a fallback line.
    async fn generate(
        &self,
        character: &str,
        system_prompt: &str,
        message: &str,
    ) -> Result<String, GeneratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatOutcome {
    Success,
    Fail,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub character: String,
    pub trust_score: i32,
    pub wrong_count: u32,
    /// 1..=5, how corrupted the character's logo looks.
    pub logo_stage: u8,
}

impl ChatSession {
    #[must_use]
    pub fn new(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            trust_score: 0,
            wrong_count: 0,
            logo_stage: 1,
        }
    }

    /// Success keywords lower trust, fail keywords raise it. Success wins
    /// when both appear.
    pub fn update_trust(&mut self, config: &CharacterConfig, message: &str) -> i32 {
        if config.is_success(message) {
            self.trust_score -= CHAT_TRUST_STEP;
        } else if config.is_fail(message) {
            self.trust_score += CHAT_TRUST_STEP;
        }
        self.trust_score
    }

    /// Judge the player's message and move the wrong count and logo stage.
    pub fn assess(
        &mut self,
        config: &CharacterConfig,
        message: &str,
        used_fallback: bool,
    ) -> ChatOutcome {
        let thresholds = config.thresholds;
        if config.is_success(message) {
            self.wrong_count = self.wrong_count.saturating_sub(1);
            self.logo_stage = 1;
            return ChatOutcome::Success;
        }
        if config.is_fail(message) {
            self.wrong_count += 1;
            self.logo_stage = (self.logo_stage + 1).min(CHAT_LOGO_STAGE_MAX);
            return if self.wrong_count >= thresholds.fail_after {
                ChatOutcome::Fail
            } else {
                ChatOutcome::Neutral
            };
        }
        if used_fallback {
            self.wrong_count += 1;
            if self.wrong_count >= thresholds.warn_after {
                self.logo_stage = (self.logo_stage + 1).min(CHAT_LOGO_STAGE_MAX);
            }
            if self.wrong_count >= thresholds.fail_after {
                return ChatOutcome::Fail;
            }
        }
        ChatOutcome::Neutral
    }
}

#[derive(Debug)]
struct ValidatedRequest<'r> {
    character: String,
    message: &'r str,
    session_id: &'r str,
}

pub struct ChatBackend {
    configs: CharacterConfigs,
    generator: Option<Rc<dyn ReplyGenerator>>,
    sessions: RefCell<BTreeMap<String, ChatSession>>,
    requests: Cell<u64>,
}

impl std::fmt::Debug for ChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBackend")
            .field("characters", &self.configs.len())
            .field("demo_mode", &self.is_demo_mode())
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl ChatBackend {
    #[must_use]
    pub fn new(configs: CharacterConfigs) -> Self {
        Self {
            configs,
            generator: None,
            sessions: RefCell::new(BTreeMap::new()),
            requests: Cell::new(0),
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Rc<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub const fn configs(&self) -> &CharacterConfigs {
        &self.configs
    }

    #[must_use]
    pub const fn is_demo_mode(&self) -> bool {
        self.generator.is_none()
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.sessions.borrow().get(session_id).cloned()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// Drop a session. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Rejects empty or oversized session ids.
    pub fn reset_session(&self, session_id: &str) -> Result<bool, ChatError> {
        if session_id.is_empty() || session_id.chars().count() > CHAT_MAX_SESSION_ID_CHARS {
            return Err(ChatError::InvalidSessionId);
        }
        let existed = self.sessions.borrow_mut().remove(session_id).is_some();
        log::info!("chat session {session_id} reset (existed: {existed})");
        Ok(existed)
    }

    fn validate<'r>(&self, request: &'r ChatRequest) -> Result<ValidatedRequest<'r>, ChatError> {
        let character = request.character.trim().to_lowercase();
        if character.is_empty() {
            return Err(ChatError::CharacterRequired);
        }
        if self.configs.get(&character).is_none() {
            return Err(ChatError::UnknownCharacter {
                character,
                available: self.configs.ids().collect::<Vec<_>>().join(", "),
            });
        }
        let message = validate_message(&request.message)?;
        let session_id = match request.session_id.as_deref() {
            None | Some("") => CHAT_DEFAULT_SESSION_ID,
            Some(id) if id.chars().count() > CHAT_MAX_SESSION_ID_CHARS => {
                return Err(ChatError::InvalidSessionId);
            }
            Some(id) => id,
        };
        Ok(ValidatedRequest {
            character,
            message,
            session_id,
        })
    }

    fn next_request_id(&self, session_id: &str) -> String {
        let n = self.requests.get() + 1;
        self.requests.set(n);
        short_id("req", &[session_id.as_bytes(), &n.to_le_bytes()])
    }

    /// Handle one chat turn.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] for requests that fail validation.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        let valid = self.validate(request)?;
        let request_id = self.next_request_id(valid.session_id);
        let Some(config) = self.configs.get(&valid.character) else {
            return Ok(ChatResponse::technical_difficulties(Some(request_id)));
        };
        log::info!(
            "chat {request_id}: character={} session={} length={}",
            valid.character,
            valid.session_id,
            valid.message.chars().count()
        );

        let trust_score = {
            let Ok(mut sessions) = self.sessions.try_borrow_mut() else {
                log::error!("chat {request_id}: session table busy");
                return Ok(ChatResponse::technical_difficulties(Some(request_id)));
            };
            let session = sessions
                .entry(valid.session_id.to_string())
                .or_insert_with(|| ChatSession::new(valid.character.clone()));
            if session.character != valid.character {
                *session = ChatSession::new(valid.character.clone());
            }
            session.update_trust(config, valid.message)
        };

        let persona = Persona::for_trust(trust_score);
        let prompt = config.system_prompt(persona);
        let (reply, used_fallback) = self
            .generate(&valid.character, config, &prompt, valid.message, &request_id)
            .await;

        let outcome = match self.sessions.try_borrow_mut() {
            Ok(mut sessions) => sessions
                .get_mut(valid.session_id)
                .map(|session| session.assess(config, valid.message, used_fallback)),
            Err(_) => None,
        };
        Ok(ChatResponse {
            reply,
            persona,
            trust_score,
            request_id: Some(request_id),
            error: None,
            outcome,
        })
    }

    async fn generate(
        &self,
        character: &str,
        config: &CharacterConfig,
        prompt: &str,
        message: &str,
        request_id: &str,
    ) -> (String, bool) {
        let Some(generator) = self.generator.clone() else {
            log::info!("chat {request_id}: demo mode");
            let reply = self
                .configs
                .global_answer(message)
                .or_else(|| config.answer_for(message))
                .map_or_else(|| config.demo_line(message), str::to_string);
            return (reply, false);
        };
        match generator.generate(character, prompt, message).await {
            Ok(reply) => (reply, false),
            Err(err) => {
                log::warn!("chat {request_id}: generator failed ({err}), using fallback");
                (config.fallback_line(&err, message), true)
            }
        }
    }
}

/// Serves `/api/chat` from a local [`ChatBackend`], passing requests and
/// responses through their JSON wire form.
#[derive(Debug, Clone)]
pub struct InProcessTransport {
    backend: Rc<ChatBackend>,
}

impl InProcessTransport {
    #[must_use]
    pub const fn new(backend: Rc<ChatBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &ChatBackend {
        &self.backend
    }
}

#[async_trait(?Send)]
impl ChatTransport for InProcessTransport {
    async fn post_chat(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, TransportError> {
        if !url.ends_with(CHAT_PATH) {
            return Err(TransportError::Status(404));
        }
        let body = serde_json::to_string(request).map_err(|e| TransportError::Decode(e.to_string()))?;
        let request: ChatRequest =
            serde_json::from_str(&body).map_err(|_| TransportError::Status(422))?;
        let response = self.backend.chat(&request).await.map_err(|err| {
            log::debug!("chat request rejected: {err}");
            TransportError::Status(400)
        })?;
        let body =
            serde_json::to_string(&response).map_err(|_| TransportError::Status(500))?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
