//! Character chat.
//!
//! The client side posts `{message, character, sessionId}` to `/api/chat` and
//! expects `{reply, persona, trust_score}` back. Transport failures never
//! surface as errors: they become a canned in-character line, with no retry.
//!
//! The crate ships only [`InProcessTransport`]. Hosts that talk to a remote
//! backend supply their own HTTP [`ChatTransport`] and report
//! [`TransportError::Timeout`] and [`TransportError::Network`] from it.

pub mod backend;

pub use backend::{
    CharacterConfig, CharacterConfigs, ChatBackend, ChatOutcome, ChatSession, GeneratorError,
    InProcessTransport, ReplyGenerator,
};

use crate::character::Character;
use crate::constants::{
    CHAT_DEFAULT_SESSION_ID, CHAT_LOCAL_BASE_URL, CHAT_MAX_MESSAGE_CHARS, CHAT_PATH,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub character: String,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Voice the reply was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Deceiver,
    Guardian,
}

impl Persona {
    /// Non-negative trust keeps the deceiver talking.
    #[must_use]
    pub const fn for_trust(trust_score: i32) -> Self {
        if trust_score >= 0 {
            Self::Deceiver
        } else {
            Self::Guardian
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deceiver => "deceiver",
            Self::Guardian => "guardian",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub persona: Persona,
    pub trust_score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ChatOutcome>,
}

impl ChatResponse {
    /// Reply used when the backend hits an unexpected failure.
    #[must_use]
    pub fn technical_difficulties(request_id: Option<String>) -> Self {
        Self {
            reply: "⚠️ I'm experiencing technical difficulties right now. Please try again in a moment."
                .to_string(),
            persona: Persona::Guardian,
            trust_score: 0,
            request_id,
            error: Some("Technical difficulties".to_string()),
            outcome: None,
        }
    }
}

/// Where the chat backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Explicit base URL; wins over the hostname.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Hostname the game was served from.
    #[serde(default)]
    pub hostname: String,
}

impl ChatConfig {
    #[must_use]
    pub fn for_hostname(hostname: impl Into<String>) -> Self {
        Self {
            base_url: None,
            hostname: hostname.into(),
        }
    }

    #[must_use]
    pub fn resolve_base_url(&self) -> String {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => base_url_for_hostname(&self.hostname),
        }
    }
}

/// Local hosts talk to the development server; anything else is assumed to
/// serve the API itself over HTTPS.
#[must_use]
pub fn base_url_for_hostname(hostname: &str) -> String {
    match hostname.trim() {
        "" | "localhost" | "127.0.0.1" => CHAT_LOCAL_BASE_URL.to_string(),
        host => format!("https://{host}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network failure: {0}")]
    Network(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

/// Moves one chat request to a backend and back.
///
/// Implemented here by [`InProcessTransport`]; network transports belong to
/// the host.
#[async_trait(?Send)]
pub trait ChatTransport {
    /// # Errors
    ///
    /// Returns the failure subtype when no usable response arrives.
    async fn post_chat(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("character is required")]
    CharacterRequired,
    #[error("unknown character '{character}'. Available characters: {available}")]
    UnknownCharacter { character: String, available: String },
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message too long ({length} characters, max {max})")]
    MessageTooLong { length: usize, max: usize },
    #[error("invalid session id")]
    InvalidSessionId,
}

/// Check the message the same way the backend will.
///
/// # Errors
///
/// Fails for blank or oversized messages.
pub fn validate_message(message: &str) -> Result<&str, ChatError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    let length = trimmed.chars().count();
    if length > CHAT_MAX_MESSAGE_CHARS {
        return Err(ChatError::MessageTooLong {
            length,
            max: CHAT_MAX_MESSAGE_CHARS,
        });
    }
    Ok(trimmed)
}

/// What the player sees after sending a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub persona: Option<Persona>,
    pub trust_score: Option<i32>,
    /// Set when the text is a canned line standing in for a failed request.
    pub failure: Option<TransportError>,
}

impl ChatReply {
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

impl From<ChatResponse> for ChatReply {
    fn from(response: ChatResponse) -> Self {
        Self {
            text: response.reply,
            persona: Some(response.persona),
            trust_score: Some(response.trust_score),
            failure: None,
        }
    }
}

/// In-character line for a failed request.
#[must_use]
pub fn canned_failure(character: Character, error: &TransportError) -> &'static str {
    match (character, error) {
        (Character::Maya, TransportError::Timeout) => {
            "Maya: Sorry, this is taking forever to load. Try me again in a second?"
        }
        (Character::Maya, TransportError::Network(_)) => {
            "Maya: I think my signal dropped. Can you resend that?"
        }
        (Character::Maya, TransportError::Status(_)) => {
            "Maya: The app is acting weird on my end. Give it a minute?"
        }
        (Character::Maya, TransportError::Decode(_)) => {
            "Maya: Your message came through garbled. Mind trying again?"
        }
        (Character::Eli, TransportError::Timeout) => {
            "Eli: Lag spike. Hit me again in a sec."
        }
        (Character::Eli, TransportError::Network(_)) => {
            "Eli: Connection dropped, classic. Resend?"
        }
        (Character::Eli, TransportError::Status(_)) => {
            "Eli: Server's throwing errors. Something's up on the backend."
        }
        (Character::Eli, TransportError::Decode(_)) => {
            "Eli: Got a bunch of junk packets instead of your message. Try that again."
        }
        (Character::Stanley, TransportError::Timeout) => {
            "Stanley: This tablet is thinking very hard. Let's try once more in a moment."
        }
        (Character::Stanley, TransportError::Network(_)) => {
            "Stanley: I believe the internet went out again. Could you say that once more?"
        }
        (Character::Stanley, TransportError::Status(_)) => {
            "Stanley: The screen says something went wrong. I'll wait a minute and try again."
        }
        (Character::Stanley, TransportError::Decode(_)) => {
            "Stanley: Your words came through all jumbled on my end. Please try again."
        }
    }
}

/// Chat client bound to one character and session.
#[derive(Debug)]
pub struct ChatClient<T> {
    transport: T,
    base_url: String,
    character: Character,
    session_id: String,
}

impl<T: ChatTransport> ChatClient<T> {
    #[must_use]
    pub fn new(transport: T, config: &ChatConfig, character: Character) -> Self {
        Self {
            transport,
            base_url: config.resolve_base_url(),
            character,
            session_id: CHAT_DEFAULT_SESSION_ID.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}{CHAT_PATH}", self.base_url)
    }

    #[must_use]
    pub const fn character(&self) -> Character {
        self.character
    }

    pub fn set_character(&mut self, character: Character) {
        self.character = character;
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one message. Transport failures come back as a canned reply.
    ///
    /// # Errors
    ///
    /// Only local validation fails: blank or oversized messages never leave
    /// the client.
    pub async fn send(&self, message: &str) -> Result<ChatReply, ChatError> {
        let message = validate_message(message)?;
        let request = ChatRequest {
            message: message.to_string(),
            character: self.character.id().to_string(),
            session_id: Some(self.session_id.clone()),
        };
        let url = self.endpoint();
        match self.transport.post_chat(&url, &request).await {
            Ok(response) => Ok(response.into()),
            Err(err) => {
                log::warn!("chat request for {} failed: {err}", self.character);
                Ok(ChatReply {
                    text: canned_failure(self.character, &err).to_string(),
                    persona: None,
                    trust_score: None,
                    failure: Some(err),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Failing(TransportError);

    #[async_trait(?Send)]
    impl ChatTransport for Failing {
        async fn post_chat(
            &self,
            _url: &str,
            _request: &ChatRequest,
        ) -> Result<ChatResponse, TransportError> {
            Err(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: RefCell<Vec<(String, String)>>,
    }

    #[async_trait(?Send)]
    impl ChatTransport for Recording {
        async fn post_chat(
            &self,
            url: &str,
            request: &ChatRequest,
        ) -> Result<ChatResponse, TransportError> {
            let body = serde_json::to_string(request).map_err(|e| TransportError::Decode(e.to_string()))?;
            self.seen.borrow_mut().push((url.to_string(), body));
            Ok(ChatResponse {
                reply: "ok".into(),
                persona: Persona::Deceiver,
                trust_score: 20,
                request_id: None,
                error: None,
                outcome: None,
            })
        }
    }

    #[test]
    fn hostnames_resolve_to_base_urls() {
        assert_eq!(base_url_for_hostname(""), "http://127.0.0.1:8000");
        assert_eq!(base_url_for_hostname("localhost"), "http://127.0.0.1:8000");
        assert_eq!(base_url_for_hostname("127.0.0.1"), "http://127.0.0.1:8000");
        assert_eq!(
            base_url_for_hostname("datableed.example.org"),
            "https://datableed.example.org"
        );
        let injected = ChatConfig {
            base_url: Some("https://api.example.org/".into()),
            hostname: "localhost".into(),
        };
        assert_eq!(injected.resolve_base_url(), "https://api.example.org");
    }

    #[test]
    fn persona_flips_below_zero() {
        assert_eq!(Persona::for_trust(0), Persona::Deceiver);
        assert_eq!(Persona::for_trust(-20), Persona::Guardian);
    }

    #[tokio::test]
    async fn request_uses_wire_field_names() {
        let client = ChatClient::new(
            Recording::default(),
            &ChatConfig::for_hostname("localhost"),
            Character::Eli,
        )
        .with_session_id("abc");
        let reply = client.send("  hello  ").await.unwrap();
        assert_eq!(reply.trust_score, Some(20));
        let seen = client.transport().seen.borrow();
        assert_eq!(seen[0].0, "http://127.0.0.1:8000/api/chat");
        assert_eq!(
            seen[0].1,
            r#"{"message":"hello","character":"eli","sessionId":"abc"}"#
        );
    }

    #[tokio::test]
    async fn failures_become_in_character_lines() {
        for err in [
            TransportError::Timeout,
            TransportError::Network("reset".into()),
            TransportError::Status(502),
            TransportError::Decode("eof".into()),
        ] {
            let client = ChatClient::new(
                Failing(err.clone()),
                &ChatConfig::default(),
                Character::Stanley,
            );
            let reply = client.send("help").await.unwrap();
            assert!(reply.is_fallback());
            assert!(reply.text.starts_with("Stanley:"));
            assert_eq!(reply.failure, Some(err));
        }
    }

    #[tokio::test]
    async fn blank_messages_never_leave_the_client() {
        let client = ChatClient::new(Recording::default(), &ChatConfig::default(), Character::Maya);
        assert_eq!(client.send("   ").await, Err(ChatError::EmptyMessage));
        let long = "x".repeat(1001);
        assert!(matches!(
            client.send(&long).await,
            Err(ChatError::MessageTooLong { length: 1001, .. })
        ));
        assert!(client.transport().seen.borrow().is_empty());
    }
}
