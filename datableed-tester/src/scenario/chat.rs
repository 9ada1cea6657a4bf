use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use colored::Colorize;
use datableed_game::chat::{
    CharacterConfig, CharacterConfigs, ChatBackend, ChatClient, ChatConfig, ChatError,
    GeneratorError, InProcessTransport, Persona, ReplyGenerator,
};
use datableed_game::{Character, TransportError};
use std::rc::Rc;

use super::{ChatCtx, ChatScenario, CombinedScenario};

fn config_for(configs: &CharacterConfigs, character: Character) -> Result<&CharacterConfig> {
    configs
        .get(character.id())
        .with_context(|| format!("no chat config for {character}"))
}

fn first_keyword(keywords: &[String], character: Character, kind: &str) -> Result<String> {
    keywords
        .first()
        .cloned()
        .with_context(|| format!("{character} has no {kind} keywords"))
}

fn client_for(
    backend: &Rc<ChatBackend>,
    character: Character,
) -> ChatClient<InProcessTransport> {
    ChatClient::new(
        InProcessTransport::new(backend.clone()),
        &ChatConfig::default(),
        character,
    )
    .with_session_id(format!("qa-{}", character.id()))
}

/// Fail keywords raise trust, success keywords lower it and flip the persona.
pub struct TrustProgression;

impl CombinedScenario for TrustProgression {
    fn description(&self) -> &'static str {
        "Chat trust and persona follow the player's intent"
    }

    fn as_chat_scenario(&self) -> Option<&dyn ChatScenario> {
        Some(self)
    }
}

#[async_trait(?Send)]
impl ChatScenario for TrustProgression {
    async fn run_chat(&self, ctx: &ChatCtx) -> Result<()> {
        let backend = Rc::new(ChatBackend::new(ctx.configs.clone()));
        for character in Character::ALL {
            let config = config_for(&ctx.configs, character)?;
            let fail = first_keyword(&config.intent_rules.fail_keywords, character, "fail")?;
            let success =
                first_keyword(&config.intent_rules.success_keywords, character, "success")?;
            let client = client_for(&backend, character);

            let script = [
                (format!("They told me: {fail}"), 20, Persona::Deceiver),
                (format!("I'm going to {success}"), 0, Persona::Deceiver),
                (format!("Seriously, {success}"), -20, Persona::Guardian),
            ];
            for (message, trust, persona) in script {
                let reply = client.send(&message).await?;
                if ctx.verbose {
                    println!("    {} <- {}", character.display_name().bright_white(), reply.text);
                }
                ensure!(
                    reply.failure.is_none(),
                    "{character}: transport failed with {:?}",
                    reply.failure
                );
                ensure!(
                    reply.trust_score == Some(trust) && reply.persona == Some(persona),
                    "{character}: after '{message}' expected trust {trust} as {persona}, got {:?} as {:?}",
                    reply.trust_score,
                    reply.persona
                );
            }

            let session = backend
                .session(client.session_id())
                .context("chat session was not kept")?;
            ensure!(
                session.logo_stage == 1,
                "{character}: logo stage {} after two safe answers",
                session.logo_stage
            );
            ensure!(
                backend.reset_session(client.session_id())?,
                "{character}: reset did not find the session"
            );
        }
        Ok(())
    }
}

struct RateLimitedGenerator;

#[async_trait(?Send)]
impl ReplyGenerator for RateLimitedGenerator {
    async fn generate(
        &self,
        _character: &str,
        _system_prompt: &str,
        _message: &str,
    ) -> Result<String, GeneratorError> {
        Err(GeneratorError::RateLimited)
    }
}

/// A failing reply generator yields in-character fallbacks that count as
/// wrong turns.
pub struct GeneratorOutage;

impl CombinedScenario for GeneratorOutage {
    fn description(&self) -> &'static str {
        "Generator outages fall back in character and corrupt the logo"
    }

    fn as_chat_scenario(&self) -> Option<&dyn ChatScenario> {
        Some(self)
    }
}

#[async_trait(?Send)]
impl ChatScenario for GeneratorOutage {
    async fn run_chat(&self, ctx: &ChatCtx) -> Result<()> {
        let backend = Rc::new(
            ChatBackend::new(ctx.configs.clone()).with_generator(Rc::new(RateLimitedGenerator)),
        );
        for character in Character::ALL {
            let thresholds = config_for(&ctx.configs, character)?.thresholds;
            let client = client_for(&backend, character);
            for turn in 1..=thresholds.fail_after {
                let reply = client.send(&format!("hello again, turn {turn}")).await?;
                ensure!(
                    reply.text.starts_with('⏳'),
                    "{character}: expected a rate-limit fallback, got '{}'",
                    reply.text
                );
            }
            let session = backend
                .session(client.session_id())
                .context("chat session was not kept")?;
            ensure!(
                session.wrong_count == thresholds.fail_after,
                "{character}: {} wrong turns recorded",
                session.wrong_count
            );
            ensure!(
                session.logo_stage > 1,
                "{character}: logo never corrupted past stage 1"
            );
        }
        Ok(())
    }
}

/// Bad input stays local; backend rejections come back as canned lines.
pub struct RequestValidation;

impl CombinedScenario for RequestValidation {
    fn description(&self) -> &'static str {
        "Invalid chat requests are rejected or answered in character"
    }

    fn as_chat_scenario(&self) -> Option<&dyn ChatScenario> {
        Some(self)
    }
}

#[async_trait(?Send)]
impl ChatScenario for RequestValidation {
    async fn run_chat(&self, ctx: &ChatCtx) -> Result<()> {
        let backend = Rc::new(ChatBackend::new(ctx.configs.clone()));
        let client = client_for(&backend, Character::Eli);
        match client.send("   ").await {
            Err(ChatError::EmptyMessage) => {}
            other => bail!("blank message: expected EmptyMessage, got {other:?}"),
        }
        match client.send(&"x".repeat(1001)).await {
            Err(ChatError::MessageTooLong { .. }) => {}
            other => bail!("oversized message: expected MessageTooLong, got {other:?}"),
        }
        ensure!(
            backend.session_count() == 0,
            "rejected messages still reached the backend"
        );

        let empty = Rc::new(ChatBackend::new(CharacterConfigs::default()));
        for character in Character::ALL {
            let reply = client_for(&empty, character).send("hi").await?;
            ensure!(
                reply.failure == Some(TransportError::Status(400)),
                "{character}: expected a 400, got {:?}",
                reply.failure
            );
            ensure!(
                reply.text.starts_with(&format!("{}:", character.display_name())),
                "{character}: canned line '{}' is out of character",
                reply.text
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ChatCtx {
        ChatCtx {
            configs: CharacterConfigs::bundled().unwrap(),
            verbose: false,
        }
    }

    #[tokio::test]
    async fn trust_progression_passes() {
        TrustProgression.run_chat(&ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn generator_outage_passes() {
        GeneratorOutage.run_chat(&ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn request_validation_passes() {
        RequestValidation.run_chat(&ctx()).await.unwrap();
    }
}
