//! LLM-backed reply generation.
//!
//! Built on rig-core with Anthropic and OpenAI backends. The
//! [`ReplyGenerator`] trait is infallible by contract: any provider
//! failure here degrades to fallback text instead of surfacing, so a
//! flaky LLM can never abort a processing cycle.

use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::config::{LlmBackend, LlmSettings};
use crate::error::GeneratorError;
use crate::pipeline::types::{EmailRecord, ReplyGenerator};

/// Fixed acknowledgment used when reply generation fails internally.
const FALLBACK_REPLY: &str = "Thank you for your email. I was unable to process \
your request automatically at the moment. A team member will review your message \
and respond as soon as possible.";

/// Max words of body fed to the summary prompt (keeps the call cheap).
const SUMMARY_BODY_WORDS: usize = 300;

/// Create a reply generator from configuration.
pub fn create_generator(settings: &LlmSettings) -> Result<Arc<dyn ReplyGenerator>, GeneratorError> {
    let api_key = settings
        .resolve_api_key()
        .map_err(|_| GeneratorError::MissingApiKey {
            provider: format!("{:?}", settings.backend).to_lowercase(),
            env_var: settings.backend.api_key_env_var().to_string(),
        })?;

    match settings.backend {
        LlmBackend::Anthropic => {
            use rig::providers::anthropic;

            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(api_key.expose_secret()).map_err(|e| {
                    GeneratorError::SetupFailed {
                        provider: "anthropic".into(),
                        reason: e.to_string(),
                    }
                })?;
            let agent = client.agent(&settings.model).build();
            info!(model = %settings.model, "Using Anthropic for reply generation");
            Ok(Arc::new(LlmReplyGenerator::new(
                agent,
                settings.model.clone(),
                settings.persona.clone(),
            )))
        }
        LlmBackend::OpenAi => {
            use rig::providers::openai;

            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(api_key.expose_secret()).map_err(|e| {
                    GeneratorError::SetupFailed {
                        provider: "openai".into(),
                        reason: e.to_string(),
                    }
                })?;
            let agent = client.agent(&settings.model).build();
            info!(model = %settings.model, "Using OpenAI for reply generation");
            Ok(Arc::new(LlmReplyGenerator::new(
                agent,
                settings.model.clone(),
                settings.persona.clone(),
            )))
        }
    }
}

/// Reply generator backed by a rig completion agent.
pub struct LlmReplyGenerator<M: CompletionModel> {
    agent: Agent<M>,
    model_name: String,
    persona: String,
}

impl<M: CompletionModel> LlmReplyGenerator<M> {
    pub fn new(agent: Agent<M>, model_name: String, persona: String) -> Self {
        Self {
            agent,
            model_name,
            persona,
        }
    }
}

#[async_trait]
impl<M: CompletionModel + Send + Sync> ReplyGenerator for LlmReplyGenerator<M> {
    async fn draft_reply(&self, email: &EmailRecord) -> String {
        let prompt = build_reply_prompt(&self.persona, email);
        match self.agent.prompt(prompt).await {
            Ok(reply) => {
                info!(model = %self.model_name, "Generated reply");
                reply
            }
            Err(e) => {
                warn!(model = %self.model_name, error = %e, "Reply generation failed, using fallback");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn draft_summary(&self, email: &EmailRecord, reply: &str) -> String {
        let prompt = build_summary_prompt(email, reply);
        match self.agent.prompt(prompt).await {
            Ok(summary) => {
                info!(model = %self.model_name, "Generated summary");
                summary
            }
            Err(e) => {
                warn!(model = %self.model_name, error = %e, "Summary generation failed, using fallback");
                fallback_summary(email)
            }
        }
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn build_reply_prompt(persona: &str, email: &EmailRecord) -> String {
    format!(
        "You are an email assistant with the following persona: {persona}\n\
         \n\
         You've received the following email:\n\
         From: {sender}\n\
         Subject: {subject}\n\
         \n\
         Body:\n\
         {body}\n\
         \n\
         Draft a polite and helpful reply that addresses the content of the email. \
         If it's a simple query you can answer, do so thoroughly. If it's complex or \
         requires human intervention, politely acknowledge the email and state that \
         it will be forwarded to the appropriate person. Be concise but friendly. \
         Output only the reply body, no subject line.",
        persona = persona,
        sender = email.sender,
        subject = email.subject,
        body = email.body,
    )
}

fn build_summary_prompt(email: &EmailRecord, reply: &str) -> String {
    let body: String = email
        .body
        .split_whitespace()
        .take(SUMMARY_BODY_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Summarize this email interaction concisely. Extract key points only.\n\
         \n\
         Original Email Subject: {subject}\n\
         Original Email: {body}\n\
         \n\
         Reply Sent: {reply}\n\
         \n\
         Summary:",
        subject = email.subject,
    )
}

/// Summary substituted when the provider call fails: derived from the
/// subject alone.
fn fallback_summary(email: &EmailRecord) -> String {
    format!("Interaction regarding: {}", email.subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_email() -> EmailRecord {
        EmailRecord {
            id: "1".into(),
            thread_id: "1".into(),
            sender: "boss@co.com".into(),
            recipient: "assistant@co.com".into(),
            subject: "Question".into(),
            body: "When is the report due?".into(),
            date: "".into(),
            list_id: None,
            message_id: None,
        }
    }

    #[test]
    fn reply_prompt_includes_persona_and_email() {
        let prompt = build_reply_prompt("a terse operations bot", &make_email());
        assert!(prompt.contains("a terse operations bot"));
        assert!(prompt.contains("From: boss@co.com"));
        assert!(prompt.contains("Subject: Question"));
        assert!(prompt.contains("When is the report due?"));
    }

    #[test]
    fn summary_prompt_includes_reply() {
        let prompt = build_summary_prompt(&make_email(), "Thursday EOD");
        assert!(prompt.contains("Reply Sent: Thursday EOD"));
        assert!(prompt.contains("Original Email Subject: Question"));
    }

    #[test]
    fn summary_prompt_truncates_long_bodies() {
        let mut email = make_email();
        email.body = "word ".repeat(1000);
        let prompt = build_summary_prompt(&email, "ok");
        let words = prompt.split_whitespace().filter(|w| *w == "word").count();
        assert!(words <= SUMMARY_BODY_WORDS);
    }

    #[test]
    fn fallback_summary_uses_subject() {
        assert_eq!(
            fallback_summary(&make_email()),
            "Interaction regarding: Question"
        );
    }

    #[test]
    fn fallback_reply_mentions_human_review() {
        assert!(FALLBACK_REPLY.contains("team member will review"));
    }
}
