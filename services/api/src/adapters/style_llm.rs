//! services/api/src/adapters/style_llm.rs
//!
//! This module contains the adapter for the style-advice LLM.
//! It implements the `StyleAdvisor` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use synthstyle_core::{
    domain::{Preferences, StyleAdvice, UserProfile},
    ports::{PortError, PortResult, StyleAdvisor},
};
use tracing::instrument;

const SYSTEM_PROMPT: &str = "You are a sustainable-fashion stylist. Given a shopper's style \
preferences, sustainability priorities and purchase history, reply with one summary sentence \
on the first line, followed by up to five concrete suggestions, one per line, each starting \
with '- '. Favour durable, organic and recycled materials and stay within the price limit.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `StyleAdvisor` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiStyleAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiStyleAdapter {
    /// Creates a new `OpenAiStyleAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Describes the shopper in plain text for the prompt.
fn describe_shopper(preferences: &Preferences, profile: Option<&UserProfile>) -> String {
    let styles: Vec<String> = preferences.style.iter().map(|s| format!("{:?}", s)).collect();
    let mut text = format!(
        "Styles: {}\nPrefers organic: {}\nPrefers recycled: {}\nMaximum price: ${:.0}",
        if styles.is_empty() {
            "none given".to_string()
        } else {
            styles.join(", ")
        },
        preferences.sustainability.prefer_organic,
        preferences.sustainability.prefer_recycled,
        preferences.sustainability.max_price,
    );
    if let Some(profile) = profile {
        text.push_str(&format!(
            "\nPurchases so far: {}\nAverage sustainability score of purchases: {:.0}",
            profile.purchase_history.len(),
            profile.sustainability_score
        ));
    }
    text
}

/// Splits the model's reply into a summary line and bullet suggestions.
fn parse_advice(content: &str) -> StyleAdvice {
    let mut summary = String::new();
    let mut suggestions = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let bullet = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix('•'));
        match bullet {
            Some(item) => suggestions.push(item.trim().to_string()),
            None if summary.is_empty() => summary = line.to_string(),
            None => suggestions.push(line.to_string()),
        }
    }
    StyleAdvice {
        summary,
        suggestions,
    }
}

//=========================================================================================
// `StyleAdvisor` Trait Implementation
//=========================================================================================

#[async_trait]
impl StyleAdvisor for OpenAiStyleAdapter {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn advise(
        &self,
        preferences: &Preferences,
        profile: Option<&UserProfile>,
    ) -> PortResult<StyleAdvice> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(describe_shopper(preferences, profile))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Style LLM response contained no text content.".to_string())
            })?;
        Ok(parse_advice(&content))
    }
}
