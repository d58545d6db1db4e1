use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::extraction::llm::{user_prompt, LanguageModel, OpenAiChatModel, SYSTEM_PROMPT};
use crate::extraction::merge::{merge, FieldSources, PassengerDraft};
use crate::extraction::rules::apply_rules;
use crate::metrics::EXTRACTIONS_TOTAL;
use crate::models::PassengerRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use tracing::{debug, info, warn};

pub const IRRELEVANT_MESSAGE: &str =
    "This message is not about a Titanic passenger. Please ask about a specific passenger on the Titanic.";

const DEFAULT_REASONING: &str = "Extracted passenger information from natural language";

/// How an extraction was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionPath {
    /// Model reply merged with the rule pass
    Model,
    /// Model reply was unusable; rules alone
    RulesFallback,
    /// No model configured; rules alone
    RulesOnly,
}

/// Structured passenger pulled out of a free-text message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub passenger: PassengerRecord,
    pub reasoning: String,
    pub sources: FieldSources,
    pub path: ExtractionPath,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    #[serde(default = "default_relevant")]
    is_relevant: bool,
    #[serde(default)]
    passenger: Option<PassengerDraft>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn default_relevant() -> bool {
    true
}

/// Remove a surrounding Markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().trim_end_matches("```").trim()
}

fn parse_reply(content: &str) -> std::result::Result<ModelReply, String> {
    serde_json::from_str(strip_code_fence(content)).map_err(|e| e.to_string())
}

/// Two-stage extraction: language model as a prior, lexical rules on top
#[derive(Clone)]
pub struct ExtractionAdapter {
    model: Option<Arc<dyn LanguageModel>>,
}

impl ExtractionAdapter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    pub fn rules_only() -> Self {
        Self { model: None }
    }

    /// OpenAI-backed adapter, or rules-only when no model is configured
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match OpenAiChatModel::from_config(config)? {
            Some(model) => {
                info!(model = %config.model, "Natural-language extraction uses a language model");
                Ok(Self::new(Arc::new(model)))
            }
            None => {
                warn!(
                    api_key_env = %config.api_key_env,
                    "No language model configured; natural-language extraction is rules-only"
                );
                Ok(Self::rules_only())
            }
        }
    }

    pub fn is_rules_only(&self) -> bool {
        self.model.is_none()
    }

    pub async fn extract(&self, message: &str) -> Result<Extraction> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("Message must not be empty".to_string()));
        }

        let rules = apply_rules(message);
        debug!(rules = ?rules, "Rule pass complete");

        let Some(model) = &self.model else {
            if rules.is_empty() {
                return Err(irrelevant());
            }
            return Ok(finish(
                &PassengerDraft::default(),
                &rules,
                "Extracted with rule-based patterns; no language model is configured".to_string(),
                ExtractionPath::RulesOnly,
            ));
        };

        let content = model.complete(SYSTEM_PROMPT, &user_prompt(message)).await?;

        match parse_reply(&content) {
            Ok(reply) if !reply.is_relevant => Err(irrelevant()),
            Ok(ModelReply {
                passenger: Some(draft),
                reasoning,
                ..
            }) => Ok(finish(
                &draft,
                &rules,
                reasoning
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REASONING.to_string()),
                ExtractionPath::Model,
            )),
            Ok(_) => Ok(fallback(&rules, "missing field `passenger`")),
            Err(e) => Ok(fallback(&rules, &e)),
        }
    }
}

fn irrelevant() -> AppError {
    EXTRACTIONS_TOTAL.with_label_values(&["irrelevant"]).inc();
    AppError::IrrelevantInput(IRRELEVANT_MESSAGE.to_string())
}

fn fallback(rules: &PassengerDraft, error: &str) -> Extraction {
    warn!(error = %error, "Unusable LLM reply; falling back to rule-based extraction");
    finish(
        &PassengerDraft::default(),
        rules,
        format!(
            "Failed to parse LLM response, using manual extraction. Error: {}",
            error
        ),
        ExtractionPath::RulesFallback,
    )
}

fn finish(
    model: &PassengerDraft,
    rules: &PassengerDraft,
    reasoning: String,
    path: ExtractionPath,
) -> Extraction {
    let resolved = merge(model, rules);
    EXTRACTIONS_TOTAL
        .with_label_values(&[&path.to_string()])
        .inc();

    Extraction {
        passenger: resolved.passenger,
        reasoning,
        sources: resolved.sources,
        path,
    }
}
