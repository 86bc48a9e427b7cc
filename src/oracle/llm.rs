//! Chat-completions backed [`ScoringOracle`].
//!
//! Calls `POST {base_url}/chat/completions` on any OpenAI-compatible API.
//! Structured calls ask for a JSON object reply, which is parsed and
//! validated here before it reaches the pipeline.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry; request timeouts → fail as [`OracleError::Timeout`]
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::OracleConfig;
use crate::models::{HealthIssues, PurchaseUrl, Score};

use super::{normalize_purchase_url, purchase_query, OracleError, ScoringOracle};

const PROCESSING_PROMPT: &str = "You are an expert dietician. \
Analyze the ingredients of a food product and score how processed it is on a scale of 1 to 5:
1: Minimally processed: single-ingredient foods or a few easily recognizable whole-food ingredients.
2: Processed culinary ingredients or slightly processed: minimally processed foods with a few added culinary ingredients.
3: Processed: a moderate number of ingredients, some of them processed, still largely recognizable.
4: Ultra-processed: many ingredients, including additives not used in home kitchens (artificial flavors or colors, emulsifiers, thickeners).
5: Highly ultra-processed: long ingredient lists dominated by industrial formulations and additives, little to no intact whole food.
Reply with a JSON object {\"score\": <1-5>, \"score_explanation\": \"<brief reason>\"} and nothing else.";

const NUTRITION_PROMPT: &str = "You are an expert dietician. \
Analyze the nutrients of a food product and score its overall nutritional value on a scale of 1 to 5:
1: Very low: minimal nutrients, high in empty calories, sugars, and unhealthy fats.
2: Low: some nutrients but high in sugars, unhealthy fats, or sodium.
3: Moderate: a balanced mix of nutrients that may still be high in sugars, fats, or sodium.
4: High: rich in essential nutrients, low in added sugars, unhealthy fats, and sodium.
5: Very high: extremely rich in essential nutrients, low in added sugars, unhealthy fats, and sodium, made from whole foods.
Reply with a JSON object {\"score\": <1-5>, \"score_explanation\": \"<brief reason>\"} and nothing else.";

const HEALTH_PROMPT: &str = "You are an expert in food safety and the health risks of food ingredients. \
Identify ingredients with potential health issues backed by evidence. For each, give the ingredient name, \
the issues, the evidence for each issue, and the specific sub-components involved. \
Reply with a JSON object {\"potential_health_issues\": [{\"ingredient\": \"...\", \"issues\": \
[{\"issue\": \"...\", \"evidence\": \"...\", \"specific_components\": [\"...\"]}]}]} and nothing else. \
Use an empty list when no ingredient raises concerns.";

const URL_PROMPT: &str = "Find a link to buy the food product with the given name. \
Reply with just the URL, or \"No URL found\" if you cannot find one.";

/// Oracle backed by an OpenAI-compatible chat completions API.
///
/// Requires the API key in the environment variable named by
/// `oracle.api_key_env` (default `OPENAI_API_KEY`).
pub struct LlmOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
    label: String,
}

impl LlmOracle {
    /// Create the oracle from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("oracle.model required for openai provider"))?;

        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) => key,
            Err(_) => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(config.call_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            label: format!("openai:{}", model),
            model,
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// Send one system + user exchange and return the assistant's text.
    async fn complete(&self, system: &str, user: &str, json_reply: bool) -> Result<String, OracleError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if json_reply {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| OracleError::Malformed(e.to_string()))?;
                        return extract_content(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = OracleError::Transport(format!("API error {}: {}", status, body_text));

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(attempt, %status, "oracle call failed; retrying");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) if e.is_timeout() => return Err(OracleError::Timeout),
                Err(e) => {
                    last_err = Some(OracleError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| OracleError::Transport("oracle call failed after retries".into())))
    }
}

/// Pull `choices[0].message.content` out of a chat completions reply.
fn extract_content(json: &serde_json::Value) -> Result<String, OracleError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| OracleError::Malformed("missing choices[0].message.content".into()))
}

#[derive(Deserialize)]
struct ScoreReply {
    score: i64,
    score_explanation: String,
}

pub(crate) fn parse_score(content: &str) -> Result<Score, OracleError> {
    let reply: ScoreReply =
        serde_json::from_str(content.trim()).map_err(|e| OracleError::Malformed(e.to_string()))?;
    Score::new(reply.score, &reply.score_explanation)
        .map_err(|e| OracleError::Validation(e.to_string()))
}

pub(crate) fn parse_health_issues(content: &str) -> Result<HealthIssues, OracleError> {
    let issues: HealthIssues =
        serde_json::from_str(content.trim()).map_err(|e| OracleError::Malformed(e.to_string()))?;
    if issues
        .potential_health_issues
        .iter()
        .any(|entry| entry.ingredient.trim().is_empty())
    {
        return Err(OracleError::Validation(
            "health issue entry without an ingredient".into(),
        ));
    }
    Ok(issues)
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn score_processing(&self, ingredients: &str) -> Result<Score, OracleError> {
        let content = self
            .complete(PROCESSING_PROMPT, &format!("Ingredients: {}", ingredients), true)
            .await?;
        parse_score(&content)
    }

    async fn score_nutrition(&self, nutrients: &str) -> Result<Score, OracleError> {
        let content = self
            .complete(
                NUTRITION_PROMPT,
                &format!("Nutritional Information: {}", nutrients),
                true,
            )
            .await?;
        parse_score(&content)
    }

    async fn find_health_issues(&self, ingredients: &str) -> Result<HealthIssues, OracleError> {
        let content = self
            .complete(HEALTH_PROMPT, &format!("Ingredients: {}", ingredients), true)
            .await?;
        parse_health_issues(&content)
    }

    async fn find_purchase_url(
        &self,
        name: &str,
        brand: Option<&str>,
    ) -> Result<PurchaseUrl, OracleError> {
        let content = self
            .complete(URL_PROMPT, &purchase_query(name, brand), false)
            .await?;
        normalize_purchase_url(&content)
    }
}
