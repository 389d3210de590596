//! Claude-backed persona evaluator.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, warn};

use crowdlens_common::{AnalysisDepth, Article, Evaluation, Persona, Sentiment};

use super::{prompt, PersonaEvaluator};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const HAIKU_MODEL: &str = "claude-haiku-4-5-20251001";
const SONNET_MODEL: &str = "claude-sonnet-4-20250514";

pub struct ClaudeEvaluator {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeEvaluator {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let url = format!("{}/messages", self.base_url);

        let body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Claude API error ({}): {}", status, error_text));
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("Claude response had no content blocks"))
    }
}

#[async_trait]
impl PersonaEvaluator for ClaudeEvaluator {
    async fn evaluate(
        &self,
        article: &Article,
        persona: &Persona,
        depth: AnalysisDepth,
    ) -> Result<Evaluation> {
        let model = model_for(depth);
        let system = prompt::evaluation_system(persona);
        let user = prompt::evaluation_user(article, depth);

        debug!(persona_id = %persona.id, model, "Persona evaluation request");
        let response = self.chat(model, max_tokens_for(depth), &system, &user).await?;

        parse_evaluation(&response, persona)
    }
}

fn model_for(depth: AnalysisDepth) -> &'static str {
    match depth {
        AnalysisDepth::Quick | AnalysisDepth::Standard => HAIKU_MODEL,
        AnalysisDepth::Deep => SONNET_MODEL,
    }
}

fn max_tokens_for(depth: AnalysisDepth) -> u32 {
    match depth {
        AnalysisDepth::Quick => 300,
        AnalysisDepth::Standard => 600,
        AnalysisDepth::Deep => 1200,
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct EvaluationWire {
    relevance: f64,
    quality: f64,
    engagement: f64,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    would_share: bool,
    #[serde(default)]
    would_act: bool,
}

fn parse_evaluation(response: &str, persona: &Persona) -> Result<Evaluation> {
    let json_str = response.trim();
    let json_str = json_str
        .strip_prefix("```json")
        .or_else(|| json_str.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(json_str);

    let wire: EvaluationWire = serde_json::from_str(json_str.trim()).map_err(|e| {
        warn!(persona_id = %persona.id, error = %e, "Failed to parse evaluation response");
        anyhow!("Failed to parse persona evaluation: {e}")
    })?;

    let relevance = wire.relevance.clamp(0.0, 1.0);
    let quality = wire.quality.clamp(0.0, 1.0);
    let engagement = wire.engagement.clamp(0.0, 1.0);

    // Fall back to score-derived sentiment when the label is unusable.
    let sentiment = match wire.sentiment.as_deref() {
        Some("positive") => Sentiment::Positive,
        Some("neutral") => Sentiment::Neutral,
        Some("negative") => Sentiment::Negative,
        _ => {
            let mean = (relevance + quality + engagement) / 3.0;
            if mean >= 0.6 {
                Sentiment::Positive
            } else if mean >= 0.4 {
                Sentiment::Neutral
            } else {
                Sentiment::Negative
            }
        }
    };

    Ok(Evaluation {
        persona_id: persona.id,
        segment: persona.segment.clone(),
        relevance,
        quality,
        engagement,
        sentiment,
        reasoning: wire.reasoning,
        would_share: wire.would_share,
        would_act: wire.would_act,
        evaluated_at: Utc::now(),
    })
}
