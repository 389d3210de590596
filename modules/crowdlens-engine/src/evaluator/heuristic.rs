//! Offline evaluator: stable pseudo-scores derived from the persona and the
//! article, so the same pair always scores the same. Keeps the engine fully
//! exercisable without an API key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crowdlens_common::{AnalysisDepth, Article, Evaluation, Persona, Sentiment};

use super::PersonaEvaluator;

pub struct HeuristicEvaluator;

#[async_trait]
impl PersonaEvaluator for HeuristicEvaluator {
    async fn evaluate(
        &self,
        article: &Article,
        persona: &Persona,
        _depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation> {
        let relevance = unit_score(persona.id, &article.content, 1);
        let quality = unit_score(persona.id, &article.content, 2);
        let engagement = unit_score(persona.id, &article.content, 3);
        let mean = (relevance + quality + engagement) / 3.0;

        let sentiment = if mean >= 0.6 {
            Sentiment::Positive
        } else if mean >= 0.4 {
            Sentiment::Neutral
        } else {
            Sentiment::Negative
        };

        let interest = persona
            .interests
            .first()
            .map(String::as_str)
            .unwrap_or("general topics");

        Ok(Evaluation {
            persona_id: persona.id,
            segment: persona.segment.clone(),
            relevance,
            quality,
            engagement,
            sentiment,
            reasoning: format!(
                "{} ({}) weighs the piece against an interest in {interest}",
                persona.name, persona.occupation
            ),
            would_share: engagement >= 0.6 && relevance >= 0.5,
            would_act: mean >= 0.65,
            evaluated_at: Utc::now(),
        })
    }
}

fn unit_score(persona_id: Uuid, content: &str, salt: u8) -> f64 {
    let mut hasher = DefaultHasher::new();
    persona_id.hash(&mut hasher);
    content.len().hash(&mut hasher);
    salt.hash(&mut hasher);
    (hasher.finish() % 1000) as f64 / 999.0
}
