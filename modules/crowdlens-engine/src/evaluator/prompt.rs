//! Prompt templates for persona-based article evaluation.

use crowdlens_common::{AnalysisDepth, Article, Persona};

/// Build the system prompt: who the persona is and what to return.
pub fn evaluation_system(persona: &Persona) -> String {
    format!(
        r#"You role-play one specific reader evaluating an article.

READER PROFILE:
- Name: {name}
- Age range: {age_range}
- Occupation: {occupation}
- Audience segment: {segment}
- Interests: {interests}
- Media habits: {media_diet}

Score the article strictly from this reader's perspective, not your own.
Scores are floats from 0.0 to 1.0.

Return JSON only:
{{"relevance": <float>, "quality": <float>, "engagement": <float>,
"sentiment": "positive|neutral|negative", "reasoning": "<text>",
"would_share": <bool>, "would_act": <bool>}}"#,
        name = persona.name,
        age_range = persona.age_range,
        occupation = persona.occupation,
        segment = persona.segment,
        interests = persona.interests.join(", "),
        media_diet = persona.media_diet,
    )
}

/// Build the user prompt carrying the article itself.
pub fn evaluation_user(article: &Article, depth: AnalysisDepth) -> String {
    let reasoning_ask = match depth {
        AnalysisDepth::Quick => "Keep reasoning to one sentence.",
        AnalysisDepth::Standard => "Give two or three sentences of reasoning.",
        AnalysisDepth::Deep => {
            "Reason thoroughly: what works, what loses this reader, and why."
        }
    };

    let title = article
        .metadata
        .title
        .as_deref()
        .map(|t| format!("Title: {t}\n"))
        .unwrap_or_default();

    format!(
        "{title}Article:\n{content}\n\n{reasoning_ask}\nReturn JSON only.",
        content = article.content,
    )
}
