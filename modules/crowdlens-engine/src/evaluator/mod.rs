//! The persona evaluator seam.
//!
//! Scoring a persona against an article is the one slow, side-effecting,
//! failable call in the engine, so it lives behind a trait. The engine ships
//! two implementations: a Claude-backed one and a deterministic offline
//! scorer used when no API key is configured (and by the test suite).

mod claude;
mod heuristic;
mod prompt;

pub use claude::ClaudeEvaluator;
pub use heuristic::HeuristicEvaluator;

use async_trait::async_trait;

use crowdlens_common::{AnalysisDepth, Article, Evaluation, Persona};

#[async_trait]
pub trait PersonaEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        article: &Article,
        persona: &Persona,
        depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation>;
}
