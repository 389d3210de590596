use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrowdLensError;

// --- Job lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Initializing => write!(f, "initializing"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// --- Simulation configuration ---

pub const MIN_PERSONAS: usize = 10;
pub const MAX_PERSONAS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    Standard,
    Deep,
}

impl std::fmt::Display for AnalysisDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisDepth::Quick => write!(f, "quick"),
            AnalysisDepth::Standard => write!(f, "standard"),
            AnalysisDepth::Deep => write!(f, "deep"),
        }
    }
}

/// Requested simulation parameters. Validated at submission, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_num_personas")]
    pub num_personas: usize,
    #[serde(default = "default_diversity_level")]
    pub diversity_level: f64,
    #[serde(default = "default_analysis_depth")]
    pub analysis_depth: AnalysisDepth,
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "default_true")]
    pub parallel_processing: bool,
    #[serde(default = "default_true")]
    pub include_minority_perspectives: bool,
}

fn default_num_personas() -> usize {
    50
}

fn default_diversity_level() -> f64 {
    0.7
}

fn default_analysis_depth() -> AnalysisDepth {
    AnalysisDepth::Standard
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_personas: default_num_personas(),
            diversity_level: default_diversity_level(),
            analysis_depth: default_analysis_depth(),
            llm_provider: default_llm_provider(),
            parallel_processing: true,
            include_minority_perspectives: true,
        }
    }
}

impl SimulationConfig {
    /// Validate submitted parameters. Rejects out-of-range values with a
    /// field-naming message before any job is created.
    pub fn validate(&self) -> Result<(), CrowdLensError> {
        if self.num_personas < MIN_PERSONAS || self.num_personas > MAX_PERSONAS {
            return Err(CrowdLensError::InvalidConfig(format!(
                "num_personas must be between {MIN_PERSONAS} and {MAX_PERSONAS}, got {}",
                self.num_personas
            )));
        }
        if !(0.0..=1.0).contains(&self.diversity_level) {
            return Err(CrowdLensError::InvalidConfig(format!(
                "diversity_level must be in [0.0, 1.0], got {}",
                self.diversity_level
            )));
        }
        Ok(())
    }
}

// --- Article ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// The content under evaluation plus whatever metadata the caller supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub content: String,
    #[serde(default)]
    pub metadata: ArticleMetadata,
}

// --- Personas ---

/// A synthetic evaluator profile, built during the initializing phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    /// Archetype bucket; doubles as the default segment classifier.
    pub segment: String,
    pub age_range: String,
    pub occupation: String,
    pub interests: Vec<String>,
    pub media_diet: String,
    pub minority_perspective: bool,
}

// --- Evaluations ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Neutral => write!(f, "neutral"),
            Sentiment::Negative => write!(f, "negative"),
        }
    }
}

/// One persona's scored reaction to an article. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub persona_id: Uuid,
    pub segment: String,
    pub relevance: f64,
    pub quality: f64,
    pub engagement: f64,
    pub sentiment: Sentiment,
    pub reasoning: String,
    pub would_share: bool,
    pub would_act: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// A single evaluation unit that failed. Recovered locally by the pool;
/// only escalates if every unit fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaFailure {
    pub persona_id: Uuid,
    pub reason: String,
}

// --- Aggregated results ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSegment {
    pub name: String,
    pub size: usize,
    pub average_scores: BTreeMap<String, f64>,
    pub key_characteristics: Vec<String>,
    pub opportunities: Vec<String>,
    pub challenges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub total_personas: usize,
    pub evaluations: Vec<Evaluation>,
    pub overall_relevance: f64,
    pub overall_quality: f64,
    pub overall_engagement: f64,
    pub market_segments: Vec<MarketSegment>,
    pub key_insights: Vec<String>,
    pub recommendations: Vec<String>,
    /// True when the job was cancelled and only a subset was aggregated.
    pub partial: bool,
    pub completed_at: DateTime<Utc>,
    pub processing_time_seconds: f64,
}

// --- Status events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEventKind {
    StatusUpdate,
    PhaseUpdate,
    Error,
}

/// A transition notification. Ephemeral: published to subscribers at the
/// instant of transition, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub kind: StatusEventKind,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// --- Read view ---

/// Consistent point-in-time view of a job, safe to hand to concurrent
/// readers while the job is still mutating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SimulationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
