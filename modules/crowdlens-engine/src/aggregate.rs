//! Reduces a batch of evaluations into a `SimulationResult`.
//!
//! Pure and deterministic: identical input scores always produce identical
//! insights and recommendations. The insight layer is a fixed rule table
//! over the aggregated numbers, not a model call, so results are
//! reproducible and testable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crowdlens_common::{Evaluation, MarketSegment, Sentiment, SimulationResult};

const NO_DATA_INSIGHT: &str = "No evaluations available to aggregate";

/// Reduce evaluations into overall scores, per-segment summaries, and the
/// deterministic insight/recommendation layer. `total_personas` is the
/// roster size, which exceeds `evaluations.len()` when units failed or the
/// batch was cut short by cancellation.
pub fn aggregate(
    evaluations: &[Evaluation],
    total_personas: usize,
    started_at: DateTime<Utc>,
    partial: bool,
) -> SimulationResult {
    let completed_at = Utc::now();
    let processing_time_seconds =
        (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;

    if evaluations.is_empty() {
        return SimulationResult {
            total_personas,
            evaluations: Vec::new(),
            overall_relevance: 0.0,
            overall_quality: 0.0,
            overall_engagement: 0.0,
            market_segments: Vec::new(),
            key_insights: vec![NO_DATA_INSIGHT.to_string()],
            recommendations: vec![
                "Re-run the simulation; no personas produced an evaluation".to_string(),
            ],
            partial,
            completed_at,
            processing_time_seconds,
        };
    }

    let overall_relevance = mean(evaluations, |e| e.relevance);
    let overall_quality = mean(evaluations, |e| e.quality);
    let overall_engagement = mean(evaluations, |e| e.engagement);

    let market_segments = build_segments(evaluations);
    let key_insights = build_insights(
        evaluations,
        overall_relevance,
        overall_engagement,
        &market_segments,
        partial,
    );
    let recommendations = build_recommendations(
        evaluations,
        overall_relevance,
        overall_quality,
        overall_engagement,
    );

    SimulationResult {
        total_personas,
        evaluations: evaluations.to_vec(),
        overall_relevance,
        overall_quality,
        overall_engagement,
        market_segments,
        key_insights,
        recommendations,
        partial,
        completed_at,
        processing_time_seconds,
    }
}

fn mean(evaluations: &[Evaluation], metric: impl Fn(&Evaluation) -> f64) -> f64 {
    evaluations.iter().map(metric).sum::<f64>() / evaluations.len() as f64
}

fn rate(evaluations: &[Evaluation], predicate: impl Fn(&Evaluation) -> bool) -> f64 {
    evaluations.iter().filter(|e| predicate(e)).count() as f64 / evaluations.len() as f64
}

// BTreeMap keeps segment order stable across runs.
fn build_segments(evaluations: &[Evaluation]) -> Vec<MarketSegment> {
    let mut groups: BTreeMap<&str, Vec<&Evaluation>> = BTreeMap::new();
    for evaluation in evaluations {
        groups.entry(&evaluation.segment).or_default().push(evaluation);
    }

    groups
        .into_iter()
        .map(|(name, members)| {
            let size = members.len();
            let seg_mean = |metric: fn(&Evaluation) -> f64| {
                members.iter().map(|e| metric(e)).sum::<f64>() / size as f64
            };
            let relevance = seg_mean(|e| e.relevance);
            let quality = seg_mean(|e| e.quality);
            let engagement = seg_mean(|e| e.engagement);
            let share_rate =
                members.iter().filter(|e| e.would_share).count() as f64 / size as f64;
            let act_rate = members.iter().filter(|e| e.would_act).count() as f64 / size as f64;

            let mut average_scores = BTreeMap::new();
            average_scores.insert("relevance".to_string(), relevance);
            average_scores.insert("quality".to_string(), quality);
            average_scores.insert("engagement".to_string(), engagement);

            let mut key_characteristics = Vec::new();
            key_characteristics.push(if relevance >= 0.6 {
                "finds the topic directly relevant".to_string()
            } else {
                "weak topical connection".to_string()
            });
            key_characteristics.push(format!(
                "{} reception",
                match majority_sentiment(&members) {
                    Sentiment::Positive => "mostly positive",
                    Sentiment::Neutral => "mostly neutral",
                    Sentiment::Negative => "mostly negative",
                }
            ));

            let mut opportunities = Vec::new();
            if share_rate >= 0.4 {
                opportunities.push("high amplification potential through shares".to_string());
            }
            if act_rate >= 0.4 {
                opportunities.push("receptive to calls to action".to_string());
            }
            if opportunities.is_empty() {
                opportunities.push("needs a stronger hook to activate this group".to_string());
            }

            let mut challenges = Vec::new();
            if relevance < 0.4 {
                challenges.push("article reads as off-topic for this group".to_string());
            }
            if quality < 0.5 {
                challenges.push("perceived quality undercuts trust".to_string());
            }
            if engagement < 0.4 {
                challenges.push("attention drops before the payoff".to_string());
            }

            MarketSegment {
                name: name.to_string(),
                size,
                average_scores,
                key_characteristics,
                opportunities,
                challenges,
            }
        })
        .collect()
}

fn majority_sentiment(members: &[&Evaluation]) -> Sentiment {
    let mut positive = 0usize;
    let mut negative = 0usize;
    let mut neutral = 0usize;
    for member in members {
        match member.sentiment {
            Sentiment::Positive => positive += 1,
            Sentiment::Negative => negative += 1,
            Sentiment::Neutral => neutral += 1,
        }
    }
    if positive >= negative && positive >= neutral {
        Sentiment::Positive
    } else if negative >= neutral {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn build_insights(
    evaluations: &[Evaluation],
    overall_relevance: f64,
    overall_engagement: f64,
    segments: &[MarketSegment],
    partial: bool,
) -> Vec<String> {
    let mut insights = Vec::new();

    if partial {
        insights.push(format!(
            "Partial result: aggregated from the {} evaluations completed before cancellation",
            evaluations.len()
        ));
    }

    if overall_relevance < 0.4 {
        insights.push("Overall relevance is low; the article misses its audience".to_string());
    } else if overall_relevance >= 0.7 {
        insights.push("The article resonates strongly across the simulated audience".to_string());
    }

    if overall_engagement >= 0.7 {
        insights.push("Engagement is high enough to expect organic spread".to_string());
    }

    let positive = evaluations
        .iter()
        .filter(|e| e.sentiment == Sentiment::Positive)
        .count();
    insights.push(format!(
        "{} of {} personas reacted positively",
        positive,
        evaluations.len()
    ));

    let share_rate = rate(evaluations, |e| e.would_share);
    if share_rate >= 0.5 {
        insights.push(format!(
            "{:.0}% of personas would share the article",
            share_rate * 100.0
        ));
    }

    if let Some(best) = segments.iter().max_by(|a, b| {
        segment_score(a)
            .partial_cmp(&segment_score(b))
            .expect("segment scores are finite")
    }) {
        insights.push(format!("Resonates most with the {} segment", best.name));
    }

    insights
}

fn segment_score(segment: &MarketSegment) -> f64 {
    segment.average_scores.values().sum::<f64>() / segment.average_scores.len().max(1) as f64
}

fn build_recommendations(
    evaluations: &[Evaluation],
    overall_relevance: f64,
    overall_quality: f64,
    overall_engagement: f64,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if overall_relevance < 0.5 {
        recommendations
            .push("Reframe the opening around the audience's stated interests".to_string());
    }
    if overall_quality < 0.5 {
        recommendations
            .push("Tighten structure and sourcing; quality scores drag the piece down".to_string());
    }
    if overall_engagement < 0.5 {
        recommendations
            .push("Add concrete hooks (examples, numbers, stakes) to lift engagement".to_string());
    }
    if rate(evaluations, |e| e.would_share) >= 0.5 {
        recommendations
            .push("Lean into distribution; personas signal willingness to share".to_string());
    }
    if overall_relevance >= 0.7 && overall_quality >= 0.7 && overall_engagement >= 0.7 {
        recommendations.push("Publish as is; scores are strong across the board".to_string());
    }
    if recommendations.is_empty() {
        recommendations
            .push("Iterate on the weakest-scoring segment before wide distribution".to_string());
    }

    recommendations
}
