use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{ReportType, WorkflowState};

/// Per-criterion weights for the overall score. Risk contributes inverted
/// (`1 - risk`); the divisor is the sum of all weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    pub novelty: f64,
    pub inventiveness: f64,
    pub utility: f64,
    pub market: f64,
    pub risk: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            novelty: 0.4,
            inventiveness: 0.4,
            utility: 0.2,
            market: 0.0,
            risk: 0.0,
        }
    }
}

impl ScoreWeights {
    pub fn weight(&self, report_type: ReportType) -> f64 {
        match report_type {
            ReportType::Novelty => self.novelty,
            ReportType::Inventiveness => self.inventiveness,
            ReportType::Utility => self.utility,
            ReportType::Market => self.market,
            ReportType::Risk => self.risk,
            ReportType::Comprehensive => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        ReportType::STAGES.iter().map(|rt| self.weight(*rt)).sum()
    }

    pub fn validate(&self) -> Result<()> {
        for report_type in ReportType::STAGES {
            let weight = self.weight(report_type);
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!(
                    "{} weight must be a non-negative number, got {}",
                    report_type, weight
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(Error::Config("score weights must not all be zero".to_string()));
        }
        Ok(())
    }
}

pub struct ScoringEngine {
    weights: ScoreWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Weighted average of the stage scores in [0, 1]. A stage without a
    /// result contributes 0, including risk.
    pub fn overall_score(&self, state: &WorkflowState) -> f64 {
        let total = self.weights.total();
        if total <= 0.0 {
            return 0.0;
        }

        let weighted: f64 = ReportType::STAGES
            .iter()
            .map(|rt| {
                let contribution = match (rt, state.result(*rt)) {
                    (_, None) => 0.0,
                    (ReportType::Risk, Some(result)) => 1.0 - result.score,
                    (_, Some(result)) => result.score,
                };
                contribution * self.weights.weight(*rt)
            })
            .sum();

        (weighted / total).clamp(0.0, 1.0)
    }

    pub fn recommendations(&self, state: &WorkflowState, overall: f64) -> Vec<String> {
        let mut recommendations = Vec::new();

        if overall >= 0.7 {
            recommendations.push("Strongly recommend filing a patent application".to_string());
            recommendations
                .push("The invention shows significant innovation and market value".to_string());
        } else if overall >= 0.5 {
            recommendations.push(
                "Recommend filing after improvement, addressing the points below".to_string(),
            );
            if state.score(ReportType::Novelty) < 0.7 {
                recommendations.push("Strengthen the distinguishing technical features".to_string());
            }
            if state.score(ReportType::Market) < 0.7 {
                recommendations.push("Study the market positioning in more depth".to_string());
            }
        } else {
            recommendations.push("Recommend further R&D before filing".to_string());
            recommendations.push("The technical solution needs further refinement".to_string());
        }

        let high_risk = state
            .result(ReportType::Risk)
            .and_then(|r| r.metadata_str("overall_risk_level"))
            .map(|level| level.to_lowercase().contains("high"))
            .unwrap_or(false);
        if high_risk {
            recommendations.push("Run a patent infringement risk search before filing".to_string());
        }

        recommendations
    }
}

/// JSON key holding the explicit numeric score for a stage.
pub fn score_field(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::Risk => "risk_score",
        _ => "score",
    }
}

/// JSON key holding the high/medium/low assessment for a stage.
pub fn assessment_field(report_type: ReportType) -> &'static str {
    match report_type {
        ReportType::Novelty => "novelty_assessment",
        ReportType::Inventiveness => "inventiveness_assessment",
        ReportType::Utility => "utility_assessment",
        ReportType::Market => "commercialization_potential",
        ReportType::Risk => "overall_risk_level",
        ReportType::Comprehensive => "assessment",
    }
}

/// Score for a parsed stage response: the explicit numeric field when
/// present, otherwise the keyword heuristic over the assessment field or
/// the raw text.
pub fn stage_score(report_type: ReportType, value: &Value) -> f64 {
    if let Some(raw) = value.get(score_field(report_type)).and_then(numeric) {
        return normalize_score(raw);
    }

    let text = value
        .get(assessment_field(report_type))
        .and_then(Value::as_str)
        .or_else(|| value.get("raw_response").and_then(Value::as_str))
        .or_else(|| value.get("analysis").and_then(Value::as_str))
        .unwrap_or_default();

    heuristic_score(report_type, text)
}

/// Scores above 1 are read as percentages. Result is clamped to [0, 1].
pub fn normalize_score(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let score = if raw > 1.0 { raw / 100.0 } else { raw };
    score.clamp(0.0, 1.0)
}

/// Keyword-band score: high, then medium, else low.
pub fn heuristic_score(report_type: ReportType, text: &str) -> f64 {
    let (high, medium, low) = match report_type {
        ReportType::Novelty => (0.9, 0.6, 0.3),
        ReportType::Inventiveness => (0.85, 0.5, 0.2),
        ReportType::Utility => (0.95, 0.7, 0.4),
        ReportType::Market => (0.9, 0.6, 0.3),
        ReportType::Risk => (0.8, 0.5, 0.2),
        ReportType::Comprehensive => (0.9, 0.6, 0.3),
    };

    let text = text.to_lowercase();
    if text.contains("high") {
        high
    } else if text.contains("medium") || text.contains("moderate") {
        medium
    } else {
        low
    }
}

// Models sometimes quote numbers ("score": "85").
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}
