use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::analysis::{ReportType, StageResult};
use super::request::{AnalysisRequest, AnalysisSummary};
use super::search::SearchResult;
use crate::error::{StageError, StageErrorKind};

/// Named pipeline steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    PatentSearch,
    AcademicSearch,
    MarketSearch,
    NoveltyAnalysis,
    InventivenessAnalysis,
    UtilityAnalysis,
    MarketAnalysis,
    RiskAnalysis,
    GenerateReport,
    SaveResults,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::PatentSearch => "patent_search",
            Step::AcademicSearch => "academic_search",
            Step::MarketSearch => "market_search",
            Step::NoveltyAnalysis => "novelty_analysis",
            Step::InventivenessAnalysis => "inventiveness_analysis",
            Step::UtilityAnalysis => "utility_analysis",
            Step::MarketAnalysis => "market_analysis",
            Step::RiskAnalysis => "risk_analysis",
            Step::GenerateReport => "generate_report",
            Step::SaveResults => "save_results",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission fields, fixed for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invention {
    pub title: String,
    pub description: String,
    pub technical_field: String,
    pub technical_content: String,
}

/// State threaded through every stage of one pipeline run.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    analysis_id: String,
    user_id: String,
    invention: Invention,

    pub patent_results: Vec<SearchResult>,
    pub academic_results: Vec<SearchResult>,
    pub market_results: Vec<SearchResult>,

    results: BTreeMap<ReportType, StageResult>,

    current_step: Option<Step>,
    progress: u8,
    errors: Vec<StageError>,

    pub comprehensive_report: String,
    pub overall_score: f64,
    pub recommendations: Vec<String>,
}

impl WorkflowState {
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            analysis_id: request.analysis_id,
            user_id: request.user_id,
            invention: Invention {
                title: request.title,
                description: request.description,
                technical_field: request.technical_field,
                technical_content: request.technical_content,
            },
            patent_results: Vec::new(),
            academic_results: Vec::new(),
            market_results: Vec::new(),
            results: BTreeMap::new(),
            current_step: None,
            progress: 0,
            errors: Vec::new(),
            comprehensive_report: String::new(),
            overall_score: 0.0,
            recommendations: Vec::new(),
        }
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn invention(&self) -> &Invention {
        &self.invention
    }

    pub fn current_step(&self) -> Option<Step> {
        self.current_step
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Mark `step` as running and raise progress to `checkpoint`.
    /// Progress never moves backwards.
    pub fn enter(&mut self, step: Step, checkpoint: u8) {
        self.current_step = Some(step);
        self.advance(checkpoint);
    }

    pub fn advance(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn result(&self, report_type: ReportType) -> Option<&StageResult> {
        self.results.get(&report_type)
    }

    pub fn results(&self) -> impl Iterator<Item = (ReportType, &StageResult)> {
        self.results.iter().map(|(k, v)| (*k, v))
    }

    /// Score of a stage, or 0 when the stage produced nothing.
    pub fn score(&self, report_type: ReportType) -> f64 {
        self.result(report_type).map(|r| r.score).unwrap_or(0.0)
    }

    /// Store a stage result. A key is written at most once; a second write is
    /// rejected and the first value kept.
    pub fn insert_result(
        &mut self,
        step: Step,
        report_type: ReportType,
        result: StageResult,
    ) -> Result<(), StageError> {
        use std::collections::btree_map::Entry;

        match self.results.entry(report_type) {
            Entry::Vacant(slot) => {
                slot.insert(result);
                Ok(())
            }
            Entry::Occupied(_) => Err(StageError::new(
                step,
                StageErrorKind::DuplicateResult,
                format!("{} result already recorded", report_type),
            )),
        }
    }

    pub fn record_error(&mut self, error: StageError) {
        tracing::warn!("{}", error);
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All recorded errors joined into one message.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind == StageErrorKind::Cancelled)
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            success: !self.has_errors(),
            analysis_id: self.analysis_id.clone(),
            overall_score: self.overall_score,
            recommendations: self.recommendations.clone(),
            error: self.error_message(),
            progress: self.progress,
            current_step: self.current_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::ParseOutcome;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            analysis_id: "a1".to_string(),
            user_id: "u1".to_string(),
            title: "Solar window".to_string(),
            description: "A window that generates power".to_string(),
            technical_field: "photovoltaics".to_string(),
            technical_content: "Transparent cells laminated in glass".to_string(),
        }
    }

    fn result(score: f64) -> StageResult {
        StageResult {
            analysis_text: format!("score {}", score),
            score,
            metadata: serde_json::Value::Null,
            parse_outcome: ParseOutcome::Structured,
        }
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut state = WorkflowState::new(request());
        state.enter(Step::NoveltyAnalysis, 40);
        state.enter(Step::PatentSearch, 10);
        assert_eq!(state.progress(), 40);
        assert_eq!(state.current_step(), Some(Step::PatentSearch));

        state.advance(250);
        assert_eq!(state.progress(), 100);
    }

    #[test]
    fn test_stage_result_is_written_once() {
        let mut state = WorkflowState::new(request());
        state
            .insert_result(Step::NoveltyAnalysis, ReportType::Novelty, result(0.8))
            .unwrap();

        let err = state
            .insert_result(Step::RiskAnalysis, ReportType::Novelty, result(0.1))
            .unwrap_err();

        assert_eq!(err.kind, StageErrorKind::DuplicateResult);
        assert_eq!(state.score(ReportType::Novelty), 0.8);
    }

    #[test]
    fn test_summary_reflects_errors() {
        let mut state = WorkflowState::new(request());
        assert!(state.summary().success);

        state.record_error(StageError::new(
            Step::AcademicSearch,
            StageErrorKind::Search,
            "HTTP 500",
        ));
        let summary = state.summary();
        assert!(!summary.success);
        assert_eq!(
            summary.error.as_deref(),
            Some("academic_search failed (search): HTTP 500")
        );
    }
}
