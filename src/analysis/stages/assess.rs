use async_trait::async_trait;
use serde_json::Value;

use crate::analysis::graph::{Stage, StageContext};
use crate::analysis::scoring::stage_score;
use crate::error::{StageError, StageErrorKind};
use crate::llm::parse_llm_response;
use crate::llm::prompts::analysis_prompt;
use crate::models::{ParseOutcome, ReportType, StageResult, Step, WorkflowState};
use crate::retry::with_retry;

/// One generated assessment: novelty, inventiveness, utility, market or risk.
pub struct AnalysisStage {
    report_type: ReportType,
}

impl AnalysisStage {
    pub fn new(report_type: ReportType) -> Self {
        Self { report_type }
    }

    /// The five assessment stages in pipeline order.
    pub fn all() -> Vec<Self> {
        ReportType::STAGES.into_iter().map(Self::new).collect()
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn step(&self) -> Step {
        match self.report_type {
            ReportType::Novelty => Step::NoveltyAnalysis,
            ReportType::Inventiveness => Step::InventivenessAnalysis,
            ReportType::Utility => Step::UtilityAnalysis,
            ReportType::Market => Step::MarketAnalysis,
            ReportType::Risk | ReportType::Comprehensive => Step::RiskAnalysis,
        }
    }

    fn checkpoint(&self) -> u8 {
        match self.report_type {
            ReportType::Novelty => 40,
            ReportType::Inventiveness => 50,
            ReportType::Utility => 60,
            ReportType::Market => 70,
            ReportType::Risk | ReportType::Comprehensive => 80,
        }
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        let step = self.step();
        let prompt = analysis_prompt(self.report_type, state);

        let response = with_retry(&ctx.config.retry, &ctx.cancel, step.as_str(), || {
            ctx.llm.generate(&prompt)
        })
        .await
        .map_err(|e| StageError::from_error(step, StageErrorKind::Generation, &e))?;

        let parsed = parse_llm_response(&response);
        if parsed.outcome != ParseOutcome::Structured {
            tracing::debug!("{} response parsed as {:?}", step, parsed.outcome);
        }

        let score = stage_score(self.report_type, &parsed.value);
        let analysis_text = parsed
            .value
            .get("analysis")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or(response);

        tracing::info!("{} scored {:.2}", self.report_type, score);

        state.insert_result(
            step,
            self.report_type,
            StageResult {
                analysis_text,
                score,
                metadata: parsed.value,
                parse_outcome: parsed.outcome,
            },
        )
    }
}
