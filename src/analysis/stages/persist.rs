use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::analysis::graph::{Stage, StageContext};
use crate::error::{Result, StageError, StageErrorKind};
use crate::models::{AnalysisStatus, ReportType, Step, WorkflowState};
use crate::retry::with_retry;

/// Writes every stage report, then the comprehensive report, then the final
/// status. Progress only reaches 100 once all writes succeed.
pub struct PersistStage;

#[async_trait]
impl Stage for PersistStage {
    fn step(&self) -> Step {
        Step::SaveResults
    }

    fn checkpoint(&self) -> u8 {
        95
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        match save(state, ctx).await {
            Ok(status) => {
                state.advance(100);
                tracing::info!(
                    user_id = state.user_id(),
                    "Saved {} reports for {} ({})",
                    state.results().count() + 1,
                    state.analysis_id(),
                    status
                );
                Ok(())
            }
            Err(err) => {
                let error = StageError::from_error(self.step(), StageErrorKind::Persistence, &err);
                mark_failed(state, ctx, &error).await;
                Err(error)
            }
        }
    }
}

async fn save(state: &WorkflowState, ctx: &StageContext) -> Result<AnalysisStatus> {
    let analysis_id = state.analysis_id();

    for (report_type, result) in state.results() {
        upsert(
            ctx,
            analysis_id,
            report_type,
            &result.analysis_text,
            result.score,
            &result.metadata,
        )
        .await?;
    }

    let metadata = json!({
        "recommendations": state.recommendations,
        "overall_score": state.overall_score,
    });
    upsert(
        ctx,
        analysis_id,
        ReportType::Comprehensive,
        &state.comprehensive_report,
        state.overall_score,
        &metadata,
    )
    .await?;

    let error_message = state.error_message();
    let status = if error_message.is_some() {
        AnalysisStatus::Failed
    } else {
        AnalysisStatus::Completed
    };
    with_retry(&ctx.config.retry, &ctx.cancel, "update status", || {
        ctx.store
            .update_status(analysis_id, status, error_message.as_deref())
    })
    .await?;

    Ok(status)
}

async fn upsert(
    ctx: &StageContext,
    analysis_id: &str,
    report_type: ReportType,
    content: &str,
    score: f64,
    metadata: &Value,
) -> Result<()> {
    with_retry(&ctx.config.retry, &ctx.cancel, "save report", || {
        ctx.store
            .upsert_report(analysis_id, report_type, content, score, metadata)
    })
    .await
}

/// Best effort: the write that failed may well fail again. Bounded by the
/// per-call timeout but not by the cancel token, so a cancelled run still
/// gets its status.
async fn mark_failed(state: &WorkflowState, ctx: &StageContext, error: &StageError) {
    let message = match state.error_message() {
        Some(previous) => format!("{}; {}", previous, error),
        None => error.to_string(),
    };

    let write = ctx
        .store
        .update_status(state.analysis_id(), AnalysisStatus::Failed, Some(&message));
    match timeout(ctx.config.retry.timeout, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            "Could not mark analysis {} as failed: {}",
            state.analysis_id(),
            e
        ),
        Err(_) => tracing::warn!(
            "Timed out marking analysis {} as failed",
            state.analysis_id()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stages::{AnalysisStage, ReportStage};
    use crate::analysis::testing::{context, fast_config, request, FlakyStore};
    use std::time::Duration;
    use crate::models::NewAnalysis;
    use crate::storage::AnalysisStore;
    use std::sync::Arc;

    async fn prepared_state(ctx: &StageContext) -> WorkflowState {
        let req = request();
        ctx.store.create_analysis(&NewAnalysis::from(&req)).await.unwrap();

        let mut state = WorkflowState::new(req);
        for stage in AnalysisStage::all() {
            stage.execute(&mut state, ctx).await.unwrap();
        }
        ReportStage.execute(&mut state, ctx).await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_saves_reports_and_completes() {
        let ctx = context(fast_config());
        let mut state = prepared_state(&ctx).await;
        state.enter(Step::SaveResults, 95);

        PersistStage.execute(&mut state, &ctx).await.unwrap();

        assert_eq!(state.progress(), 100);
        let reports = ctx.store.get_reports(state.analysis_id()).await.unwrap();
        assert_eq!(reports.len(), 6);

        let comprehensive = reports
            .iter()
            .find(|r| r.report_type == ReportType::Comprehensive)
            .unwrap();
        assert!(comprehensive.content.starts_with("# Patent Analysis Report"));
        assert_eq!(comprehensive.metadata["recommendations"][0], state.recommendations[0]);

        let record = ctx.store.get_analysis(state.analysis_id()).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_prior_errors_mark_analysis_failed() {
        let ctx = context(fast_config());
        let mut state = prepared_state(&ctx).await;
        state.record_error(StageError::new(
            Step::AcademicSearch,
            StageErrorKind::Search,
            "HTTP 500",
        ));

        PersistStage.execute(&mut state, &ctx).await.unwrap();

        let record = ctx.store.get_analysis(state.analysis_id()).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("academic_search failed (search): HTTP 500")
        );
    }

    #[tokio::test]
    async fn test_write_failure_is_recorded() {
        let mut ctx = context(fast_config());
        ctx.store = Arc::new(FlakyStore::rejecting_reports());
        let mut state = prepared_state(&ctx).await;
        state.enter(Step::SaveResults, 95);

        let err = PersistStage.execute(&mut state, &ctx).await.unwrap_err();

        assert_eq!(err.kind, StageErrorKind::Persistence);
        assert_eq!(state.progress(), 95);
        let record = ctx.store.get_analysis(state.analysis_id()).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Failed);
        assert!(record.error_message.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_reports() {
        let ctx = context(fast_config());
        let mut state = prepared_state(&ctx).await;

        PersistStage.execute(&mut state, &ctx).await.unwrap();
        state.overall_score = 0.1;
        PersistStage.execute(&mut state, &ctx).await.unwrap();

        let reports = ctx.store.get_reports(state.analysis_id()).await.unwrap();
        assert_eq!(reports.len(), 6);
        let comprehensive = reports
            .iter()
            .find(|r| r.report_type == ReportType::Comprehensive)
            .unwrap();
        assert_eq!(comprehensive.score, 0.1);
    }

    #[tokio::test]
    async fn test_hanging_status_write_is_bounded() {
        let mut config = fast_config();
        config.retry.timeout = Duration::from_millis(100);
        let mut ctx = context(config);
        ctx.store = Arc::new(FlakyStore::hanging_status());
        let mut state = prepared_state(&ctx).await;
        state.enter(Step::SaveResults, 95);

        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            PersistStage.execute(&mut state, &ctx),
        )
        .await
        .expect("persist stage returned");

        let err = outcome.unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Timeout);
        assert_eq!(state.progress(), 95);
    }
}
