use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::analysis::graph::{GraphBuilder, StageContext, StageGraph};
use crate::analysis::scoring::ScoringEngine;
use crate::analysis::stages::{
    AcademicSearchStage, AnalysisStage, MarketSearchStage, PatentSearchStage, PersistStage,
    ReportStage,
};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::retry::with_retry;
use crate::llm::LLMProvider;
use crate::models::{AnalysisRequest, AnalysisStatus, AnalysisSummary, Step, WorkflowState};
use crate::search::SearchProvider;
use crate::storage::AnalysisStore;

/// The canonical stage chain, in execution order.
pub const CANONICAL_STEPS: [Step; 10] = [
    Step::PatentSearch,
    Step::AcademicSearch,
    Step::MarketSearch,
    Step::NoveltyAnalysis,
    Step::InventivenessAnalysis,
    Step::UtilityAnalysis,
    Step::MarketAnalysis,
    Step::RiskAnalysis,
    Step::GenerateReport,
    Step::SaveResults,
];

pub fn canonical_graph() -> Result<StageGraph> {
    let mut builder = GraphBuilder::new()
        .add_stage(PatentSearchStage)
        .add_stage(AcademicSearchStage)
        .add_stage(MarketSearchStage);
    for stage in AnalysisStage::all() {
        builder = builder.add_stage(stage);
    }
    builder = builder.add_stage(ReportStage).add_stage(PersistStage);

    for pair in CANONICAL_STEPS.windows(2) {
        builder = builder.add_edge(pair[0], pair[1]);
    }

    builder.set_entry(Step::PatentSearch).compile()
}

pub struct AnalysisPipeline {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LLMProvider>,
    store: Arc<dyn AnalysisStore>,
    config: PipelineConfig,
    graph: StageGraph,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl AnalysisPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LLMProvider>,
        store: Arc<dyn AnalysisStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        Ok(Self {
            search,
            llm,
            store,
            config,
            graph: canonical_graph()?,
            running: Mutex::new(HashMap::new()),
        })
    }

    /// Run the full pipeline for one analysis. Never fails; problems are
    /// reported through the summary's `success` and `error` fields.
    #[tracing::instrument(skip(self, request), fields(analysis_id = %request.analysis_id))]
    pub async fn run_analysis(&self, request: AnalysisRequest) -> AnalysisSummary {
        let analysis_id = request.analysis_id.clone();

        if let Some(field) = request.missing_field() {
            return AnalysisSummary::rejected(
                &analysis_id,
                format!("missing required field: {}", field),
            );
        }

        let Some(registration) = self.register(&analysis_id) else {
            return AnalysisSummary::rejected(&analysis_id, "analysis is already running");
        };
        let cancel = registration.token.clone();

        tracing::info!(
            "Starting analysis with {} / {}",
            self.search.name(),
            self.llm.name()
        );

        if let Err(e) = with_retry(&self.config.retry, &cancel, "update status", || {
            self.store
                .update_status(&analysis_id, AnalysisStatus::Processing, None)
        })
        .await
        {
            tracing::warn!("Could not mark analysis as processing: {}", e);
        }

        let ctx = StageContext {
            search: self.search.clone(),
            llm: self.llm.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            scoring: ScoringEngine::new(self.config.weights.clone()),
            cancel,
        };

        let state = self.graph.run(WorkflowState::new(request), &ctx).await;
        drop(registration);

        // The token has fired, so this write is bounded by time alone
        if state.is_cancelled() {
            let message = state
                .error_message()
                .unwrap_or_else(|| "analysis cancelled".to_string());
            let write = self
                .store
                .update_status(&analysis_id, AnalysisStatus::Failed, Some(&message));
            match timeout(self.config.retry.timeout, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Could not record cancellation: {}", e),
                Err(_) => tracing::warn!("Timed out recording cancellation"),
            }
        }

        let summary = state.summary();
        if summary.success {
            tracing::info!(
                "Analysis completed with overall score {:.2}",
                summary.overall_score
            );
        } else {
            tracing::warn!(
                "Analysis finished with errors at {}%",
                summary.progress
            );
        }
        summary
    }

    /// Request cancellation of a running analysis. Returns false when no run
    /// with that id is in progress.
    pub fn cancel(&self, analysis_id: &str) -> bool {
        match self.running().get(analysis_id) {
            Some(token) => {
                tracing::info!("Cancelling analysis {}", analysis_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, analysis_id: &str) -> bool {
        self.running().contains_key(analysis_id)
    }

    pub fn steps(&self) -> Vec<Step> {
        self.graph.steps()
    }

    fn running(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        lock_running(&self.running)
    }

    fn register(&self, analysis_id: &str) -> Option<Registration<'_>> {
        let mut running = self.running();
        if running.contains_key(analysis_id) {
            return None;
        }
        let token = CancellationToken::new();
        running.insert(analysis_id.to_string(), token.clone());
        Some(Registration {
            running: &self.running,
            analysis_id: analysis_id.to_string(),
            token,
        })
    }
}

fn lock_running(
    running: &Mutex<HashMap<String, CancellationToken>>,
) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    running
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A run's entry in the running table. Removed on drop, so an aborted or
/// dropped `run_analysis` future frees its id.
struct Registration<'a> {
    running: &'a Mutex<HashMap<String, CancellationToken>>,
    analysis_id: String,
    token: CancellationToken,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        lock_running(self.running).remove(&self.analysis_id);
    }
}
