//! In-process fakes for pipeline tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::analysis::graph::StageContext;
use crate::analysis::scoring::ScoringEngine;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::llm::LLMProvider;
use crate::models::{
    AnalysisRecord, AnalysisRequest, AnalysisStatus, NewAnalysis, ReportRecord, ReportType,
    SearchResult, SourceKind,
};
use crate::search::SearchProvider;
use crate::storage::{AnalysisStore, SqliteStore};

pub fn request() -> AnalysisRequest {
    AnalysisRequest {
        analysis_id: "analysis-1".to_string(),
        user_id: "user-1".to_string(),
        title: "Self-cleaning lens".to_string(),
        description: "A camera lens whose coating sheds water and dust without wiping".to_string(),
        technical_field: "optics".to_string(),
        technical_content: "Nano-structured hydrophobic coating with a photocatalytic layer"
            .to_string(),
    }
}

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..PipelineConfig::default()
    }
}

pub fn context(config: PipelineConfig) -> StageContext {
    let store = SqliteStore::in_memory().expect("in-memory store");
    StageContext {
        search: Arc::new(FakeSearch::new()),
        llm: Arc::new(FakeLlm::new()),
        store: Arc::new(store),
        scoring: ScoringEngine::new(config.weights.clone()),
        config,
        cancel: CancellationToken::new(),
    }
}

/// Returns canned results; the same "Shared prior art" title appears for
/// every patent query.
#[derive(Default)]
pub struct FakeSearch {
    failing: HashSet<SourceKind>,
    failing_queries: HashSet<String>,
    pub queries: Mutex<Vec<(String, SourceKind)>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, source: SourceKind) -> Self {
        self.failing.insert(source);
        self
    }

    pub fn failing_query(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, source: SourceKind) -> Result<Vec<SearchResult>> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), source));

        if self.failing.contains(&source) || self.failing_queries.contains(query) {
            return Err(Error::Upstream {
                service: "fake",
                status: 400,
                message: format!("{} search rejected", source),
            });
        }

        let count = match source {
            SourceKind::Patent => 7,
            SourceKind::Scholar => 12,
            SourceKind::Generic => 6,
        };
        let mut results = vec![SearchResult::new(
            "Shared prior art",
            "https://example.com/shared",
            source,
        )];
        results.extend((1..count).map(|i| {
            SearchResult::new(
                format!("{} result {} for {}", source, i, query),
                format!("https://example.com/{}/{}", source, i),
                source,
            )
            .with_snippet("snippet")
            .with_position(i as u32 + 1)
        }));
        Ok(results)
    }

    fn name(&self) -> &str {
        "fake-search"
    }
}

/// Answers each analysis prompt with a fixed JSON document.
#[derive(Default)]
pub struct FakeLlm {
    failing: HashSet<ReportType>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, report_type: ReportType) -> Self {
        self.failing.insert(report_type);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn report_type(prompt: &str) -> ReportType {
        if prompt.contains("Assess the novelty") {
            ReportType::Novelty
        } else if prompt.contains("inventive step") {
            ReportType::Inventiveness
        } else if prompt.contains("practical utility") {
            ReportType::Utility
        } else if prompt.contains("market value") {
            ReportType::Market
        } else {
            ReportType::Risk
        }
    }
}

#[async_trait]
impl LLMProvider for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let report_type = Self::report_type(prompt);
        if self.failing.contains(&report_type) {
            return Err(Error::LLMApi(format!("{} generation refused", report_type)));
        }

        let response = match report_type {
            ReportType::Novelty => {
                r#"{"analysis": "The coating combination is new.", "novelty_assessment": "high",
                    "score": 80, "innovations": ["photocatalytic top layer"],
                    "risks": ["similar hydrophobic coatings exist"]}"#
            }
            ReportType::Inventiveness => {
                "Here is my assessment:\n```json\n{\"analysis\": \"Not obvious to combine.\", \
                 \"score\": 60, \"creativity_level\": \"significant\"}\n```"
            }
            ReportType::Utility => {
                r#"{"analysis": "Ready for production.", "score": 90,
                    "application_scenarios": ["dash cameras", "security cameras"]}"#
            }
            ReportType::Market => "Market potential looks medium overall, no JSON today.",
            _ => {
                r#"{"analysis": "Manageable risk.", "overall_risk_level": "low", "risk_score": 30}"#
            }
        };
        Ok(response.to_string())
    }

    fn name(&self) -> &str {
        "fake-llm"
    }
}

/// Wraps an in-memory store and rejects report writes or stalls status
/// writes on demand.
pub struct FlakyStore {
    inner: SqliteStore,
    reject_reports: bool,
    hang_status: bool,
}

impl FlakyStore {
    pub fn rejecting_reports() -> Self {
        Self {
            inner: SqliteStore::in_memory().expect("in-memory store"),
            reject_reports: true,
            hang_status: false,
        }
    }

    /// `update_status` never resolves.
    pub fn hanging_status() -> Self {
        Self {
            inner: SqliteStore::in_memory().expect("in-memory store"),
            reject_reports: false,
            hang_status: true,
        }
    }
}

#[async_trait]
impl AnalysisStore for FlakyStore {
    async fn create_analysis(&self, analysis: &NewAnalysis) -> Result<AnalysisRecord> {
        self.inner.create_analysis(analysis).await
    }

    async fn get_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>> {
        self.inner.get_analysis(analysis_id).await
    }

    async fn list_analyses(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AnalysisRecord>> {
        self.inner.list_analyses(user_id, limit, offset).await
    }

    async fn upsert_report(
        &self,
        analysis_id: &str,
        report_type: ReportType,
        content: &str,
        score: f64,
        metadata: &Value,
    ) -> Result<()> {
        if self.reject_reports {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner
            .upsert_report(analysis_id, report_type, content, score, metadata)
            .await
    }

    async fn update_status(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if self.hang_status {
            return std::future::pending().await;
        }
        self.inner
            .update_status(analysis_id, status, error_message)
            .await
    }

    async fn get_reports(&self, analysis_id: &str) -> Result<Vec<ReportRecord>> {
        self.inner.get_reports(analysis_id).await
    }
}
