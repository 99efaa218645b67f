pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    AnalysisProgress, AnalysisRecord, AnalysisStatus, NewAnalysis, ReportRecord, ReportType,
};

pub use sqlite::SqliteStore;

/// Durable home for analyses and their reports.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn create_analysis(&self, analysis: &NewAnalysis) -> Result<AnalysisRecord>;

    async fn get_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>>;

    async fn list_analyses(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AnalysisRecord>>;

    /// Insert or replace the report keyed by `(analysis_id, report_type)`.
    async fn upsert_report(
        &self,
        analysis_id: &str,
        report_type: ReportType,
        content: &str,
        score: f64,
        metadata: &Value,
    ) -> Result<()>;

    async fn update_status(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn get_reports(&self, analysis_id: &str) -> Result<Vec<ReportRecord>>;

    async fn get_progress(&self, analysis_id: &str) -> Result<Option<AnalysisProgress>> {
        let Some(analysis) = self.get_analysis(analysis_id).await? else {
            return Ok(None);
        };
        let reports = self.get_reports(analysis_id).await?;
        Ok(Some(AnalysisProgress::from_records(&analysis, &reports)))
    }
}
