use serde::{Deserialize, Serialize};

use super::state::Step;

/// A patent description submitted for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub analysis_id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub technical_field: String,
    pub technical_content: String,
}

impl AnalysisRequest {
    /// First missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.analysis_id.trim().is_empty() {
            Some("analysis_id")
        } else if self.user_id.trim().is_empty() {
            Some("user_id")
        } else if self.title.trim().is_empty() {
            Some("title")
        } else {
            None
        }
    }
}

/// What the runner hands back once a run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub success: bool,
    pub analysis_id: String,
    pub overall_score: f64,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: u8,
    pub current_step: Option<Step>,
}

impl AnalysisSummary {
    /// Summary for a request that never started running.
    pub fn rejected(analysis_id: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            analysis_id: analysis_id.to_string(),
            overall_score: 0.0,
            recommendations: Vec::new(),
            error: Some(error.into()),
            progress: 0,
            current_step: None,
        }
    }
}

impl From<&AnalysisRequest> for super::analysis::NewAnalysis {
    fn from(request: &AnalysisRequest) -> Self {
        Self {
            id: request.analysis_id.clone(),
            user_id: request.user_id.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            technical_field: request.technical_field.clone(),
            technical_content: request.technical_content.clone(),
        }
    }
}
