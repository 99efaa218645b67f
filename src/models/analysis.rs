use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which a report row is stored for an analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Novelty,
    Inventiveness,
    Utility,
    Market,
    Risk,
    Comprehensive,
}

impl ReportType {
    /// Report types produced by the analysis stages, in pipeline order.
    pub const STAGES: [ReportType; 5] = [
        ReportType::Novelty,
        ReportType::Inventiveness,
        ReportType::Utility,
        ReportType::Market,
        ReportType::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Novelty => "novelty",
            ReportType::Inventiveness => "inventiveness",
            ReportType::Utility => "utility",
            ReportType::Market => "market",
            ReportType::Risk => "risk",
            ReportType::Comprehensive => "comprehensive",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "novelty" => Ok(ReportType::Novelty),
            "inventiveness" => Ok(ReportType::Inventiveness),
            "utility" => Ok(ReportType::Utility),
            "market" => Ok(ReportType::Market),
            "risk" => Ok(ReportType::Risk),
            "comprehensive" => Ok(ReportType::Comprehensive),
            other => Err(format!("unknown report type: {}", other)),
        }
    }
}

/// How much of a generated response could be read as structured data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseOutcome {
    /// The whole response was a JSON document.
    Structured,
    /// A JSON object was recovered from inside surrounding text.
    Recovered,
    /// Nothing parsed; the text is wrapped as `{"raw_response": ...}`.
    Raw,
}

/// Output of one analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    pub analysis_text: String,
    /// Normalized to [0, 1]. For risk, higher means riskier.
    pub score: f64,
    pub metadata: Value,
    pub parse_outcome: ParseOutcome,
}

impl StageResult {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// String items of a metadata array. Non-string items are rendered as JSON;
    /// a missing key yields an empty list.
    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            other => Err(format!("unknown analysis status: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub technical_field: String,
    pub technical_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub technical_field: String,
    pub technical_content: String,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub analysis_id: String,
    pub report_type: ReportType,
    pub content: String,
    pub score: f64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Progress as seen from the store, derived from which stage reports exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub analysis_id: String,
    pub status: AnalysisStatus,
    pub progress: u8,
    pub completed_reports: Vec<ReportType>,
    pub error_message: Option<String>,
}

impl AnalysisProgress {
    pub fn from_records(analysis: &AnalysisRecord, reports: &[ReportRecord]) -> Self {
        let completed_reports: Vec<ReportType> = reports
            .iter()
            .map(|r| r.report_type)
            .filter(|t| *t != ReportType::Comprehensive)
            .collect();

        let total = ReportType::STAGES.len();
        let progress = ((completed_reports.len().min(total) * 100) / total) as u8;

        Self {
            analysis_id: analysis.id.clone(),
            status: analysis.status,
            progress,
            completed_reports,
            error_message: analysis.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_strings_defaults_to_empty() {
        let result = StageResult {
            analysis_text: String::new(),
            score: 0.5,
            metadata: json!({"innovations": ["a", "b"], "count": 3}),
            parse_outcome: ParseOutcome::Structured,
        };

        assert_eq!(result.metadata_strings("innovations"), vec!["a", "b"]);
        assert!(result.metadata_strings("risks").is_empty());
        assert!(result.metadata_strings("count").is_empty());
    }

    #[test]
    fn test_report_type_round_trips_through_str() {
        for report_type in ReportType::STAGES {
            assert_eq!(report_type.as_str().parse::<ReportType>(), Ok(report_type));
        }
        assert!("summary".parse::<ReportType>().is_err());
    }

    #[test]
    fn test_progress_from_stored_reports() {
        let now = Utc::now();
        let analysis = AnalysisRecord {
            id: "a1".to_string(),
            user_id: "u1".to_string(),
            title: "t".to_string(),
            description: String::new(),
            technical_field: String::new(),
            technical_content: String::new(),
            status: AnalysisStatus::Processing,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let report = |report_type| ReportRecord {
            analysis_id: "a1".to_string(),
            report_type,
            content: String::new(),
            score: 0.0,
            metadata: Value::Null,
            created_at: now,
            updated_at: now,
        };
        let reports = vec![
            report(ReportType::Novelty),
            report(ReportType::Inventiveness),
            report(ReportType::Comprehensive),
        ];

        let progress = AnalysisProgress::from_records(&analysis, &reports);
        assert_eq!(progress.progress, 40);
        assert_eq!(
            progress.completed_reports,
            vec![ReportType::Novelty, ReportType::Inventiveness]
        );
    }
}
