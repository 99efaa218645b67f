use async_trait::async_trait;
use chrono::Utc;

use crate::analysis::graph::{Stage, StageContext};
use crate::error::StageError;
use crate::models::{ReportType, StageResult, Step, WorkflowState};

/// Combines the stage scores into the overall score, recommendations and
/// the markdown report.
pub struct ReportStage;

#[async_trait]
impl Stage for ReportStage {
    fn step(&self) -> Step {
        Step::GenerateReport
    }

    fn checkpoint(&self) -> u8 {
        90
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        let overall = ctx.scoring.overall_score(state);
        let recommendations = ctx.scoring.recommendations(state, overall);

        state.comprehensive_report = render_report(state, overall, &recommendations);
        state.overall_score = overall;
        state.recommendations = recommendations;

        tracing::info!("Overall score {:.1}/100", overall * 100.0);
        Ok(())
    }
}

pub fn render_report(state: &WorkflowState, overall: f64, recommendations: &[String]) -> String {
    let invention = state.invention();
    let mut output = String::new();

    output.push_str("# Patent Analysis Report\n\n");

    output.push_str("## Executive Summary\n\n");
    output.push_str(&format!("**Invention:** {}\n\n", invention.title));
    output.push_str(&format!("**Technical field:** {}\n\n", invention.technical_field));
    output.push_str(&format!("**Overall score:** {:.1}/100\n\n", overall * 100.0));
    if let Some(first) = recommendations.first() {
        output.push_str(&format!("**Recommendation:** {}\n\n", first));
    }

    let novelty = state.result(ReportType::Novelty);
    output.push_str(&section_heading(1, "Novelty", "score", novelty));
    output.push_str(&analysis_body(novelty));
    output.push_str(&bullet_list(
        "Main innovations",
        &strings(novelty, "innovations"),
    ));

    let inventiveness = state.result(ReportType::Inventiveness);
    output.push_str(&section_heading(2, "Inventiveness", "score", inventiveness));
    output.push_str(&analysis_body(inventiveness));
    output.push_str(&field_line("Creativity level", inventiveness, "creativity_level"));

    let utility = state.result(ReportType::Utility);
    output.push_str(&section_heading(3, "Utility", "score", utility));
    output.push_str(&analysis_body(utility));
    output.push_str(&bullet_list(
        "Application scenarios",
        &strings(utility, "application_scenarios"),
    ));

    let market = state.result(ReportType::Market);
    output.push_str(&section_heading(4, "Market", "score", market));
    output.push_str(&analysis_body(market));
    output.push_str(&field_line("Market size", market, "market_size"));
    output.push_str(&field_line(
        "Commercialization potential",
        market,
        "commercialization_potential",
    ));

    let risk = state.result(ReportType::Risk);
    output.push_str(&section_heading(5, "Risk", "risk score", risk));
    output.push_str(&analysis_body(risk));
    output.push_str(&field_line("Overall risk level", risk, "overall_risk_level"));

    output.push_str("## 6. Search Coverage\n\n");
    output.push_str("| Source | Results |\n|--------|---------|\n");
    output.push_str(&format!("| Patents | {} |\n", state.patent_results.len()));
    output.push_str(&format!("| Academic | {} |\n", state.academic_results.len()));
    output.push_str(&format!("| Market | {} |\n\n", state.market_results.len()));

    output.push_str("## 7. Recommendations\n\n");
    for (i, recommendation) in recommendations.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, recommendation));
    }

    if state.has_errors() {
        output.push_str("\n## Incomplete Steps\n\n");
        for error in state.errors() {
            output.push_str(&format!("- {}\n", error));
        }
    }

    output.push_str(&format!(
        "\n---\n*Generated on {}*\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output
}

fn section_heading(index: u8, name: &str, label: &str, result: Option<&StageResult>) -> String {
    match result {
        Some(r) => format!("## {}. {} ({}: {:.0}/100)\n\n", index, name, label, r.score * 100.0),
        None => format!("## {}. {} ({}: N/A)\n\n", index, name, label),
    }
}

fn analysis_body(result: Option<&StageResult>) -> String {
    match result {
        Some(r) if !r.analysis_text.trim().is_empty() => format!("{}\n\n", r.analysis_text.trim()),
        _ => "N/A\n\n".to_string(),
    }
}

fn field_line(label: &str, result: Option<&StageResult>, key: &str) -> String {
    let value = result.and_then(|r| r.metadata_str(key)).unwrap_or("N/A");
    format!("**{}:** {}\n\n", label, value)
}

fn strings(result: Option<&StageResult>, key: &str) -> Vec<String> {
    result.map(|r| r.metadata_strings(key)).unwrap_or_default()
}

fn bullet_list(label: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut output = format!("**{}:**\n\n", label);
    for item in items {
        output.push_str(&format!("- {}\n", item));
    }
    output.push('\n');
    output
}
