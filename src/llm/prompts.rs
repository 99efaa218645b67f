use crate::models::{ReportType, SearchResult, WorkflowState};

pub const EXAMINER_PREAMBLE: &str = "You are an experienced patent examiner and technology analyst. \
Answer only with a single JSON object matching the requested schema, without commentary.";

const NOVELTY_SCHEMA: &str = r#"{
    "analysis": "detailed novelty analysis (300-500 words)",
    "comparisons": [{"prior_art": "name of the prior art", "differences": "concrete differences"}],
    "novelty_assessment": "high|medium|low",
    "score": 0-100,
    "innovations": ["innovation"],
    "risks": ["risk to novelty"]
}"#;

const INVENTIVENESS_SCHEMA: &str = r#"{
    "analysis": "detailed analysis of non-obviousness (around 300 words)",
    "non_obvious_aspects": ["aspect"],
    "unexpected_effects": ["effect"],
    "problem_difficulty": "high|medium|low",
    "inventiveness_assessment": "high|medium|low",
    "score": 0-100,
    "creativity_level": "breakthrough|significant|ordinary|low"
}"#;

const UTILITY_SCHEMA: &str = r#"{
    "analysis": "industrial feasibility analysis (around 200 words)",
    "industrial_feasibility": "high|medium|low",
    "utility_assessment": "high|medium|low",
    "problems_solved": ["problem"],
    "application_scenarios": ["scenario"],
    "technology_readiness_level": "TRL 1-9",
    "score": 0-100
}"#;

const MARKET_SCHEMA: &str = r#"{
    "analysis": "summary of the market position",
    "market_size": "market size description",
    "competition_analysis": "competitive landscape",
    "commercialization_potential": "high|medium|low",
    "target_customers": ["customer group"],
    "market_trends": ["trend"],
    "score": 0-100
}"#;

const RISK_SCHEMA: &str = r#"{
    "analysis": "summary of the risk assessment",
    "infringement_risks": [{"risk": "description", "severity": "high|medium|low", "mitigation": "measure"}],
    "technical_risks": [{"risk": "description", "severity": "high|medium|low", "mitigation": "measure"}],
    "market_risks": [{"risk": "description", "severity": "high|medium|low", "mitigation": "measure"}],
    "legal_risks": [{"risk": "description", "severity": "high|medium|low", "mitigation": "measure"}],
    "overall_risk_level": "high|medium|low",
    "risk_score": 0-100 (higher means riskier)
}"#;

/// Prompt for the analysis stage producing `report_type`.
pub fn analysis_prompt(report_type: ReportType, state: &WorkflowState) -> String {
    match report_type {
        ReportType::Novelty => novelty_prompt(state),
        ReportType::Inventiveness => inventiveness_prompt(state),
        ReportType::Utility => utility_prompt(state),
        ReportType::Market => market_prompt(state),
        ReportType::Risk | ReportType::Comprehensive => risk_prompt(state),
    }
}

fn novelty_prompt(state: &WorkflowState) -> String {
    let invention = state.invention();
    let mut prior_art = format_results(state.patent_results.iter().take(5));
    if prior_art.is_empty() {
        prior_art = "(no related patents found)".to_string();
    }
    let literature = format_results(state.academic_results.iter().take(3));

    let mut prompt = format!(
        "{}\n\nAssess the novelty of the following invention.\n\n\
         Title: {}\nTechnical field: {}\nTechnical content: {}\n\n\
         Prior art patents:\n{}\n",
        EXAMINER_PREAMBLE,
        invention.title,
        invention.technical_field,
        invention.technical_content,
        prior_art
    );

    if !literature.is_empty() {
        prompt.push_str(&format!("\nRelated literature:\n{}\n", literature));
    }

    prompt.push_str(
        "\nProvide a detailed novelty analysis, a comparison with each prior art item, \
         a novelty score (0-100), the main innovations and potential novelty risks.\n\n",
    );
    prompt.push_str(&format!("Respond with JSON:\n{}\n", NOVELTY_SCHEMA));
    prompt
}

fn inventiveness_prompt(state: &WorkflowState) -> String {
    let invention = state.invention();
    let novelty = state.result(ReportType::Novelty);
    let novelty_score = novelty.map(|r| r.score * 100.0).unwrap_or(0.0);
    let innovations = novelty
        .map(|r| r.metadata_strings("innovations"))
        .unwrap_or_default();

    format!(
        "{}\n\nBuilding on the novelty analysis, assess the inventive step of this invention.\n\n\
         Title: {}\nTechnical field: {}\nTechnical content: {}\n\
         Novelty score: {:.0}\nMain innovations: {}\n\n\
         Evaluate the non-obviousness of the technical solution, any unexpected technical effects, \
         the difficulty of the problem solved, and give an inventiveness score (0-100).\n\n\
         Respond with JSON:\n{}\n",
        EXAMINER_PREAMBLE,
        invention.title,
        invention.technical_field,
        invention.technical_content,
        novelty_score,
        join_or_none(&innovations),
        INVENTIVENESS_SCHEMA
    )
}

fn utility_prompt(state: &WorkflowState) -> String {
    let invention = state.invention();
    format!(
        "{}\n\nAssess the practical utility and industrial applicability of this invention.\n\n\
         Title: {}\nTechnical field: {}\nTechnical content: {}\n\n\
         Evaluate industrial feasibility, the practical problems solved, application scenarios, \
         technology readiness, and give a utility score (0-100).\n\n\
         Respond with JSON:\n{}\n",
        EXAMINER_PREAMBLE,
        invention.title,
        invention.technical_field,
        invention.technical_content,
        UTILITY_SCHEMA
    )
}

fn market_prompt(state: &WorkflowState) -> String {
    let invention = state.invention();
    let scenarios = state
        .result(ReportType::Utility)
        .map(|r| r.metadata_strings("application_scenarios"))
        .unwrap_or_default();
    let mut market_info = format_results(state.market_results.iter());
    if market_info.is_empty() {
        market_info = "(no market information found)".to_string();
    }

    format!(
        "{}\n\nAnalyse the market value of this invention.\n\n\
         Title: {}\nTechnical field: {}\nApplication scenarios: {}\n\n\
         Market information:\n{}\n\n\
         Evaluate market size, the competitive landscape, commercialization potential, \
         target customers, and give a market value score (0-100).\n\n\
         Respond with JSON:\n{}\n",
        EXAMINER_PREAMBLE,
        invention.title,
        invention.technical_field,
        join_or_none(&scenarios),
        market_info,
        MARKET_SCHEMA
    )
}

fn risk_prompt(state: &WorkflowState) -> String {
    let invention = state.invention();
    let novelty_risks = state
        .result(ReportType::Novelty)
        .map(|r| r.metadata_strings("risks"))
        .unwrap_or_default();

    format!(
        "{}\n\nAssess the risks of filing a patent application for this invention.\n\n\
         Title: {}\nTechnical field: {}\nKnown novelty risks: {}\n\n\
         Evaluate infringement, technical implementation, market and legal risks, \
         and give an overall risk level and a risk score (0-100, higher is riskier).\n\n\
         Respond with JSON:\n{}\n",
        EXAMINER_PREAMBLE,
        invention.title,
        invention.technical_field,
        join_or_none(&novelty_risks),
        RISK_SCHEMA
    )
}

fn format_results<'a>(results: impl Iterator<Item = &'a SearchResult>) -> String {
    results
        .map(|r| format!("- {}: {}", r.title, r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join("; ")
    }
}
