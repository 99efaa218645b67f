use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use patentscope::config::database_path;
use patentscope::models::{
    AnalysisProgress, AnalysisRecord, AnalysisRequest, AnalysisSummary, NewAnalysis,
    ReportRecord, ReportType,
};
use patentscope::{
    AnalysisPipeline, AnalysisStore, Config, GeminiProvider, PipelineConfig, SerpProvider,
    SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "patentscope")]
#[command(version = "0.1.0")]
#[command(about = "Assess a patent application against prior art, literature and market data")]
struct Cli {
    /// Output format (json, text, markdown)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// Output file (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis pipeline for an invention
    Analyze {
        /// Invention title
        #[arg(long)]
        title: String,

        /// Short description of the invention
        #[arg(long, default_value = "")]
        description: String,

        /// Technical field, e.g. "optics"
        #[arg(long, default_value = "")]
        field: String,

        /// Technical content inline
        #[arg(long, default_value = "", conflicts_with = "content_file")]
        content: String,

        /// Read the technical content from a file
        #[arg(long)]
        content_file: Option<String>,

        #[arg(long, default_value = "local")]
        user_id: String,

        /// Reuse a fixed analysis id instead of generating one
        #[arg(long)]
        analysis_id: Option<String>,

        /// Override MAX_RETRIES
        #[arg(long)]
        max_retries: Option<u32>,

        /// Override REQUEST_TIMEOUT_SECS
        #[arg(long)]
        timeout: Option<u64>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show status and progress of an analysis
    Status { analysis_id: String },

    /// Show stored reports of an analysis
    Reports {
        analysis_id: String,

        /// Only this report type (novelty, inventiveness, utility, market, risk, comprehensive)
        #[arg(long)]
        report_type: Option<String>,
    },

    /// List a user's analyses, newest first
    List {
        #[arg(long, default_value = "local")]
        user_id: String,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("patentscope=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.database.clone().unwrap_or_else(database_path);

    match &cli.command {
        Command::Analyze {
            title,
            description,
            field,
            content,
            content_file,
            user_id,
            analysis_id,
            max_retries,
            timeout,
            no_progress,
        } => {
            let mut config = Config::from_env()?;
            if let Some(max_retries) = max_retries {
                config.max_retries = *max_retries;
            }
            if let Some(timeout) = timeout {
                config.request_timeout_secs = *timeout;
            }

            let technical_content = match content_file {
                Some(path) => std::fs::read_to_string(path)?,
                None => content.clone(),
            };

            let request = AnalysisRequest {
                analysis_id: analysis_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                user_id: user_id.clone(),
                title: title.clone(),
                description: description.clone(),
                technical_field: field.clone(),
                technical_content,
            };

            let store: Arc<dyn AnalysisStore> = Arc::new(SqliteStore::new(&db_path)?);
            let search = SerpProvider::new(&config.serpapi_key)?
                .with_locale(&config.search_language, &config.search_country)
                .with_rate_limit(config.searches_per_minute);
            let llm = GeminiProvider::new(
                config.gemini_api_key.clone(),
                Some(config.gemini_model.clone()),
            )?;

            let pipeline_config = PipelineConfig {
                show_progress: !no_progress,
                ..PipelineConfig::from(&config)
            };

            let pipeline = Arc::new(AnalysisPipeline::new(
                Arc::new(search),
                Arc::new(llm),
                store.clone(),
                pipeline_config,
            )?);

            if store.get_analysis(&request.analysis_id).await?.is_none() {
                store.create_analysis(&NewAnalysis::from(&request)).await?;
            }

            // Ctrl-C cancels the run; the pipeline records the cancellation
            let canceller = {
                let pipeline = pipeline.clone();
                let analysis_id = request.analysis_id.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        pipeline.cancel(&analysis_id);
                    }
                })
            };

            tracing::info!("Starting analysis {} for: {}", request.analysis_id, request.title);
            let summary = pipeline.run_analysis(request).await;
            canceller.abort();

            let report = store
                .get_reports(&summary.analysis_id)
                .await?
                .into_iter()
                .find(|r| r.report_type == ReportType::Comprehensive);

            let output = match cli.format.as_str() {
                "json" => serde_json::to_string_pretty(&summary)?,
                "markdown" => match report {
                    Some(report) => report.content,
                    None => format_summary_text(&summary),
                },
                _ => format_summary_text(&summary),
            };
            write_output(&output, cli.output.as_deref())?;

            if !summary.success {
                std::process::exit(1);
            }
        }

        Command::Status { analysis_id } => {
            let store = SqliteStore::new(&db_path)?;
            let Some(progress) = store.get_progress(analysis_id).await? else {
                anyhow::bail!("Analysis not found: {}", analysis_id);
            };

            let output = match cli.format.as_str() {
                "json" => serde_json::to_string_pretty(&progress)?,
                "markdown" => format_progress_markdown(&progress),
                _ => format_progress_text(&progress),
            };
            write_output(&output, cli.output.as_deref())?;
        }

        Command::Reports {
            analysis_id,
            report_type,
        } => {
            let wanted = report_type
                .as_deref()
                .map(str::parse::<ReportType>)
                .transpose()
                .map_err(anyhow::Error::msg)?;

            let store = SqliteStore::new(&db_path)?;
            if store.get_analysis(analysis_id).await?.is_none() {
                anyhow::bail!("Analysis not found: {}", analysis_id);
            }

            let reports: Vec<_> = store
                .get_reports(analysis_id)
                .await?
                .into_iter()
                .filter(|r| wanted.map_or(true, |t| r.report_type == t))
                .collect();

            let output = match cli.format.as_str() {
                "json" => serde_json::to_string_pretty(&reports)?,
                "markdown" => format_reports_markdown(&reports),
                _ => format_reports_text(&reports),
            };
            write_output(&output, cli.output.as_deref())?;
        }

        Command::List {
            user_id,
            limit,
            offset,
        } => {
            let store = SqliteStore::new(&db_path)?;
            let analyses = store.list_analyses(user_id, *limit, *offset).await?;

            let output = match cli.format.as_str() {
                "json" => serde_json::to_string_pretty(&analyses)?,
                "markdown" => format_list_markdown(&analyses),
                _ => format_list_text(&analyses),
            };
            write_output(&output, cli.output.as_deref())?;
        }
    }

    Ok(())
}

fn write_output(output: &str, path: Option<&str>) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, output)?;
        tracing::info!("Output written to: {}", path);
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn format_summary_text(summary: &AnalysisSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n=== Analysis {} ===\n\n", summary.analysis_id));
    output.push_str(&format!(
        "Result: {}\n",
        if summary.success { "completed" } else { "failed" }
    ));
    output.push_str(&format!("Progress: {}%\n", summary.progress));
    if let Some(step) = summary.current_step {
        output.push_str(&format!("Last step: {}\n", step));
    }
    output.push_str(&format!(
        "Overall score: {:.1}/100\n",
        summary.overall_score * 100.0
    ));

    if !summary.recommendations.is_empty() {
        output.push_str("\nRecommendations:\n");
        for recommendation in &summary.recommendations {
            output.push_str(&format!("  - {}\n", recommendation));
        }
    }

    if let Some(ref error) = summary.error {
        output.push_str("\nErrors:\n");
        for part in error.split("; ") {
            output.push_str(&format!("  ! {}\n", part));
        }
    }

    output
}

fn format_progress_text(progress: &AnalysisProgress) -> String {
    let mut output = format!(
        "Analysis {}: {} ({}%)\n",
        progress.analysis_id, progress.status, progress.progress
    );

    let completed: Vec<_> = progress
        .completed_reports
        .iter()
        .map(ReportType::as_str)
        .collect();
    output.push_str(&format!(
        "Completed reports: {}\n",
        if completed.is_empty() {
            "none".to_string()
        } else {
            completed.join(", ")
        }
    ));

    if let Some(ref error) = progress.error_message {
        output.push_str(&format!("Error: {}\n", error));
    }
    output
}

fn format_progress_markdown(progress: &AnalysisProgress) -> String {
    let mut output = format!("# Analysis {}\n\n", progress.analysis_id);
    output.push_str("| Metric | Value |\n|--------|-------|\n");
    output.push_str(&format!("| Status | {} |\n", progress.status));
    output.push_str(&format!("| Progress | {}% |\n", progress.progress));
    output.push_str(&format!(
        "| Completed Reports | {} |\n",
        progress.completed_reports.len()
    ));
    if let Some(ref error) = progress.error_message {
        output.push_str(&format!("\n> {}\n", error));
    }
    output
}

fn format_reports_text(reports: &[ReportRecord]) -> String {
    if reports.is_empty() {
        return "No reports stored.\n".to_string();
    }

    let mut output = String::new();
    for report in reports {
        output.push_str(&format!(
            "\n=== {} (score {:.0}/100, updated {}) ===\n\n",
            report.report_type,
            report.score * 100.0,
            report.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&report.content);
        output.push('\n');
    }
    output
}

fn format_reports_markdown(reports: &[ReportRecord]) -> String {
    // The comprehensive report is already markdown
    if let Some(report) = reports
        .iter()
        .find(|r| r.report_type == ReportType::Comprehensive)
    {
        return report.content.clone();
    }

    let mut output = String::new();
    for report in reports {
        output.push_str(&format!(
            "## {} ({:.0}/100)\n\n{}\n\n",
            report.report_type,
            report.score * 100.0,
            report.content
        ));
    }
    output
}

fn format_list_text(analyses: &[AnalysisRecord]) -> String {
    if analyses.is_empty() {
        return "No analyses found.\n".to_string();
    }

    let mut output = String::new();
    for analysis in analyses {
        output.push_str(&format!(
            "{}  {:<10}  {}  {}\n",
            analysis.created_at.format("%Y-%m-%d %H:%M"),
            analysis.status,
            analysis.id,
            analysis.title
        ));
    }
    output
}

fn format_list_markdown(analyses: &[AnalysisRecord]) -> String {
    let mut output = String::new();
    output.push_str("| Created | Status | Id | Title |\n");
    output.push_str("|---------|--------|----|-------|\n");
    for analysis in analyses {
        output.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            analysis.created_at.format("%Y-%m-%d %H:%M"),
            analysis.status,
            analysis.id,
            analysis.title
        ));
    }
    output
}
