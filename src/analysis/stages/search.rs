use async_trait::async_trait;
use futures::future::join_all;

use crate::analysis::graph::{Stage, StageContext};
use crate::error::{Result, StageError, StageErrorKind};
use crate::models::{Invention, SearchResult, SourceKind, Step, WorkflowState};
use crate::retry::with_retry;
use crate::search::append_unique;

async fn run_search(ctx: &StageContext, query: &str, source: SourceKind) -> Result<Vec<SearchResult>> {
    with_retry(&ctx.config.retry, &ctx.cancel, "search", || {
        ctx.search.search(query, source)
    })
    .await
}

/// Title, field plus title, and the opening of the description. Blank
/// queries are dropped.
pub fn patent_queries(invention: &Invention) -> Vec<String> {
    let description: String = invention.description.chars().take(100).collect();
    [
        invention.title.clone(),
        format!("{} {}", invention.technical_field, invention.title),
        description,
    ]
    .into_iter()
    .map(|q| q.trim().to_string())
    .filter(|q| !q.is_empty())
    .collect()
}

pub fn academic_query(invention: &Invention) -> String {
    format!("{} {}", invention.technical_field, invention.title)
        .trim()
        .to_string()
}

pub fn market_query(invention: &Invention) -> String {
    format!(
        "{} market analysis {} commercial",
        invention.technical_field, invention.title
    )
    .trim()
    .to_string()
}

pub struct PatentSearchStage;

#[async_trait]
impl Stage for PatentSearchStage {
    fn step(&self) -> Step {
        Step::PatentSearch
    }

    fn checkpoint(&self) -> u8 {
        10
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        let queries = patent_queries(state.invention());
        let per_query = ctx.config.patent_results_per_query;
        let limit = ctx.config.max_patent_results;

        let outcomes = join_all(
            queries
                .iter()
                .map(|query| run_search(ctx, query, SourceKind::Patent)),
        )
        .await;

        // Merge in query order so dedup keeps the earliest query's hit
        let mut failure = None;
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(results) => {
                    append_unique(
                        &mut state.patent_results,
                        results.into_iter().take(per_query),
                        limit,
                    );
                }
                Err(err) => {
                    tracing::warn!("Patent query '{}' failed: {}", query, err);
                    failure.get_or_insert(err);
                }
            }
        }

        tracing::info!("Found {} related patents", state.patent_results.len());

        match failure {
            Some(err) => Err(StageError::from_error(
                self.step(),
                StageErrorKind::Search,
                &err,
            )),
            None => Ok(()),
        }
    }
}

pub struct AcademicSearchStage;

#[async_trait]
impl Stage for AcademicSearchStage {
    fn step(&self) -> Step {
        Step::AcademicSearch
    }

    fn checkpoint(&self) -> u8 {
        20
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        let query = academic_query(state.invention());
        let results = run_search(ctx, &query, SourceKind::Scholar)
            .await
            .map_err(|e| StageError::from_error(self.step(), StageErrorKind::Search, &e))?;

        append_unique(
            &mut state.academic_results,
            results,
            ctx.config.max_academic_results,
        );
        tracing::info!("Found {} academic papers", state.academic_results.len());
        Ok(())
    }
}

pub struct MarketSearchStage;

#[async_trait]
impl Stage for MarketSearchStage {
    fn step(&self) -> Step {
        Step::MarketSearch
    }

    fn checkpoint(&self) -> u8 {
        30
    }

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError> {
        let query = market_query(state.invention());
        let results = run_search(ctx, &query, SourceKind::Generic)
            .await
            .map_err(|e| StageError::from_error(self.step(), StageErrorKind::Search, &e))?;

        append_unique(
            &mut state.market_results,
            results,
            ctx.config.max_market_results,
        );
        tracing::info!("Found {} market sources", state.market_results.len());
        Ok(())
    }
}
