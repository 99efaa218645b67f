use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::analysis::scoring::ScoringEngine;
use crate::config::PipelineConfig;
use crate::error::{Error, Result, StageError, StageErrorKind};
use crate::llm::LLMProvider;
use crate::models::{Step, WorkflowState};
use crate::search::SearchProvider;
use crate::storage::AnalysisStore;

/// Collaborators and settings shared by every stage of one run.
pub struct StageContext {
    pub search: Arc<dyn SearchProvider>,
    pub llm: Arc<dyn LLMProvider>,
    pub store: Arc<dyn AnalysisStore>,
    pub config: PipelineConfig,
    pub scoring: ScoringEngine,
    pub cancel: CancellationToken,
}

/// One named step of the pipeline.
///
/// A stage reports failure by returning a `StageError`; the executor records
/// it and moves on to the next stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn step(&self) -> Step;

    /// Progress reached when the stage starts.
    fn checkpoint(&self) -> u8;

    async fn execute(
        &self,
        state: &mut WorkflowState,
        ctx: &StageContext,
    ) -> std::result::Result<(), StageError>;
}

#[derive(Default)]
pub struct GraphBuilder {
    stages: HashMap<Step, Box<dyn Stage>>,
    duplicates: Vec<Step>,
    edges: Vec<(Step, Step)>,
    entry: Option<Step>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(mut self, stage: impl Stage + 'static) -> Self {
        let step = stage.step();
        if self.stages.insert(step, Box::new(stage)).is_some() {
            self.duplicates.push(step);
        }
        self
    }

    pub fn add_edge(mut self, from: Step, to: Step) -> Self {
        self.edges.push((from, to));
        self
    }

    pub fn set_entry(mut self, step: Step) -> Self {
        self.entry = Some(step);
        self
    }

    /// Resolve the registered stages into a single linear chain starting at
    /// the entry point.
    pub fn compile(mut self) -> Result<StageGraph> {
        if let Some(step) = self.duplicates.first() {
            return Err(Error::InvalidGraph(format!("{} registered twice", step)));
        }

        let entry = self
            .entry
            .ok_or_else(|| Error::InvalidGraph("no entry point".to_string()))?;
        if !self.stages.contains_key(&entry) {
            return Err(Error::InvalidGraph(format!("unknown entry point {}", entry)));
        }

        let mut next: HashMap<Step, Step> = HashMap::new();
        let mut has_incoming: HashSet<Step> = HashSet::new();
        for (from, to) in &self.edges {
            for endpoint in [from, to] {
                if !self.stages.contains_key(endpoint) {
                    return Err(Error::InvalidGraph(format!(
                        "edge {} -> {} references unknown stage {}",
                        from, to, endpoint
                    )));
                }
            }
            if next.insert(*from, *to).is_some() {
                return Err(Error::InvalidGraph(format!("{} branches", from)));
            }
            if !has_incoming.insert(*to) {
                return Err(Error::InvalidGraph(format!("{} has more than one predecessor", to)));
            }
        }

        let mut order = vec![entry];
        let mut visited = HashSet::from([entry]);
        let mut current = entry;
        while let Some(&following) = next.get(&current) {
            if !visited.insert(following) {
                return Err(Error::InvalidGraph(format!("cycle through {}", following)));
            }
            order.push(following);
            current = following;
        }

        if order.len() != self.stages.len() {
            let mut unreachable: Vec<_> = self
                .stages
                .keys()
                .filter(|step| !visited.contains(*step))
                .map(|step| step.as_str())
                .collect();
            unreachable.sort_unstable();
            return Err(Error::InvalidGraph(format!(
                "unreachable stages: {}",
                unreachable.join(", ")
            )));
        }

        let stages = order
            .iter()
            .filter_map(|step| self.stages.remove(step))
            .collect();

        Ok(StageGraph { stages })
    }
}

/// A validated stage chain, ready to run.
pub struct StageGraph {
    stages: Vec<Box<dyn Stage>>,
}

impl StageGraph {
    pub fn steps(&self) -> Vec<Step> {
        self.stages.iter().map(|s| s.step()).collect()
    }

    /// Run every stage in order over `state`. Stage failures are recorded and
    /// never stop the run; cancellation stops it before the next stage.
    pub async fn run(&self, mut state: WorkflowState, ctx: &StageContext) -> WorkflowState {
        let pb = progress_bar(ctx.config.show_progress);

        for stage in &self.stages {
            let step = stage.step();

            if ctx.cancel.is_cancelled() {
                if !state.is_cancelled() {
                    state.record_error(StageError::new(
                        step,
                        StageErrorKind::Cancelled,
                        "analysis cancelled",
                    ));
                }
                break;
            }

            state.enter(step, stage.checkpoint());
            pb.set_position(state.progress() as u64);
            pb.set_message(step.as_str());
            tracing::info!(
                analysis_id = state.analysis_id(),
                progress = state.progress(),
                "Running {}",
                step
            );

            if let Err(err) = stage.execute(&mut state, ctx).await {
                state.record_error(err);
            }
            pb.set_position(state.progress() as u64);
        }

        if state.has_errors() {
            pb.abandon_with_message("finished with errors");
        } else {
            pb.finish_with_message("done");
        }

        state
    }
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
