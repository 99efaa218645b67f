pub mod graph;
pub mod pipeline;
pub mod scoring;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use graph::{GraphBuilder, Stage, StageContext, StageGraph};
pub use pipeline::AnalysisPipeline;
pub use scoring::{ScoreWeights, ScoringEngine};
