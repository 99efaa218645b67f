pub mod config;
pub mod error;
pub mod models;
pub mod llm;
pub mod search;
pub mod retry;
pub mod analysis;
pub mod storage;

pub use config::{Config, PipelineConfig, RetryPolicy};
pub use error::{Error, Result, StageError, StageErrorKind};
pub use llm::{GeminiProvider, LLMProvider};
pub use search::{SearchProvider, SerpProvider};
pub use analysis::{AnalysisPipeline, ScoreWeights};
pub use storage::{AnalysisStore, SqliteStore};
