use async_trait::async_trait;
use crate::error::Result;

/// Text generation backend. The returned text carries no structural guarantee;
/// callers run it through [`crate::llm::parser::parse_llm_response`].
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &str;
}
