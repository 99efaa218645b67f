use async_trait::async_trait;

use crate::error::Result;
use crate::models::{SearchResult, SourceKind};

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, source: SourceKind) -> Result<Vec<SearchResult>>;
    fn name(&self) -> &str;
}
