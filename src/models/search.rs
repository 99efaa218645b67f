use serde::{Deserialize, Serialize};

/// Which index a query is sent to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Generic,
    Patent,
    Scholar,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Generic => write!(f, "generic"),
            SourceKind::Patent => write!(f, "patent"),
            SourceKind::Scholar => write!(f, "scholar"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source: SourceKind,
    pub position: u32,
    /// Provider-specific extras (patent id, authors, citation count, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, link: impl Into<String>, source: SourceKind) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            snippet: String::new(),
            source,
            position: 0,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }
}
