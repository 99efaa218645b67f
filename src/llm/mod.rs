pub mod provider;
pub mod gemini;
pub mod prompts;
pub mod parser;

pub use provider::LLMProvider;
pub use gemini::GeminiProvider;
pub use parser::{parse_llm_response, ParsedResponse};
