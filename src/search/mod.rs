pub mod provider;
pub mod serp;
pub mod rate_limiter;
pub mod dedup;

pub use provider::SearchProvider;
pub use serp::SerpProvider;
pub use rate_limiter::RateLimiter;
pub use dedup::append_unique;
