use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{SearchResult, SourceKind};
use crate::search::provider::SearchProvider;
use crate::search::rate_limiter::RateLimiter;

const DEFAULT_BASE_URL: &str = "https://serpapi.com/search";

/// SerpAPI-backed search over Google, Google Patents and Google Scholar.
pub struct SerpProvider {
    client: Client,
    rate_limiter: RateLimiter,
    api_key: String,
    base_url: String,
    language: String,
    country: String,
    num_results: u32,
}

impl SerpProvider {
    pub fn new(api_key: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("patentscope/0.1"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::default(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "en".to_string(),
            country: "us".to_string(),
            num_results: 10,
        })
    }

    pub fn with_locale(mut self, language: &str, country: &str) -> Self {
        self.language = language.to_string();
        self.country = country.to_string();
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limiter = RateLimiter::new(per_minute);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_params(&self, query: &str, source: SourceKind) -> Vec<(&'static str, String)> {
        let (engine, q) = match source {
            SourceKind::Patent => ("google", format!("site:patents.google.com {}", query)),
            SourceKind::Scholar => ("google_scholar", query.to_string()),
            SourceKind::Generic => ("google", query.to_string()),
        };

        let mut params = vec![
            ("engine", engine.to_string()),
            ("q", q),
            ("num", self.num_results.to_string()),
            ("hl", self.language.clone()),
            ("api_key", self.api_key.clone()),
        ];
        // Scholar does not take a country parameter
        if source != SourceKind::Scholar {
            params.push(("gl", self.country.clone()));
        }
        params
    }
}

#[async_trait]
impl SearchProvider for SerpProvider {
    async fn search(&self, query: &str, source: SourceKind) -> Result<Vec<SearchResult>> {
        self.rate_limiter.wait().await;
        tracing::debug!("Searching {} for: {}", source, query);

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.build_params(query, source))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30);
            self.rate_limiter
                .throttled(Duration::from_secs(retry_after))
                .await;
            return Err(Error::RateLimited(retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: "SerpAPI",
                status: status.as_u16(),
                message: body,
            });
        }

        let body: Value = response.json().await?;
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            // SerpAPI reports "no results" as an error payload
            if message.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(Error::SearchApi(message.to_string()));
        }

        Ok(parse_organic_results(&body, source))
    }

    fn name(&self) -> &str {
        "SerpAPI"
    }
}

/// Map a SerpAPI response body into search results.
pub fn parse_organic_results(body: &Value, source: SourceKind) -> Vec<SearchResult> {
    let Some(items) = body.get("organic_results").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let text = |key: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let link = text("link");
            let position = item
                .get("position")
                .and_then(Value::as_u64)
                .map(|p| p as u32)
                .unwrap_or(index as u32 + 1);

            let metadata = match source {
                SourceKind::Patent => json!({
                    "patent_id": extract_patent_id(&link),
                }),
                SourceKind::Scholar => {
                    let summary = item
                        .pointer("/publication_info/summary")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    json!({
                        "authors": parse_authors(summary),
                        "year": extract_year(summary),
                        "cited_by": item
                            .pointer("/inline_links/cited_by/total")
                            .and_then(Value::as_u64)
                            .unwrap_or(0),
                    })
                }
                SourceKind::Generic => json!({
                    "source_type": identify_source(&link),
                    "date": item.get("date").and_then(Value::as_str),
                }),
            };

            SearchResult {
                title: text("title"),
                link,
                snippet: text("snippet"),
                source,
                position,
                metadata,
            }
        })
        .collect()
}

fn extract_patent_id(link: &str) -> Option<String> {
    let (_, rest) = link.split_once("patents.google.com/patent/")?;
    rest.split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}

fn identify_source(url: &str) -> &'static str {
    if url.contains("patents.google.com") {
        "google_patents"
    } else if url.contains("scholar.google.com") {
        "google_scholar"
    } else if url.contains("github.com") {
        "github"
    } else if url.contains("arxiv.org") {
        "arxiv"
    } else if [".edu", "university", "academic"].iter().any(|d| url.contains(d)) {
        "academic"
    } else if url.contains("wikipedia") {
        "encyclopedia"
    } else {
        "web"
    }
}

/// Authors precede the first " - " in a Scholar publication summary.
fn parse_authors(summary: &str) -> Vec<String> {
    match summary.split_once(" - ") {
        Some((authors, _)) => authors
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(ToString::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// First standalone 19xx/20xx number in the summary.
fn extract_year(summary: &str) -> Option<u32> {
    summary
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 4)
        .filter(|token| token.starts_with("19") || token.starts_with("20"))
        .find_map(|token| token.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_patent_results() {
        let body = json!({
            "organic_results": [
                {
                    "position": 1,
                    "title": "US1234567B2 - Solar window",
                    "link": "https://patents.google.com/patent/US1234567B2/en",
                    "snippet": "A window comprising..."
                },
                {
                    "title": "Untitled",
                    "link": "https://example.com"
                }
            ]
        });

        let results = parse_organic_results(&body, SourceKind::Patent);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata["patent_id"], "US1234567B2");
        assert_eq!(results[0].source, SourceKind::Patent);
        assert_eq!(results[1].position, 2);
        assert_eq!(results[1].snippet, "");
        assert!(results[1].metadata["patent_id"].is_null());
    }

    #[test]
    fn test_parse_scholar_metadata() {
        let body = json!({
            "organic_results": [{
                "position": 3,
                "title": "Transparent photovoltaics",
                "link": "https://example.org/paper",
                "publication_info": {"summary": "A Smith, B Jones - Nature Energy, 2019 - nature.com"},
                "inline_links": {"cited_by": {"total": 412}}
            }]
        });

        let results = parse_organic_results(&body, SourceKind::Scholar);
        assert_eq!(results[0].metadata["authors"], json!(["A Smith", "B Jones"]));
        assert_eq!(results[0].metadata["year"], 2019);
        assert_eq!(results[0].metadata["cited_by"], 412);
    }

    #[test]
    fn test_missing_organic_results() {
        assert!(parse_organic_results(&json!({}), SourceKind::Generic).is_empty());
    }

    #[test]
    fn test_identify_source() {
        assert_eq!(identify_source("https://arxiv.org/abs/1234"), "arxiv");
        assert_eq!(identify_source("https://cs.stanford.edu/paper"), "academic");
        assert_eq!(identify_source("https://news.example.com"), "web");
    }

    #[test]
    fn test_extract_year_ignores_longer_numbers() {
        assert_eq!(extract_year("Vol 123456, 2021"), Some(2021));
        assert_eq!(extract_year("no year here"), None);
    }

    #[test]
    fn test_patent_query_is_site_scoped() {
        let provider = SerpProvider::new("key").unwrap();
        let params = provider.build_params("solar window", SourceKind::Patent);
        assert!(params.contains(&("q", "site:patents.google.com solar window".to_string())));
        assert!(params.contains(&("engine", "google".to_string())));

        let params = provider.build_params("solar window", SourceKind::Scholar);
        assert!(params.contains(&("engine", "google_scholar".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "gl"));
    }
}
