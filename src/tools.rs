//! # Tools Module
//!
//! The web-search capability used by the Searcher delegate. Searches go to
//! DuckDuckGo's HTML endpoint (no API key needed) and the hits are handed
//! back to the model as a markdown list through Rig's `Tool` trait.

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const DUCKDUCKGO_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
/// Errors from a single web search.
///
/// Rig's `Tool` trait requires `std::error::Error`, which thiserror derives.
/// When the tool fails inside the Searcher's agent loop, Rig reports the
/// message to the model; when the whole search call fails, the Searcher
/// turns it into a degraded result.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to perform web search: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

// =============================================================================
// SEARCH HIT
// =============================================================================
/// A single hit from the search page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

// =============================================================================
// WEB SEARCH TOOL
// =============================================================================
/// DuckDuckGo-backed web search.
///
/// # Rust Concept: Cheap Clones
///
/// `reqwest::Client` keeps its connection pool behind an `Arc`, so cloning
/// the tool into every Searcher agent shares one pool for the process.
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(max_results: usize) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: DUCKDUCKGO_HTML_ENDPOINT.to_string(),
            max_results,
        })
    }

    /// Point the tool at another HTML endpoint (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        info!(query = %query, "Performing web search");

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::SearchFailed(format!("HTTP {}", status)));
        }

        let body = response.text().await?;
        let hits = parse_results(&body, self.max_results);

        if hits.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = hits.len(), "Search completed");
        }

        Ok(hits)
    }
}

// =============================================================================
// HTML PARSING
// =============================================================================
/// Pull result titles, target URLs and snippets out of the HTML page.
///
/// Every result anchor carries `class="result__a"` and links through a
/// redirect whose `uddg` parameter holds the real URL. The snippet anchor
/// (`result__snippet`) follows inside the same result block.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let mut seen = HashSet::new();

    for block in html.split("class=\"result__a\"").skip(1) {
        if hits.len() >= max_results {
            break;
        }

        let Some(url) = attribute(block, "href").and_then(|href| resolve_link(&href)) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = anchor_text(block).unwrap_or_else(|| url.clone());
        let snippet = block
            .find("result__snippet")
            .and_then(|at| anchor_text(&block[at..]))
            .unwrap_or_default();

        hits.push(SearchHit {
            title,
            url,
            snippet,
        });
    }

    hits
}

/// Value of the first `name="..."` attribute in `fragment`.
fn attribute(fragment: &str, name: &str) -> Option<String> {
    let marker = format!("{}=\"", name);
    let start = fragment.find(&marker)? + marker.len();
    let end = fragment[start..].find('"')?;
    Some(decode_entities(&fragment[start..start + end]))
}

/// Turn a result href into the destination URL.
fn resolve_link(href: &str) -> Option<String> {
    if let Some(at) = href.find("uddg=") {
        let encoded = &href[at + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        let url = urlencoding::decode(encoded).ok()?.into_owned();
        return url.starts_with("http").then_some(url);
    }
    if href.starts_with("http") && !href.contains("duckduckgo.com") {
        return Some(href.to_string());
    }
    None
}

/// Text content between the end of the current tag and the next `</a>`.
fn anchor_text(fragment: &str) -> Option<String> {
    let start = fragment.find('>')? + 1;
    let end = fragment[start..].find("</a>")?;
    let text = collapse_whitespace(&strip_tags(&fragment[start..start + end]));
    (!text.is_empty()).then_some(text)
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(&out)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render hits the way the model sees them.
fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for: {}", query);
    }

    let formatted = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. **{}**\n   URL: {}\n   {}\n",
                i + 1,
                hit.title,
                hit.url,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("## Search Results for: {}\n\n{}", query, formatted)
}

// =============================================================================
// RIG TOOL TRAIT IMPLEMENTATION
// =============================================================================
/// Input arguments for the search tool.
#[derive(Debug, Deserialize, Serialize)]
pub struct SearchArgs {
    pub query: String,
}

impl Tool for WebSearchTool {
    const NAME: &'static str = "web_search";

    type Args = SearchArgs;
    type Output = String;
    type Error = SearchError;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search the web for a term and return the top result titles, URLs and snippets."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search term to look up"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let hits = self.search(&args.query).await?;
        Ok(format_hits(&args.query, &hits))
    }
}
