use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("api request failed: {0}")]
    Api(String),
    #[error("bad api response: {0}")]
    BadResponse(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tool exposed for broad retrieval.
pub const TOOL_DEEPSEARCH: &str = "deepsearch";
/// Tool exposed for site/time-scoped retrieval.
pub const TOOL_DEEPSEARCH_WEB: &str = "deepsearch-web";

pub const DEFAULT_TOP_K: i64 = 5;
pub const DEFAULT_LOCALE: &str = "zh-CN";

/// One search call, as shaped by a caller before validation.
///
/// `filters` is an opaque string-keyed mapping: callers may put anything in
/// it, and scoped tools only look at the keys they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: i64,
    pub locale: String,
    #[serde(default)]
    pub filters: Map<String, Value>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            locale: DEFAULT_LOCALE.to_string(),
            filters: Map::new(),
        }
    }
}

/// One normalized hit. Missing optional fields default instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub url: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

/// Normalized response of a search tool call.
///
/// `metadata` is provider-supplied and passed through unchanged; unknown keys
/// must be preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<ResultItem>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub usage: TokenUsage,
}

#[async_trait::async_trait]
pub trait ToolTransport: Send + Sync {
    /// Invoke a downstream tool and return the normalized
    /// `{items, metadata, usage}` mapping.
    async fn invoke_tool(&self, tool_name: &str, payload: Value) -> Result<Value>;

    /// Release any underlying connection resource. Must be idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait SearchAgent: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult>;

    /// Release owned resources. Must be idempotent; never releases an
    /// injected transport.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
