use std::sync::Arc;

use serde_json::{json, Map, Value};

use deepsearch_core::{
    Error, Result, ResultItem, SearchRequest, SearchResult, TokenUsage, ToolTransport,
    TOOL_DEEPSEARCH,
};

/// Validates a request, hands it to a transport, and normalizes the raw
/// `{items, metadata, usage}` mapping into typed records.
#[derive(Clone)]
pub struct DeepSearchClient {
    transport: Arc<dyn ToolTransport>,
    tool_name: String,
}

impl DeepSearchClient {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self::for_tool(transport, TOOL_DEEPSEARCH)
    }

    pub fn for_tool(transport: Arc<dyn ToolTransport>, tool_name: impl Into<String>) -> Self {
        Self {
            transport,
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        if request.top_k <= 0 {
            return Err(Error::InvalidParams(format!(
                "top_k must be a positive integer, got {}",
                request.top_k
            )));
        }

        // filters is always present downstream, empty when the caller had none.
        let payload = json!({
            "query": request.query,
            "top_k": request.top_k,
            "locale": request.locale,
            "filters": request.filters,
        });

        let raw = self.transport.invoke_tool(&self.tool_name, payload).await?;
        let raw = raw.as_object().ok_or_else(|| {
            Error::BadResponse("transport result must be a JSON object".to_string())
        })?;

        let items = raw
            .get("items")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(parse_item).collect())
            .unwrap_or_default();
        let metadata = raw
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let usage = normalize_usage(raw.get("usage"));

        Ok(SearchResult {
            items,
            metadata,
            usage,
        })
    }
}

/// Explicit default-filling: absent text fields become empty strings, an
/// absent score stays absent.
fn parse_item(item: &Value) -> ResultItem {
    ResultItem {
        title: string_field(item, "title"),
        snippet: string_field(item, "snippet"),
        url: string_field(item, "url"),
        score: item.get("score").and_then(Value::as_f64),
    }
}

fn string_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn normalize_usage(raw: Option<&Value>) -> TokenUsage {
    let Some(map) = raw.and_then(Value::as_object) else {
        return TokenUsage::default();
    };
    TokenUsage {
        input_tokens: int_field(map, "input_tokens"),
        output_tokens: int_field(map, "output_tokens"),
    }
}

fn int_field(map: &Map<String, Value>, key: &str) -> i64 {
    match map.get(key) {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        None => 0,
    }
}
