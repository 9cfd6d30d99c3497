use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use deepsearch_core::{Error, Result, ToolTransport, TOOL_DEEPSEARCH_WEB};

use crate::config::DeepSearchConfig;

/// Name of the forced function call the upstream model must answer with.
pub const RESPONSE_FUNCTION_NAME: &str = "format_deepsearch_response";

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Turns a tool invocation into one chat-completions call against the
/// configured OpenAI-compatible endpoint and recovers the normalized
/// `{items, metadata, usage}` mapping from the model output.
///
/// No retries, no caching: a failed call surfaces immediately.
pub struct DeepSearchTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    closed: AtomicBool,
}

impl DeepSearchTransport {
    pub fn new(config: DeepSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Api(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url,
            api_key: config.api_key,
            model: config.model,
            timeout: config.timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DeepSearchConfig::from_env()?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn endpoint_chat_completions(&self) -> String {
        // base_url is normalized to scheme+host, so plain concatenation is safe.
        format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url)
    }

    fn build_request(&self, tool_name: &str, payload: &Value) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt(tool_name).to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: payload.to_string(),
                },
            ],
            temperature: 0.1,
            top_p: 0.9,
            stream: false,
            response_format: json!({"type": "json_object"}),
            tools: response_tool_schema(),
            tool_choice: json!({
                "type": "function",
                "function": {"name": RESPONSE_FUNCTION_NAME}
            }),
        }
    }
}

#[async_trait::async_trait]
impl ToolTransport for DeepSearchTransport {
    async fn invoke_tool(&self, tool_name: &str, payload: Value) -> Result<Value> {
        let request = self.build_request(tool_name, &payload);
        tracing::debug!(tool_name, model = %self.model, "posting chat-completions request");

        let response = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(self.timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api(format!("chat.completions HTTP {status}")));
        }

        let body: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| Error::BadResponse(e.to_string()))?;
        parse_response(body)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("deepsearch transport closed");
        }
        Ok(())
    }
}

fn system_prompt(tool_name: &str) -> &'static str {
    if tool_name == TOOL_DEEPSEARCH_WEB {
        "你是 DeepSearch-Website 工具，必须返回 JSON，其中 items 为命中网站结果，\
         metadata 至少包含 source 字段；确保 filters 中 site/time_range 限制生效。"
    } else {
        "你是 DeepSearch 通用检索工具，必须返回 JSON，其中 items 为查询相关结果列表，\
         metadata 包含来源与延迟信息，usage 提供 token 统计。"
    }
}

fn response_tool_schema() -> Value {
    json!([{
        "type": "function",
        "function": {
            "name": RESPONSE_FUNCTION_NAME,
            "description": "格式化 DeepSearch 的结构化响应",
            "parameters": {
                "type": "object",
                "properties": {
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {"type": "string"},
                                "snippet": {"type": "string"},
                                "url": {"type": "string", "format": "uri"},
                                "score": {"type": ["number", "null"]}
                            },
                            "required": ["title", "url"]
                        }
                    },
                    "metadata": {"type": "object"},
                    "usage": {"type": "object"}
                },
                "required": ["items"]
            }
        }
    }])
}

fn parse_response(body: ChatCompletionsResponse) -> Result<Value> {
    let outer_usage = body.usage.unwrap_or_default();

    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| Error::BadResponse("response is missing message content".to_string()))?;

    let payload: Value = serde_json::from_str(&content)
        .map_err(|_| Error::BadResponse("message content is not valid JSON".to_string()))?;
    let payload = payload
        .as_object()
        .ok_or_else(|| Error::BadResponse("message content is not a JSON object".to_string()))?;

    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let metadata = payload
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // All-or-nothing fallback: only a missing or empty in-content usage map
    // defers to the provider-level counters. Partial maps pass through as-is.
    let usage = match payload.get("usage").and_then(Value::as_object) {
        Some(u) if !u.is_empty() => Value::Object(u.clone()),
        _ => json!({
            "input_tokens": outer_usage.prompt_tokens,
            "output_tokens": outer_usage.completion_tokens,
        }),
    };

    Ok(json!({
        "items": items,
        "metadata": metadata,
        "usage": usage,
    }))
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    top_p: f64,
    stream: bool,
    response_format: Value,
    tools: Value,
    tool_choice: Value,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ProviderUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}
