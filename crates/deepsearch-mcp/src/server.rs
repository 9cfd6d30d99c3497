use std::sync::Arc;

use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use deepsearch_client::{DeepSearchAgent, DeepSearchWebAgent};
use deepsearch_core::{
    Error, SearchAgent, SearchRequest, SearchResult, TOOL_DEEPSEARCH, TOOL_DEEPSEARCH_WEB,
};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct SearchArgs {
    /// 检索问题或关键词
    pub(crate) query: String,
    /// 返回结果数量（1-10，默认 5）
    #[serde(default)]
    #[schemars(range(min = 1, max = 10))]
    pub(crate) top_k: Option<i64>,
    /// 内容语言（默认 zh-CN）
    #[serde(default)]
    pub(crate) locale: Option<String>,
    /// 附加筛选条件，例如站点（site）或时间范围（time_range）
    #[serde(default)]
    pub(crate) filters: Option<Map<String, Value>>,
}

impl SearchArgs {
    fn into_request(self) -> SearchRequest {
        let mut request = SearchRequest::new(self.query);
        if let Some(top_k) = self.top_k {
            request.top_k = top_k;
        }
        if let Some(locale) = self.locale {
            request.locale = locale;
        }
        if let Some(filters) = self.filters {
            request.filters = filters;
        }
        request
    }
}

#[derive(Clone)]
pub(crate) struct DeepSearchMcp {
    tool_router: ToolRouter<Self>,
    general: Arc<dyn SearchAgent>,
    web: Arc<dyn SearchAgent>,
}

#[tool_router]
impl DeepSearchMcp {
    pub(crate) fn with_agents(general: Arc<dyn SearchAgent>, web: Arc<dyn SearchAgent>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            general,
            web,
        }
    }

    /// Tool-name dispatch. The rmcp router rejects unknown names on its own,
    /// but the server contract keeps this an explicit, testable step.
    pub(crate) async fn dispatch(
        &self,
        tool_name: &str,
        args: SearchArgs,
    ) -> deepsearch_core::Result<SearchResult> {
        let agent = match tool_name {
            TOOL_DEEPSEARCH => &self.general,
            TOOL_DEEPSEARCH_WEB => &self.web,
            other => return Err(Error::UnknownTool(other.to_string())),
        };
        agent.search(&args.into_request()).await
    }

    async fn call_search(
        &self,
        tool_name: &str,
        args: SearchArgs,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(tool_name, query = %args.query, "tool invocation");
        let result = self
            .dispatch(tool_name, args)
            .await
            .map_err(invocation_error)?;
        let payload =
            serde_json::to_value(&result).map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(tool_result(payload))
    }

    #[tool(
        name = "deepsearch",
        description = "使用 DeepSearch 模型执行广域检索，返回结构化结果。"
    )]
    async fn deepsearch(
        &self,
        params: Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.call_search(TOOL_DEEPSEARCH, params.0).await
    }

    #[tool(
        name = "deepsearch-web",
        description = "针对指定站点或时间范围进行定向检索（filters 必须包含 site 或 time_range）。"
    )]
    async fn deepsearch_web(
        &self,
        params: Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.call_search(TOOL_DEEPSEARCH_WEB, params.0).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for DeepSearchMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "提供 deepsearch 与 deepsearch-web 工具，用于联网检索最新信息。".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn tool_result(payload: Value) -> CallToolResult {
    // Structured content for machine consumers, plus a pretty text block for
    // clients that only read `content[0].text`.
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    let mut r = CallToolResult::structured(payload);
    r.content = vec![Content::text(text)];
    r
}

fn invocation_error(e: Error) -> McpError {
    match &e {
        Error::InvalidParams(_) | Error::UnknownTool(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        _ => McpError::internal_error(e.to_string(), None),
    }
}

/// Close every server-constructed agent, once each. A failing close is
/// logged and suppressed so it cannot block the remaining agents.
pub(crate) fn close_agents(agents: &[Arc<dyn SearchAgent>]) {
    for agent in agents {
        if let Err(e) = agent.close() {
            tracing::warn!(error = %e, "agent close failed during shutdown");
        }
    }
}

pub(crate) async fn serve_stdio() -> Result<(), McpError> {
    let general: Arc<dyn SearchAgent> = Arc::new(
        DeepSearchAgent::from_env().map_err(|e| McpError::internal_error(e.to_string(), None))?,
    );
    let web: Arc<dyn SearchAgent> = Arc::new(
        DeepSearchWebAgent::from_env()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?,
    );
    let managed: Vec<Arc<dyn SearchAgent>> = vec![general.clone(), web.clone()];

    let svc = DeepSearchMcp::with_agents(general, web);
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    // Keep the stdio server alive until the client closes, then release the
    // agents this function constructed.
    let waited = running.waiting().await;
    close_agents(&managed);
    waited.map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}
