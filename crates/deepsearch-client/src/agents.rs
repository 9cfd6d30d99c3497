use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use deepsearch_core::{
    Error, Result, SearchAgent, SearchRequest, SearchResult, ToolTransport, TOOL_DEEPSEARCH,
    TOOL_DEEPSEARCH_WEB,
};

use crate::client::DeepSearchClient;
use crate::transport::DeepSearchTransport;

/// Shared agent plumbing: a client plus the ownership bookkeeping for the
/// transport behind it. Only a transport the agent constructed itself is
/// released on close; an injected one belongs to the caller.
struct AgentInner {
    client: DeepSearchClient,
    transport: Option<Arc<dyn ToolTransport>>,
    owns_transport: bool,
    released: AtomicBool,
}

impl AgentInner {
    fn new(tool_name: &str, transport: Arc<dyn ToolTransport>, owns_transport: bool) -> Self {
        Self {
            client: DeepSearchClient::for_tool(transport.clone(), tool_name),
            transport: Some(transport),
            owns_transport,
            released: AtomicBool::new(false),
        }
    }

    fn from_env(tool_name: &str) -> Result<Self> {
        let transport: Arc<dyn ToolTransport> = Arc::new(DeepSearchTransport::from_env()?);
        Ok(Self::new(tool_name, transport, true))
    }

    fn with_client(client: DeepSearchClient) -> Self {
        Self {
            client,
            transport: None,
            owns_transport: false,
            released: AtomicBool::new(false),
        }
    }

    fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match &self.transport {
            Some(transport) if self.owns_transport => transport.close(),
            _ => Ok(()),
        }
    }
}

/// Broad retrieval, no extra preconditions.
pub struct DeepSearchAgent {
    inner: AgentInner,
}

impl DeepSearchAgent {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            inner: AgentInner::from_env(TOOL_DEEPSEARCH)?,
        })
    }

    /// Use a caller-supplied transport. The caller keeps ownership; `close`
    /// will not release it.
    pub fn with_transport(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            inner: AgentInner::new(TOOL_DEEPSEARCH, transport, false),
        }
    }

    pub fn with_client(client: DeepSearchClient) -> Self {
        Self {
            inner: AgentInner::with_client(client),
        }
    }

    pub fn client(&self) -> &DeepSearchClient {
        &self.inner.client
    }
}

#[async_trait::async_trait]
impl SearchAgent for DeepSearchAgent {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.inner.client.search(request).await
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// Site/time-scoped retrieval: refuses to run without a usable scope filter.
pub struct DeepSearchWebAgent {
    inner: AgentInner,
}

impl DeepSearchWebAgent {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            inner: AgentInner::from_env(TOOL_DEEPSEARCH_WEB)?,
        })
    }

    /// Use a caller-supplied transport. The caller keeps ownership; `close`
    /// will not release it.
    pub fn with_transport(transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            inner: AgentInner::new(TOOL_DEEPSEARCH_WEB, transport, false),
        }
    }

    pub fn with_client(client: DeepSearchClient) -> Self {
        Self {
            inner: AgentInner::with_client(client),
        }
    }

    pub fn client(&self) -> &DeepSearchClient {
        &self.inner.client
    }
}

#[async_trait::async_trait]
impl SearchAgent for DeepSearchWebAgent {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        if !has_scope_filter(request) {
            return Err(Error::InvalidParams(
                "deepsearch-web requires a site or time_range filter".to_string(),
            ));
        }
        self.inner.client.search(request).await
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

fn has_scope_filter(request: &SearchRequest) -> bool {
    ["site", "time_range"]
        .iter()
        .any(|key| request.filters.get(*key).is_some_and(is_truthy))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
