//! Stage that invokes a function on an HTTP tool-server gateway.

use super::Stage;
use crate::core::StageValue;
use crate::errors::{FlowError, McpServerError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Gateway address used when none is configured.
pub const DEFAULT_MCP_BASE_URL: &str = "http://localhost:8080";

/// POSTs `{serverName, functionName, parameters}` to
/// `{base_url}/mcp/{serverName}/{functionName}` and returns the response body
/// as text.
///
/// A `Json` input must hold an object, which is merged over the configured
/// parameters. Any other input with a text form is sent as `"input"`.
#[derive(Debug, Clone)]
pub struct McpServerStage {
    name: String,
    server_name: String,
    function_name: String,
    parameters: Map<String, Value>,
    base_url: String,
    client: reqwest::Client,
}

impl McpServerStage {
    /// Creates a stage calling `function_name` on `server_name`.
    pub fn new(server_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        let server_name = server_name.into();
        let function_name = function_name.into();
        Self {
            name: format!("mcp:{server_name}/{function_name}"),
            server_name,
            function_name,
            parameters: Map::new(),
            base_url: DEFAULT_MCP_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Sets the fixed parameters sent with every call.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds a single fixed parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Points the stage at another gateway.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses a preconfigured HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Returns the endpoint this stage posts to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/mcp/{}/{}",
            self.base_url, self.server_name, self.function_name
        )
    }

    /// Builds the request body for `input`.
    pub fn request_body(&self, input: Option<&StageValue>) -> Result<Value, McpServerError> {
        let mut parameters = self.parameters.clone();
        match input {
            Some(StageValue::Json(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(overrides)) => parameters.extend(overrides),
                Ok(other) => {
                    return Err(McpServerError::InvalidParameters(format!(
                        "JSON input must be an object, got {other}"
                    )))
                }
                Err(err) => return Err(McpServerError::InvalidParameters(err.to_string())),
            },
            Some(value) => {
                if let Ok(text) = value.as_text() {
                    parameters.insert("input".to_string(), Value::String(text.into_owned()));
                }
            }
            None => {}
        }
        Ok(json!({
            "serverName": self.server_name,
            "functionName": self.function_name,
            "parameters": parameters,
        }))
    }
}

#[async_trait]
impl Stage for McpServerStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Option<StageValue>) -> Result<StageValue, FlowError> {
        if self.server_name.is_empty() {
            return Err(McpServerError::InvalidServerName.into());
        }
        let body = self.request_body(input.as_ref())?;
        let url = self.endpoint();
        debug!(url = %url, "calling tool-server gateway");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpServerError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| McpServerError::Decoding(e.to_string()))?;

        if !status.is_success() {
            return Err(McpServerError::Server {
                status: status.as_u16(),
                body: text,
            }
            .into());
        }
        Ok(StageValue::Text(text))
    }
}

/// Creates [`McpServerStage`]s for one server.
#[derive(Debug, Clone)]
pub struct McpServerBuilder {
    server_name: String,
    base_url: String,
}

impl McpServerBuilder {
    /// Creates a builder for `server_name`.
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            base_url: DEFAULT_MCP_BASE_URL.to_string(),
        }
    }

    /// Sets the gateway used by every stage this builder creates.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Creates a stage for `function_name`.
    pub fn function(
        &self,
        function_name: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> McpServerStage {
        McpServerStage::new(self.server_name.clone(), function_name)
            .with_parameters(parameters)
            .with_base_url(self.base_url.clone())
    }
}

/// Functions exposed by the Firecrawl tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirecrawlFunction {
    /// `batch_scrape`
    BatchScrape,
    /// `check_batch_status`
    CheckBatchStatus,
    /// `check_crawl_status`
    CheckCrawlStatus,
    /// `crawl`
    Crawl,
    /// `deep_research`
    DeepResearch,
    /// `extract`
    Extract,
    /// `map`
    Map,
    /// `scrape`
    Scrape,
    /// `search`
    Search,
}

impl FirecrawlFunction {
    /// Returns the wire name of the function.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BatchScrape => "batch_scrape",
            Self::CheckBatchStatus => "check_batch_status",
            Self::CheckCrawlStatus => "check_crawl_status",
            Self::Crawl => "crawl",
            Self::DeepResearch => "deep_research",
            Self::Extract => "extract",
            Self::Map => "map",
            Self::Scrape => "scrape",
            Self::Search => "search",
        }
    }
}

/// Stage builders for the Firecrawl tool server.
pub mod firecrawl {
    use super::{FirecrawlFunction, McpServerStage};
    use serde_json::{json, Map, Value};

    /// Server name Firecrawl is registered under.
    pub const SERVER_NAME: &str = "mcp-server-firecrawl";

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Calls any Firecrawl function with explicit parameters.
    pub fn stage(function: FirecrawlFunction, parameters: Map<String, Value>) -> McpServerStage {
        McpServerStage::new(SERVER_NAME, function.as_str()).with_parameters(parameters)
    }

    /// Scrapes `url`. Firecrawl defaults: `formats = ["markdown"]`,
    /// `only_main_content = true`.
    pub fn scrape(url: &str, formats: &[&str], only_main_content: bool) -> McpServerStage {
        stage(
            FirecrawlFunction::Scrape,
            object(json!({
                "url": url,
                "formats": formats,
                "onlyMainContent": only_main_content,
            })),
        )
    }

    /// Scrapes `url` for its main content as markdown.
    pub fn scrape_markdown(url: &str) -> McpServerStage {
        scrape(url, &["markdown"], true)
    }

    /// Runs a web search returning at most `limit` results (usually 5).
    pub fn search(query: &str, limit: u32) -> McpServerStage {
        stage(
            FirecrawlFunction::Search,
            object(json!({ "query": query, "limit": limit })),
        )
    }

    /// Crawls from `url`, scraping each page's main content as markdown.
    pub fn crawl(url: &str, max_depth: u32, limit: u32) -> McpServerStage {
        stage(
            FirecrawlFunction::Crawl,
            object(json!({
                "url": url,
                "maxDepth": max_depth,
                "limit": limit,
                "scrapeOptions": {
                    "formats": ["markdown"],
                    "onlyMainContent": true,
                },
            })),
        )
    }

    /// Runs a deep research job. Usual values: depth 3, 10 URLs, 120 seconds.
    pub fn deep_research(
        query: &str,
        max_depth: u32,
        max_urls: u32,
        time_limit_secs: u32,
    ) -> McpServerStage {
        stage(
            FirecrawlFunction::DeepResearch,
            object(json!({
                "query": query,
                "maxDepth": max_depth,
                "maxUrls": max_urls,
                "timeLimit": time_limit_secs,
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts one connection, answers with `status` and `body`, and returns
    /// the request line and request body it saw.
    async fn respond_once(status: u16, body: &'static str) -> (String, JoinHandle<(String, Value)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }
            let request: Value = serde_json::from_slice(&buf[header_end..]).unwrap();
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-length: {}\r\ncontent-type: text/plain\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            (head.lines().next().unwrap_or_default().to_string(), request)
        });
        (base_url, handle)
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn test_request_body_merges_json_object_input() {
        let stage = McpServerStage::new("srv", "fn")
            .with_parameter("limit", 5)
            .with_parameter("query", "old");

        let body = stage
            .request_body(Some(&StageValue::json(r#"{"query": "new"}"#)))
            .unwrap();

        assert_eq!(
            body,
            json!({
                "serverName": "srv",
                "functionName": "fn",
                "parameters": {"limit": 5, "query": "new"},
            })
        );
    }

    #[test]
    fn test_request_body_adds_text_as_input() {
        let stage = McpServerStage::new("srv", "fn");
        let body = stage.request_body(Some(&StageValue::text("hello"))).unwrap();
        assert_eq!(body["parameters"], json!({"input": "hello"}));

        let body = stage.request_body(Some(&StageValue::None)).unwrap();
        assert_eq!(body["parameters"], json!({}));
    }

    #[test]
    fn test_request_body_rejects_non_object_json() {
        let stage = McpServerStage::new("srv", "fn");
        for input in ["[1, 2]", "not json"] {
            let err = stage.request_body(Some(&StageValue::json(input))).unwrap_err();
            assert!(matches!(err, McpServerError::InvalidParameters(_)));
        }
    }

    #[test]
    fn test_endpoint_shape() {
        let stage = McpServerStage::new("files", "read").with_base_url("http://gw:9000/");
        assert_eq!(stage.endpoint(), "http://gw:9000/mcp/files/read");
        assert_eq!(
            McpServerStage::new("a", "b").endpoint(),
            "http://localhost:8080/mcp/a/b"
        );
    }

    #[tokio::test]
    async fn test_empty_server_name_rejected() {
        let err = McpServerStage::new("", "fn").execute(None).await.unwrap_err();
        assert!(matches!(err, FlowError::McpServer(McpServerError::InvalidServerName)));
    }

    #[tokio::test]
    async fn test_success_returns_body_text() {
        let (base_url, server) = respond_once(200, "scraped page").await;
        let stage = McpServerBuilder::new("web")
            .with_base_url(base_url)
            .function("scrape", Map::new())
            .with_client(local_client());

        let output = stage.execute(Some(StageValue::text("https://a.b"))).await.unwrap();
        let (request_line, request) = server.await.unwrap();

        assert_eq!(output, StageValue::text("scraped page"));
        assert!(request_line.starts_with("POST /mcp/web/scrape"));
        assert_eq!(request["parameters"]["input"], "https://a.b");
    }

    #[tokio::test]
    async fn test_non_success_status_is_server_error() {
        let (base_url, server) = respond_once(500, "boom").await;
        let stage = McpServerStage::new("web", "scrape")
            .with_base_url(base_url)
            .with_client(local_client());

        let err = stage.execute(None).await.unwrap_err();
        server.await.unwrap();

        match err {
            FlowError::McpServer(McpServerError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_firecrawl_builders() {
        let scrape = firecrawl::scrape_markdown("https://x.y");
        assert_eq!(scrape.endpoint(), "http://localhost:8080/mcp/mcp-server-firecrawl/scrape");
        assert_eq!(
            scrape.request_body(None).unwrap()["parameters"],
            json!({"url": "https://x.y", "formats": ["markdown"], "onlyMainContent": true})
        );

        let research = firecrawl::deep_research("rust", 3, 10, 120);
        assert_eq!(
            research.request_body(None).unwrap()["parameters"],
            json!({"query": "rust", "maxDepth": 3, "maxUrls": 10, "timeLimit": 120})
        );
        assert_eq!(FirecrawlFunction::CheckBatchStatus.as_str(), "check_batch_status");
    }
}
