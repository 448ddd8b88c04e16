use std::fmt;

use async_trait::async_trait;
use nd_core::{Error, GenerationRequest, PromptRole, Result, TextGenerator};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL: &str = "web_search_20250305";

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WebSearchTool>,
}

impl<'a> ChatRequest<'a> {
    fn from_request(model: &'a str, request: &'a GenerationRequest) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    PromptRole::User => "user",
                    PromptRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();
        let tools = request
            .web_search
            .map(|max_uses| {
                vec![WebSearchTool {
                    tool_type: WEB_SEARCH_TOOL,
                    name: "web_search",
                    max_uses,
                }]
            })
            .unwrap_or_default();
        Self {
            model,
            max_tokens: request.max_tokens,
            messages,
            tools,
        }
    }
}

/// Only text blocks matter here; search calls and their results are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl ChatResponse {
    fn text_segments(self) -> Vec<String> {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect()
    }
}

/// Anthropic Messages API client with the server-side web search tool.
pub struct ClaudeModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeModel {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("ANTHROPIC_API_KEY is required".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key header: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl fmt::Debug for ClaudeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl TextGenerator for ClaudeModel {
    fn name(&self) -> &str {
        "Claude"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>> {
        let body = ChatRequest::from_request(&self.model, request);
        debug!(
            model = %self.model,
            max_tokens = request.max_tokens,
            web_search = ?request.web_search,
            "Claude messages request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::Upstream(format!(
                "Claude API error ({}): {}",
                status, error_text
            )));
        }

        let response: ChatResponse = response.json().await?;
        debug!(
            blocks = response.content.len(),
            stop_reason = ?response.stop_reason,
            "Claude messages response"
        );
        let segments = response.text_segments();
        if segments.is_empty() {
            return Err(Error::Upstream("No text in Claude response".to_string()));
        }
        Ok(segments)
    }
}
