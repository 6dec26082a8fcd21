use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use orch_core::{Message, ToolCallFunction, ToolCallRequest};

use crate::error::PortError;
use crate::model::ModelAdapter;
use crate::types::{ChatRequest, ChatResponse, PortStatus};

/// Model-backend adapter for an OpenAI-compatible chat-completions
/// endpoint. Grounded on `OpenAiProvider`, trimmed to the non-streaming
/// call this system's tool loop needs and generalized to any compatible
/// base URL (self-hosted gateways included).
pub struct OpenAiCompatModel {
    client: reqwest::Client,
    name: String,
    api_key: String,
    base_url: String,
    chat_path: String,
    max_concurrent_requests: u32,
    in_flight: AtomicU32,
    status: RwLock<PortStatus>,
}

impl OpenAiCompatModel {
    pub fn new(name: impl Into<String>, api_key: String, base_url: String, max_concurrent_requests: u32) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            name: name.into(),
            api_key,
            base_url,
            chat_path: "/v1/chat/completions".to_string(),
            max_concurrent_requests,
            in_flight: AtomicU32::new(0),
            status: RwLock::new(PortStatus::Disconnected),
        })
    }

    /// Atomically reserves one in-flight slot, returning `false` (caller
    /// must not proceed) when the adapter is already at capacity.
    pub fn try_reserve(&self) -> bool {
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current >= self.max_concurrent_requests {
                return false;
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[async_trait]
impl ModelAdapter for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), PortError> {
        *self.status.write().await = PortStatus::Connected;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PortError> {
        *self.status.write().await = PortStatus::Disconnected;
        Ok(())
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<ChatResponse, PortError> {
        let url = format!("{}{}", self.base_url, self.chat_path);
        debug!(model = %request.model, url = %url, "sending chat-completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::ConnectionFailed(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PortError::AuthFailed(resp.status().to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "model backend returned an error");
            return Err(PortError::SendFailed(format!("{status}: {body}")));
        }

        let parsed: ApiResponse = resp.json().await.map_err(|e| PortError::SendFailed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PortError::SendFailed("empty choices array".to_string()))?;

        let tool_calls = if choice.message.tool_calls.is_empty() {
            None
        } else {
            Some(
                choice
                    .message
                    .tool_calls
                    .into_iter()
                    .map(|c| ToolCallRequest {
                        id: c.id,
                        call_type: "function".to_string(),
                        function: ToolCallFunction {
                            name: c.function.name,
                            arguments: c.function.arguments,
                        },
                    })
                    .collect(),
            )
        };

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
        })
    }

    async fn is_connected(&self) -> bool {
        matches!(*self.status.read().await, PortStatus::Connected)
    }

    async fn status(&self) -> PortStatus {
        self.status.read().await.clone()
    }

    fn try_reserve(&self) -> bool {
        OpenAiCompatModel::try_reserve(self)
    }

    fn release(&self) {
        OpenAiCompatModel::release(self)
    }
}

/// Converts a session's reshaped `data` block into the adapter-agnostic
/// request shape. Kept here (rather than in `orch-workflow`) since it is
/// purely a wire-format concern.
pub fn build_chat_request(model: String, messages: Vec<Message>, max_tokens: u32, temperature: f32, tools: Option<Vec<orch_core::ToolDefinition>>) -> ChatRequest {
    ChatRequest {
        model,
        messages,
        max_tokens,
        temperature,
        tools,
    }
}
