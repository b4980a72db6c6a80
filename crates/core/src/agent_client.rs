use crate::{
    evaluation::EvaluationResult,
    mode::InteractionMode,
    scenario::Scenario,
    turn::{ConversationHistory, HistoryError},
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of one request to the conversational agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRequest {
    /// The human turn that triggered this request.
    pub message: String,
    /// The full history, the triggering turn included, in its wire encoding.
    pub history: String,
    #[serde(rename = "selectedScenario")]
    pub selected_scenario: Scenario,
    pub mode: InteractionMode,
}

impl AgentRequest {
    pub fn new(
        message: impl Into<String>,
        history: &ConversationHistory,
        selected_scenario: Scenario,
        mode: InteractionMode,
    ) -> Result<Self, HistoryError> {
        Ok(Self {
            message: message.into(),
            history: history.to_wire()?,
            selected_scenario,
            mode,
        })
    }
}

/// What the agent sends back for one request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentReply {
    /// The patient's reply.
    pub response: String,
    /// Rubric scores for the conversation so far.
    #[serde(default, deserialize_with = "crate::evaluation::deserialize_world_state")]
    pub world_state: Option<EvaluationResult>,
    /// Base64 encoded speech for `response`, sent in voice mode.
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to the agent failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Agent responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Couldn't parse the agent's reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A conversational agent that answers one request at a time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn exchange(&self, request: AgentRequest) -> Result<AgentReply, TransportError>;
}

/// An [`AgentClient`] that POSTs JSON to the agent's `/chat` endpoint.
pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAgentClient {
    /// Creates a client for the agent served at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Where the agent is served, e.g. `http://127.0.0.1:5000`.
    /// * `timeout` - Upper bound for one request/response cycle.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn exchange(&self, request: AgentRequest) -> Result<AgentReply, TransportError> {
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }
}
