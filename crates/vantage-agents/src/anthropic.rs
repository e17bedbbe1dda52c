//! [`AnthropicReasoner`]: the Messages API over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use vantage_core::reasoner::{Prompt, Reasoner, ReasonerError, extract_json};

const API_VERSION: &str = "2023-06-01";

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerSettings {
  pub base_url:   String,
  /// Sent as `x-api-key`. Usually supplied through the environment.
  pub api_key:    String,
  pub model:      String,
  pub max_tokens: u32,
  pub timeout_ms: u64,
}

impl Default for ReasonerSettings {
  fn default() -> Self {
    Self {
      base_url:   "https://api.anthropic.com".into(),
      api_key:    String::new(),
      model:      "claude-sonnet-4-5".into(),
      max_tokens: 2_048,
      timeout_ms: 30_000,
    }
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model:      &'a str,
  max_tokens: u32,
  system:     &'a str,
  messages:   [Message; 1],
}

#[derive(Serialize)]
struct Message {
  role:    &'static str,
  content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)]
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  text: String,
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct AnthropicReasoner {
  client:   Client,
  endpoint: String,
  settings: ReasonerSettings,
}

impl AnthropicReasoner {
  pub fn new(settings: ReasonerSettings) -> Result<Self, ReasonerError> {
    let client = Client::builder()
      .timeout(Duration::from_millis(settings.timeout_ms))
      .build()
      .map_err(|e| ReasonerError::Unavailable(e.to_string()))?;
    let endpoint =
      format!("{}/v1/messages", settings.base_url.trim_end_matches('/'));
    Ok(Self { client, endpoint, settings })
  }

  fn classify_transport(&self, err: reqwest::Error) -> ReasonerError {
    if err.is_timeout() {
      ReasonerError::Timeout(self.settings.timeout_ms)
    } else {
      ReasonerError::Unavailable(err.to_string())
    }
  }
}

/// Render the user turn: the payload as JSON, then the output contract.
fn user_content(prompt: &Prompt) -> String {
  let payload = serde_json::to_string_pretty(&prompt.payload)
    .unwrap_or_else(|_| prompt.payload.to_string());
  format!(
    "{payload}\n\nRespond with a single JSON object for the {} step and \
     nothing else.",
    prompt.kind
  )
}

/// Map a non-success HTTP status to a reasoner error.
fn status_error(status: StatusCode, body: String) -> ReasonerError {
  match status {
    StatusCode::TOO_MANY_REQUESTS => ReasonerError::RateLimited,
    StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
      ReasonerError::Unavailable(format!("{status}: {body}"))
    }
    // 529 is the service's "overloaded" status.
    s if s.is_server_error() || s.as_u16() == 529 => {
      ReasonerError::Unavailable(format!("{status}: {body}"))
    }
    s => ReasonerError::Rejected(format!("{s}: {body}")),
  }
}

#[async_trait]
impl Reasoner for AnthropicReasoner {
  #[instrument(skip_all, fields(kind = %prompt.kind, model = %self.settings.model))]
  async fn reason(
    &self,
    prompt: &Prompt,
  ) -> Result<serde_json::Value, ReasonerError> {
    let request = MessagesRequest {
      model:      &self.settings.model,
      max_tokens: self.settings.max_tokens,
      system:     &prompt.instructions,
      messages:   [Message { role: "user", content: user_content(prompt) }],
    };

    let response = self
      .client
      .post(&self.endpoint)
      .header("x-api-key", &self.settings.api_key)
      .header("anthropic-version", API_VERSION)
      .json(&request)
      .send()
      .await
      .map_err(|e| self.classify_transport(e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "reasoner returned an error status");
      return Err(status_error(status, body));
    }

    let reply: MessagesResponse = response
      .json()
      .await
      .map_err(|e| ReasonerError::Malformed(e.to_string()))?;
    let text: String = reply
      .content
      .iter()
      .filter(|b| b.kind == "text")
      .map(|b| b.text.as_str())
      .collect::<Vec<_>>()
      .join("\n");
    debug!(chars = text.len(), "reasoner reply received");
    extract_json(&text)
  }
}
