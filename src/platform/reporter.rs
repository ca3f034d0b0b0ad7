//! Platform agent client: session join/leave and result submission

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of a single platform report
pub type ReportResult = Result<(), ReportError>;

/// Fire-and-forget reporting to the hosting platform. Each call returns a
/// future resolving to the platform's verdict; the caller decides what a
/// failure means.
pub trait PlatformReporter: Send + Sync {
    fn notify_joined(&self, user_id: &str) -> BoxFuture<'static, ReportResult>;

    fn notify_left(&self, user_id: &str) -> BoxFuture<'static, ReportResult>;

    /// `payload` is the serialized result document
    fn submit_result(&self, payload: String) -> BoxFuture<'static, ReportResult>;
}

#[derive(Debug, Serialize)]
struct AccountBody {
    account: String,
}

/// Agent reply; missing fields mean success
#[derive(Debug, Default, Deserialize)]
struct AgentReply {
    #[serde(default)]
    error_code: i32,
    #[serde(default)]
    error_desc: String,
}

/// Reports over HTTP to the platform agent running next to this process
#[derive(Clone)]
pub struct HttpReporter {
    client: Client,
    base_url: String,
    match_id: String,
    api_key: Option<String>,
}

impl HttpReporter {
    pub fn new(base_url: &str, match_id: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            match_id: match_id.to_string(),
            api_key,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/match/{}/{}", self.base_url, self.match_id, action)
    }

    fn post<T: Serialize>(&self, action: &str, body: &T) -> BoxFuture<'static, ReportResult> {
        let url = self.endpoint(action);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        async move {
            let response = request.send().await.map_err(ReportError::Request)?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ReportError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let text = response.text().await.map_err(ReportError::Request)?;
            let reply = if text.trim().is_empty() {
                AgentReply::default()
            } else {
                serde_json::from_str(&text).map_err(ReportError::Parse)?
            };

            if reply.error_code != 0 {
                return Err(ReportError::Platform {
                    code: reply.error_code,
                    description: reply.error_desc,
                });
            }

            debug!(url = %url, "Platform report accepted");
            Ok(())
        }
        .boxed()
    }

    fn account_body(user_id: &str) -> AccountBody {
        AccountBody {
            account: user_id.to_string(),
        }
    }
}

impl PlatformReporter for HttpReporter {
    fn notify_joined(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
        self.post("joined", &Self::account_body(user_id))
    }

    fn notify_left(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
        self.post("left", &Self::account_body(user_id))
    }

    fn submit_result(&self, payload: String) -> BoxFuture<'static, ReportResult> {
        match serde_json::from_str::<serde_json::Value>(&payload) {
            Ok(document) => self.post("result", &document),
            Err(e) => futures::future::ready(Err(ReportError::Parse(e))).boxed(),
        }
    }
}

/// Stand-in for local runs without a platform agent
pub struct LogReporter;

impl PlatformReporter for LogReporter {
    fn notify_joined(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
        info!(user_id = %user_id, "Player joined (not reported)");
        futures::future::ready(Ok(())).boxed()
    }

    fn notify_left(&self, user_id: &str) -> BoxFuture<'static, ReportResult> {
        info!(user_id = %user_id, "Player left (not reported)");
        futures::future::ready(Ok(())).boxed()
    }

    fn submit_result(&self, payload: String) -> BoxFuture<'static, ReportResult> {
        info!(payload = %payload, "Match result (not reported)");
        futures::future::ready(Ok(())).boxed()
    }
}

/// Platform reporting errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid JSON document: {0}")]
    Parse(serde_json::Error),

    #[error("Platform error {code}: {description}")]
    Platform { code: i32, description: String },
}

impl ReportError {
    /// Platform-style error code; never 0
    pub fn code(&self) -> i32 {
        match self {
            ReportError::Request(_) | ReportError::Parse(_) => -1,
            ReportError::Api { status, .. } => *status as i32,
            ReportError::Platform { code, .. } => *code,
        }
    }
}
