//! JSON-over-HTTP transport for the relay's `/api/v1/mpc` routes.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use veil_common::{
    CommitReceipt, CommitRequest, CreateSessionRequest, CreatedSession, HistoryResponse,
    JoinSessionRequest, JoinedSession, LevelInfo, LevelsResponse, RevealRequest, RevealResponse,
    RevealResult, SessionStatus, UploadReceipt,
};

use super::SessionTransport;
use crate::errors::TransportError;
use crate::upload::{ArtifactSlot, ArtifactUpload, StagedFile};

pub const API_PREFIX: &str = "/api/v1/mpc";

pub struct HttpTransport {
    base_url: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("veil/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let base = format!("{}{}", server_url.trim().trim_end_matches('/'), API_PREFIX);
        let base_url =
            Url::parse(&base).with_context(|| format!("Invalid server URL: {}", server_url))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/sessions/{id}/{action}`, with the id escaped as one path segment.
    fn session_url(&self, session_id: &str, action: &str) -> Result<Url, TransportError> {
        if matches!(session_id, "" | "." | "..") {
            return Err(TransportError::Rejected {
                message: format!("invalid session id '{}'", session_id),
            });
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Rejected {
                message: format!("relay URL {} cannot take a path", self.base_url),
            })?
            .extend(["sessions", session_id, action]);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let body = response.text().await.map_err(network_error)?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "relay response");
        interpret(status, &body)
    }
}

fn network_error(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

/// Map an HTTP status and body onto the transport contract:
/// 404 is session invalidation, other failures and `success: false` are
/// rejections carrying the relay's message.
pub fn interpret<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, TransportError> {
    let value: Option<Value> = serde_json::from_str(body).ok();
    let message = value.as_ref().and_then(extract_message);

    if status == StatusCode::NOT_FOUND {
        return Err(TransportError::NotFound {
            message: message.unwrap_or_else(|| "session does not exist".to_string()),
        });
    }

    if !status.is_success() {
        return Err(TransportError::Rejected {
            message: message.unwrap_or_else(|| format!("relay returned {}", status)),
        });
    }

    let value = value.ok_or_else(|| TransportError::Decode("response is not JSON".into()))?;

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(TransportError::Rejected {
            message: message.unwrap_or_else(|| "request was rejected".to_string()),
        });
    }

    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Pull a human-readable message out of `message` or a FastAPI `detail`.
fn extract_message(value: &Value) -> Option<String> {
    if let Some(msg) = value.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn file_part(file: &StagedFile) -> Result<Part, TransportError> {
    Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.mime)
        .map_err(|e| TransportError::Decode(format!("invalid MIME type {}: {}", file.mime, e)))
}

#[derive(Deserialize)]
struct ExportEnvelope {
    data: Value,
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn create(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, TransportError> {
        self.send(self.client.post(self.url("/sessions")).json(request))
            .await
    }

    async fn join(&self, request: &JoinSessionRequest) -> Result<JoinedSession, TransportError> {
        self.send(self.client.post(self.url("/sessions/join")).json(request))
            .await
    }

    async fn status(&self, session_id: &str) -> Result<SessionStatus, TransportError> {
        let url = self.session_url(session_id, "status")?;
        self.send(self.client.get(url)).await
    }

    async fn upload(&self, upload: &ArtifactUpload) -> Result<UploadReceipt, TransportError> {
        let form = Form::new()
            .text("session_id", upload.session_id.clone())
            .text("role", upload.role.as_wire())
            .part(
                ArtifactSlot::BankStatement.form_field(),
                file_part(&upload.bank_statement)?,
            )
            .part(
                ArtifactSlot::CommitmentLetter.form_field(),
                file_part(&upload.commitment_letter)?,
            );
        self.send(self.client.post(self.url("/sessions/upload")).multipart(form))
            .await
    }

    async fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, TransportError> {
        self.send(self.client.post(self.url("/sessions/commit")).json(request))
            .await
    }

    async fn reveal(&self, request: &RevealRequest) -> Result<RevealResult, TransportError> {
        let response: RevealResponse = self
            .send(self.client.post(self.url("/sessions/reveal")).json(request))
            .await?;
        Ok(response.result)
    }

    async fn levels(&self) -> Result<Vec<LevelInfo>, TransportError> {
        let response: LevelsResponse = self.send(self.client.get(self.url("/levels"))).await?;
        Ok(response.levels)
    }

    async fn history(&self) -> Result<HistoryResponse, TransportError> {
        self.send(self.client.get(self.url("/history"))).await
    }

    async fn export(&self, session_id: &str) -> Result<Value, TransportError> {
        let url = self.session_url(session_id, "export")?;
        let envelope: ExportEnvelope = self.send(self.client.get(url)).await?;
        Ok(envelope.data)
    }
}
