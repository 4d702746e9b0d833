//! The relay operations consumed by the coordinator.
//!
//! `SessionTransport` is the seam between protocol logic and the network.
//! Real implementation: [`HttpTransport`]. Test double: `mock::MockTransport`.

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use veil_common::{
    CommitReceipt, CommitRequest, CreateSessionRequest, CreatedSession, HistoryResponse,
    JoinSessionRequest, JoinedSession, LevelInfo, RevealRequest, RevealResult, SessionStatus,
    UploadReceipt,
};

use crate::errors::TransportError;
use crate::upload::ArtifactUpload;

pub use http::HttpTransport;

#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn create(&self, request: &CreateSessionRequest)
    -> Result<CreatedSession, TransportError>;

    async fn join(&self, request: &JoinSessionRequest) -> Result<JoinedSession, TransportError>;

    async fn status(&self, session_id: &str) -> Result<SessionStatus, TransportError>;

    async fn upload(&self, upload: &ArtifactUpload) -> Result<UploadReceipt, TransportError>;

    async fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, TransportError>;

    async fn reveal(&self, request: &RevealRequest) -> Result<RevealResult, TransportError>;

    async fn levels(&self) -> Result<Vec<LevelInfo>, TransportError>;

    async fn history(&self) -> Result<HistoryResponse, TransportError>;

    /// Full session record as exported by the relay.
    async fn export(&self, session_id: &str) -> Result<serde_json::Value, TransportError>;
}
