//! Scripted in-memory transport for coordinator unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use veil_common::{
    CommitReceipt, CommitRequest, CompanyOutcome, Comparison, CreateSessionRequest,
    CreatedSession, HistoryResponse, JoinSessionRequest, JoinedSession, LevelInfo, PrivacyLevel,
    RevealRequest, RevealResult, Role, ServerPhase, SessionStatus, UploadReceipt,
};

use super::SessionTransport;
use crate::errors::TransportError;
use crate::upload::ArtifactUpload;

pub fn level(n: u8, name: &str) -> LevelInfo {
    LevelInfo {
        level: n,
        name: name.to_string(),
        description: format!("tier {}", n),
        min: None,
        max: None,
    }
}

pub fn detailed_result() -> RevealResult {
    RevealResult {
        comparison: Comparison::AHigher,
        message: "Company A is in a higher tier".to_string(),
        company_a: CompanyOutcome {
            name: "Acme".to_string(),
            level_info: Some(level(3, "Scale")),
        },
        company_b: CompanyOutcome {
            name: "Globex".to_string(),
            level_info: Some(level(1, "Seed")),
        },
        privacy_level: PrivacyLevel::Detailed,
    }
}

pub fn status(joined: bool, a_committed: bool, b_committed: bool) -> SessionStatus {
    let phase = if a_committed && b_committed {
        ServerPhase::BothCommitted
    } else {
        ServerPhase::WaitingForB
    };
    SessionStatus {
        status: phase,
        company_a_committed: a_committed,
        company_b_committed: b_committed,
        company_b_joined: joined,
    }
}

pub fn not_found() -> TransportError {
    TransportError::NotFound {
        message: "session does not exist".to_string(),
    }
}

pub struct MockTransport {
    pub create_result: Mutex<Result<CreatedSession, TransportError>>,
    pub join_result: Mutex<Result<JoinedSession, TransportError>>,
    statuses: Mutex<VecDeque<Result<SessionStatus, TransportError>>>,
    pub default_status: Mutex<Result<SessionStatus, TransportError>>,
    pub upload_result: Mutex<Result<UploadReceipt, TransportError>>,
    pub commit_result: Mutex<Result<CommitReceipt, TransportError>>,
    pub reveal_result: Mutex<Result<RevealResult, TransportError>>,
    reveal_delay: Duration,
    commit_delay: Duration,
    pub create_calls: AtomicUsize,
    pub join_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
    pub reveal_calls: AtomicUsize,
    pub last_commit: Mutex<Option<CommitRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            create_result: Mutex::new(Ok(CreatedSession {
                session_id: "sess-1".to_string(),
                role: Role::Initiator,
                privacy_level: PrivacyLevel::Detailed,
            })),
            join_result: Mutex::new(Ok(JoinedSession {
                session_id: "sess-1".to_string(),
                role: Role::Responder,
                privacy_level: PrivacyLevel::Detailed,
                company_a_name: Some("Acme".to_string()),
            })),
            statuses: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(Ok(status(false, false, false))),
            upload_result: Mutex::new(Ok(UploadReceipt::default())),
            commit_result: Mutex::new(Ok(CommitReceipt {
                level_info: Some(level(2, "Growth")),
                status: ServerPhase::WaitingForB,
            })),
            reveal_result: Mutex::new(Ok(detailed_result())),
            reveal_delay: Duration::ZERO,
            commit_delay: Duration::ZERO,
            create_calls: AtomicUsize::new(0),
            join_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            commit_calls: AtomicUsize::new(0),
            reveal_calls: AtomicUsize::new(0),
            last_commit: Mutex::new(None),
        }
    }

    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn with_default_status(self, result: Result<SessionStatus, TransportError>) -> Self {
        *self.default_status.lock().unwrap() = result;
        self
    }

    pub fn with_commit(self, result: Result<CommitReceipt, TransportError>) -> Self {
        *self.commit_result.lock().unwrap() = result;
        self
    }

    pub fn with_reveal(self, result: Result<RevealResult, TransportError>) -> Self {
        *self.reveal_result.lock().unwrap() = result;
        self
    }

    pub fn with_create(self, result: Result<CreatedSession, TransportError>) -> Self {
        *self.create_result.lock().unwrap() = result;
        self
    }

    pub fn with_join(self, result: Result<JoinedSession, TransportError>) -> Self {
        *self.join_result.lock().unwrap() = result;
        self
    }

    /// Queue a one-shot status answer ahead of the default.
    pub fn push_status(&self, result: Result<SessionStatus, TransportError>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    pub fn set_default_status(&self, result: Result<SessionStatus, TransportError>) {
        *self.default_status.lock().unwrap() = result;
    }

    pub fn set_reveal(&self, result: Result<RevealResult, TransportError>) {
        *self.reveal_result.lock().unwrap() = result;
    }

    pub fn total_calls(&self) -> usize {
        [
            &self.create_calls,
            &self.join_calls,
            &self.status_calls,
            &self.upload_calls,
            &self.commit_calls,
            &self.reveal_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn create(
        &self,
        _request: &CreateSessionRequest,
    ) -> Result<CreatedSession, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_result.lock().unwrap().clone()
    }

    async fn join(&self, request: &JoinSessionRequest) -> Result<JoinedSession, TransportError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        self.join_result.lock().unwrap().clone().map(|mut joined| {
            joined.session_id = request.session_id.clone();
            joined
        })
    }

    async fn status(&self, _session_id: &str) -> Result<SessionStatus, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.statuses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => self.default_status.lock().unwrap().clone(),
        }
    }

    async fn upload(&self, _upload: &ArtifactUpload) -> Result<UploadReceipt, TransportError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.upload_result.lock().unwrap().clone()
    }

    async fn commit(&self, request: &CommitRequest) -> Result<CommitReceipt, TransportError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_commit.lock().unwrap() = Some(request.clone());
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        self.commit_result.lock().unwrap().clone()
    }

    async fn reveal(&self, _request: &RevealRequest) -> Result<RevealResult, TransportError> {
        self.reveal_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reveal_delay.is_zero() {
            tokio::time::sleep(self.reveal_delay).await;
        }
        self.reveal_result.lock().unwrap().clone()
    }

    async fn levels(&self) -> Result<Vec<LevelInfo>, TransportError> {
        Ok(vec![level(1, "Seed"), level(2, "Growth"), level(3, "Scale")])
    }

    async fn history(&self) -> Result<HistoryResponse, TransportError> {
        Ok(HistoryResponse {
            count: 0,
            history: Vec::new(),
        })
    }

    async fn export(&self, session_id: &str) -> Result<Value, TransportError> {
        Ok(serde_json::json!({ "session_id": session_id }))
    }
}
