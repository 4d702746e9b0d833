//! Wire types for the Veil relay protocol.
//!
//! Every relay response is a JSON object carrying `success: bool` and an
//! optional `message`. The structs here describe the *success* bodies; the
//! client checks `success` first and only then decodes into these types.
//!
//! | Operation | Request type          | Success body        |
//! |-----------|-----------------------|---------------------|
//! | create    | `CreateSessionRequest`| `CreatedSession`    |
//! | join      | `JoinSessionRequest`  | `JoinedSession`     |
//! | status    | (path only)           | `SessionStatus`     |
//! | upload    | multipart form        | `UploadReceipt`     |
//! | commit    | `CommitRequest`       | `CommitReceipt`     |
//! | reveal    | `RevealRequest`       | `RevealResponse`    |
//! | levels    | –                     | `LevelsResponse`    |
//! | history   | –                     | `HistoryResponse`   |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Invalid privacy level '{0}'. Valid values: minimal, detailed")]
    UnknownPrivacyLevel(String),

    #[error("Invalid role '{0}'. Valid values: company_a, company_b")]
    UnknownRole(String),
}

/// Which side of the session this client plays.
///
/// The relay names the sides `company_a` (the creator) and `company_b`
/// (the joiner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "company_a")]
    Initiator,
    #[serde(rename = "company_b")]
    Responder,
}

impl Role {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Initiator => "company_a",
            Role::Responder => "company_b",
        }
    }

    pub fn peer(&self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "company_a" | "initiator" => Ok(Role::Initiator),
            "company_b" | "responder" => Ok(Role::Responder),
            _ => Err(WireError::UnknownRole(s.to_string())),
        }
    }
}

/// Disclosure policy chosen by the initiator.
///
/// `Minimal` shows only who is higher; `Detailed` also shows both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Minimal,
    #[default]
    Detailed,
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyLevel::Minimal => write!(f, "minimal"),
            PrivacyLevel::Detailed => write!(f, "detailed"),
        }
    }
}

impl std::str::FromStr for PrivacyLevel {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(PrivacyLevel::Minimal),
            "detailed" => Ok(PrivacyLevel::Detailed),
            _ => Err(WireError::UnknownPrivacyLevel(s.to_string())),
        }
    }
}

/// Outcome of the tier comparison, from company A's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    AHigher,
    BHigher,
}

/// Server-side session status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerPhase {
    #[default]
    WaitingForB,
    BothCommitted,
    Revealed,
    #[serde(other)]
    Unknown,
}

/// A revenue tier as published by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    #[serde(default)]
    pub level: u8,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub company_name: String,
    pub privacy_level: PrivacyLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionRequest {
    pub session_id: String,
    pub company_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub session_id: String,
    pub role: Role,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealRequest {
    pub session_id: String,
    pub role: Role,
}

// ── Success bodies ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedSession {
    pub session_id: String,
    pub role: Role,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
    /// Display name of the initiator, shown as a greeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_a_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(default)]
    pub status: ServerPhase,
    #[serde(default)]
    pub company_a_committed: bool,
    #[serde(default)]
    pub company_b_committed: bool,
    #[serde(default)]
    pub company_b_joined: bool,
}

impl SessionStatus {
    pub fn both_committed(&self) -> bool {
        self.company_a_committed && self.company_b_committed
    }

    /// The responder can only observe a session it has already joined, so
    /// from its side the peer is always present.
    pub fn peer_joined(&self, role: Role) -> bool {
        match role {
            Role::Initiator => self.company_b_joined,
            Role::Responder => true,
        }
    }

    pub fn committed(&self, role: Role) -> bool {
        match role {
            Role::Initiator => self.company_a_committed,
            Role::Responder => self.company_b_committed,
        }
    }

    pub fn peer_committed(&self, role: Role) -> bool {
        self.committed(role.peer())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub files: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitReceipt {
    #[serde(default)]
    pub level_info: Option<LevelInfo>,
    #[serde(default)]
    pub status: ServerPhase,
}

impl CommitReceipt {
    pub fn both_committed(&self) -> bool {
        matches!(
            self.status,
            ServerPhase::BothCommitted | ServerPhase::Revealed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOutcome {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level_info: Option<LevelInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealResult {
    pub comparison: Comparison,
    #[serde(default)]
    pub message: String,
    pub company_a: CompanyOutcome,
    pub company_b: CompanyOutcome,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealResponse {
    pub result: RevealResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelsResponse {
    #[serde(default)]
    pub levels: Vec<LevelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub company_a_name: Option<String>,
    #[serde(default)]
    pub company_b_name: Option<String>,
    pub result: RevealResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}
