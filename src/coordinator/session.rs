//! The live session record and the privacy-filtered result shown to the user.

use serde::Serialize;
use veil_common::{Comparison, LevelInfo, PrivacyLevel, RevealResult, Role};

use crate::store::SessionSnapshot;

/// Everything the coordinator knows about the session it is driving.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub role: Role,
    pub company_name: String,
    pub privacy_level: PrivacyLevel,
    pub committed: bool,
    /// Reveal guard. Set before the reveal request is issued.
    pub result_revealed: bool,
    pub peer_joined: bool,
    pub peer_committed: bool,
    /// Own tier as reported by the commit receipt.
    pub level_info: Option<LevelInfo>,
    pub initiator_name: Option<String>,
}

impl Session {
    pub fn new(
        session_id: String,
        role: Role,
        company_name: String,
        privacy_level: PrivacyLevel,
    ) -> Self {
        Self {
            session_id,
            role,
            company_name,
            privacy_level,
            committed: false,
            result_revealed: false,
            // A responder has by definition found its peer.
            peer_joined: role == Role::Responder,
            peer_committed: false,
            level_info: None,
            initiator_name: None,
        }
    }

    /// Rebuild from a persisted snapshot. The reveal guard is not carried
    /// over: it protects a single process from duplicate reveals.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut session = Self::new(
            snapshot.session_id.clone(),
            snapshot.role,
            snapshot.company_name.clone(),
            PrivacyLevel::default(),
        );
        session.committed = snapshot.committed;
        session
    }

    pub fn snapshot(&self, saved_at_epoch_millis: i64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            role: self.role,
            company_name: self.company_name.clone(),
            committed: self.committed,
            result_revealed: self.result_revealed,
            saved_at_epoch_millis,
        }
    }
}

/// What may be shown about one side's tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disclosure {
    Undisclosed,
    Tier { name: String, description: String },
}

impl Disclosure {
    fn from_level(level: Option<&LevelInfo>, privacy: PrivacyLevel) -> Self {
        match (privacy, level) {
            (PrivacyLevel::Detailed, Some(info)) => Disclosure::Tier {
                name: info.name.clone(),
                description: info.description.clone(),
            },
            _ => Disclosure::Undisclosed,
        }
    }
}

impl std::fmt::Display for Disclosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disclosure::Undisclosed => write!(f, "undisclosed"),
            Disclosure::Tier { name, description } => write!(f, "{} ({})", name, description),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartyResult {
    pub name: String,
    pub disclosure: Disclosure,
}

/// A reveal result after the privacy policy has been applied.
///
/// Under `Minimal` privacy nothing beyond the comparison and the message
/// survives, regardless of what the relay sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayResult {
    pub comparison: Comparison,
    pub message: String,
    pub privacy_level: PrivacyLevel,
    pub company_a: PartyResult,
    pub company_b: PartyResult,
    /// Which side this client played.
    pub own_role: Role,
}

impl DisplayResult {
    /// Apply the stricter of the session's and the result's privacy levels.
    pub fn from_reveal(
        result: &RevealResult,
        session_privacy: PrivacyLevel,
        own_role: Role,
    ) -> Self {
        let privacy = if result.privacy_level == PrivacyLevel::Minimal
            || session_privacy == PrivacyLevel::Minimal
        {
            PrivacyLevel::Minimal
        } else {
            PrivacyLevel::Detailed
        };

        Self {
            comparison: result.comparison,
            message: result.message.clone(),
            privacy_level: privacy,
            company_a: PartyResult {
                name: result.company_a.name.clone(),
                disclosure: Disclosure::from_level(result.company_a.level_info.as_ref(), privacy),
            },
            company_b: PartyResult {
                name: result.company_b.name.clone(),
                disclosure: Disclosure::from_level(result.company_b.level_info.as_ref(), privacy),
            },
            own_role,
        }
    }

    /// Outcome phrased from this client's side.
    pub fn own_standing(&self) -> Standing {
        match (self.comparison, self.own_role) {
            (Comparison::Equal, _) => Standing::Equal,
            (Comparison::AHigher, Role::Initiator) | (Comparison::BHigher, Role::Responder) => {
                Standing::Higher
            }
            _ => Standing::Lower,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Higher,
    Equal,
    Lower,
}
