//! Notifications broadcast by the coordinator to whatever renders them.

use veil_common::LevelInfo;

use super::phase::Phase;
use super::session::DisplayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    PhaseChanged { from: Phase, to: Phase },
    SessionCreated { session_id: String },
    SessionJoined { session_id: String, initiator_name: Option<String> },
    SessionResumed { session_id: String },
    PeerStatus { peer_joined: bool, peer_committed: bool, self_committed: bool },
    FilesUploaded,
    Committed { level_info: Option<LevelInfo> },
    RevealStarted,
    ResultReady(DisplayResult),
    Invalidated { message: String },
    Notice(Notice),
}
