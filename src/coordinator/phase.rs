//! Protocol phases and the single transition function that moves between them.
//!
//! ```text
//! RoleUnset ──create──▶ Creating ──created──▶ WaitingForPeer ──peer-joined──┐
//!     │                                                                      ▼
//!     └────join───▶ Joining ───joined──────────────────────────────────▶ InputReady
//!                                                                            │ commit-acknowledged
//!                                                                            ▼
//!                       ResultShown ◀──revealed── BothCommitted ◀──both── Committed
//! ```
//!
//! `Invalidated` is reachable from every phase that holds a live session.
//! `reset` returns to `RoleUnset` from anywhere.

use crate::errors::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    RoleUnset,
    Creating,
    Joining,
    WaitingForPeer,
    InputReady,
    Committed,
    BothCommitted,
    ResultShown,
    Invalidated,
}

impl Phase {
    /// Phases that still own a live session on the relay.
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            Phase::WaitingForPeer
                | Phase::InputReady
                | Phase::Committed
                | Phase::BothCommitted
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::ResultShown | Phase::Invalidated)
    }

    /// Phases in which the status poller should be running.
    pub fn wants_polling(&self) -> bool {
        matches!(
            self,
            Phase::WaitingForPeer | Phase::InputReady | Phase::Committed
        )
    }

    /// Apply `event` to this phase.
    pub fn next(self, event: Event) -> Result<Phase, SessionError> {
        use Event as E;
        use Phase as P;

        let next = match (self, event) {
            (_, E::Reset) => P::RoleUnset,

            (P::RoleUnset, E::CreateRequested) => P::Creating,
            (P::RoleUnset, E::JoinRequested) => P::Joining,
            (P::Creating, E::Created) => P::WaitingForPeer,
            (P::Joining, E::Joined) => P::InputReady,
            (P::Creating | P::Joining, E::RequestFailed) => P::RoleUnset,

            (P::RoleUnset, E::Resumed { committed: true, .. }) => P::Committed,
            (
                P::RoleUnset,
                E::Resumed {
                    committed: false,
                    awaiting_peer: true,
                },
            ) => P::WaitingForPeer,
            (
                P::RoleUnset,
                E::Resumed {
                    committed: false,
                    awaiting_peer: false,
                },
            ) => P::InputReady,

            (P::WaitingForPeer, E::PeerJoined) => P::InputReady,
            (P::InputReady, E::CommitAcknowledged) => P::Committed,
            (P::Committed, E::BothCommitted) => P::BothCommitted,
            (P::BothCommitted, E::Revealed) => P::ResultShown,
            (P::BothCommitted, E::RevealFailed) => P::BothCommitted,

            (from, E::Invalidate) if from.has_session() => P::Invalidated,

            (from, event) => return Err(SessionError::InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::RoleUnset => "role-unset",
            Phase::Creating => "creating",
            Phase::Joining => "joining",
            Phase::WaitingForPeer => "waiting-for-peer",
            Phase::InputReady => "input-ready",
            Phase::Committed => "committed",
            Phase::BothCommitted => "both-committed",
            Phase::ResultShown => "result-shown",
            Phase::Invalidated => "invalidated",
        };
        write!(f, "{}", name)
    }
}

/// Inputs to [`Phase::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    CreateRequested,
    JoinRequested,
    Created,
    Joined,
    RequestFailed,
    /// A persisted session passed revalidation.
    Resumed { committed: bool, awaiting_peer: bool },
    PeerJoined,
    CommitAcknowledged,
    BothCommitted,
    Revealed,
    RevealFailed,
    Invalidate,
    Reset,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Event::CreateRequested => "create-requested",
            Event::JoinRequested => "join-requested",
            Event::Created => "created",
            Event::Joined => "joined",
            Event::RequestFailed => "request-failed",
            Event::Resumed { .. } => "resumed",
            Event::PeerJoined => "peer-joined",
            Event::CommitAcknowledged => "commit-acknowledged",
            Event::BothCommitted => "both-committed",
            Event::Revealed => "revealed",
            Event::RevealFailed => "reveal-failed",
            Event::Invalidate => "invalidate",
            Event::Reset => "reset",
        };
        write!(f, "{}", name)
    }
}
