//! Session coordinator: the client half of the commit/reveal protocol.
//!
//! A [`Coordinator`] owns the protocol state for one participant. It accepts
//! user actions (create, join, stage, commit, reveal, reset), reacts to
//! status-poll ticks, drives the relay through a [`SessionTransport`], and
//! persists the session identity through a [`SnapshotStore`].
//!
//! All state lives behind one `std::sync::Mutex`. The lock is never held
//! across an `.await`: every guard check and guard set happens in one short
//! critical section before a transport call is issued, and completion
//! handlers re-check the generation and phase before acting. The generation
//! counter increments whenever the session identity changes (create, join,
//! resume, reset), which is how stale responses and auto-resets are discarded.
//!
//! Presentation is decoupled: every state change is published as a
//! [`CoordinatorEvent`] on a broadcast channel.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use veil::coordinator::{Coordinator, CoordinatorSettings};
//! use veil::store::FileSnapshotStore;
//! use veil::transport::HttpTransport;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let transport = Arc::new(HttpTransport::new("http://127.0.0.1:8000", std::time::Duration::from_secs(30))?);
//! let store = Arc::new(FileSnapshotStore::new("session.json".into()));
//! let coordinator = Coordinator::new(transport, store, CoordinatorSettings::default());
//! let session_id = coordinator
//!     .create_session("Acme", veil_common::PrivacyLevel::Detailed)
//!     .await?;
//! println!("share this id: {}", session_id);
//! # Ok(())
//! # }
//! ```

mod events;
mod phase;
mod session;

pub use events::{CoordinatorEvent, Notice, NoticeLevel};
pub use phase::{Event, Phase};
pub use session::{Disclosure, DisplayResult, PartyResult, Session, Standing};

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use veil_common::{
    CommitRequest, CreateSessionRequest, JoinSessionRequest, PrivacyLevel, RevealRequest, Role,
    SessionStatus,
};

use crate::errors::{SessionError, TransportError, ValidationError};
use crate::poller::{DEFAULT_POLL_INTERVAL, PollControl, Poller};
use crate::store::{SnapshotStore, now_millis};
use crate::transport::SessionTransport;
use crate::upload::{ArtifactSlot, ArtifactUpload, DEFAULT_MAX_FILE_BYTES, StagedFile, UploadGate, UploadState};

/// Lowest amount the relay will place in a tier.
pub const DEFAULT_MINIMUM_AMOUNT: f64 = 100_000.0;

pub const DEFAULT_AUTO_RESET_DELAY: Duration = Duration::from_secs(3);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tunables for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Status cadence while waiting for the peer to join.
    pub poll_interval: Duration,
    /// Status cadence once both parties are present.
    pub input_poll_interval: Duration,
    /// Delay between invalidation and the automatic reset.
    pub auto_reset_delay: Duration,
    pub minimum_amount: f64,
    pub max_file_bytes: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            input_poll_interval: DEFAULT_POLL_INTERVAL,
            auto_reset_delay: DEFAULT_AUTO_RESET_DELAY,
            minimum_amount: DEFAULT_MINIMUM_AMOUNT,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl CoordinatorSettings {
    /// Set both polling cadences.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.input_poll_interval = interval;
        self
    }

    pub fn with_input_poll_interval(mut self, interval: Duration) -> Self {
        self.input_poll_interval = interval;
        self
    }

    pub fn with_auto_reset_delay(mut self, delay: Duration) -> Self {
        self.auto_reset_delay = delay;
        self
    }

    /// Raise the commit floor. Values below [`DEFAULT_MINIMUM_AMOUNT`] are
    /// ignored.
    pub fn with_minimum_amount(mut self, minimum: f64) -> Self {
        self.minimum_amount = minimum.max(DEFAULT_MINIMUM_AMOUNT);
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }
}

/// Result of a successful `submit_commit`.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Committed; the peer has not yet.
    AwaitingPeer,
    /// The relay reported both commitments and the reveal succeeded.
    Revealed(DisplayResult),
    /// Both committed but the reveal call failed. Retry with `retry_reveal`.
    RevealFailed { message: String },
}

struct State {
    phase: Phase,
    session: Option<Session>,
    uploads: UploadGate,
    poller: Option<Poller>,
    generation: u64,
    /// Set while an upload or commit request is outstanding.
    commit_in_flight: bool,
    result: Option<DisplayResult>,
    poll_failures: u32,
}

impl State {
    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    fn clear_session(&mut self) {
        self.stop_polling();
        self.session = None;
        self.uploads.clear();
        self.commit_in_flight = false;
        self.result = None;
        self.poll_failures = 0;
    }
}

struct Inner {
    transport: Arc<dyn SessionTransport>,
    store: Arc<dyn SnapshotStore>,
    settings: CoordinatorSettings,
    events: broadcast::Sender<CoordinatorEvent>,
    state: Mutex<State>,
}

/// Everything needed to issue one reveal request.
struct RevealTicket {
    generation: u64,
    session_id: String,
    role: Role,
}

/// Cheaply cloneable handle to one participant's protocol state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        store: Arc<dyn SnapshotStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = State {
            phase: Phase::RoleUnset,
            session: None,
            uploads: UploadGate::new(settings.max_file_bytes),
            poller: None,
            generation: 0,
            commit_in_flight: false,
            result: None,
            poll_failures: 0,
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                settings,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn upload_state(&self) -> UploadState {
        self.lock().uploads.state()
    }

    pub fn result(&self) -> Option<DisplayResult> {
        self.lock().result.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.lock().poller.as_ref().is_some_and(|p| p.is_running())
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.inner.settings
    }

    /// Resolve once the phase is one of `targets` or terminal.
    pub async fn wait_for_phase(&self, targets: &[Phase]) -> Phase {
        let mut rx = self.subscribe();
        loop {
            let phase = self.phase();
            if targets.contains(&phase) || phase.is_terminal() {
                return phase;
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.phase(),
            }
        }
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Open a new session as the initiator. Returns the relay's session id.
    pub async fn create_session(
        &self,
        company_name: &str,
        privacy_level: PrivacyLevel,
    ) -> Result<String, SessionError> {
        let company_name = required(company_name, "company_name").map_err(|e| self.fail(e))?;
        let generation = self.begin_request(Event::CreateRequested)?;

        tracing::info!(company = %company_name, privacy = %privacy_level, "creating session");
        let request = CreateSessionRequest {
            company_name: company_name.clone(),
            privacy_level,
        };
        let created = match self.inner.transport.create(&request).await {
            Ok(created) => created,
            Err(e) => return Err(self.request_failed(generation, e)),
        };

        let mut state = self.lock();
        if state.generation != generation {
            return Err(SessionError::NoActiveSession);
        }
        if created.role != Role::Initiator {
            tracing::warn!(role = %created.role, "relay assigned an unexpected role on create");
        }
        // The requested level is authoritative; the relay only echoes it.
        let session = Session::new(
            created.session_id.clone(),
            Role::Initiator,
            company_name,
            privacy_level,
        );
        state.clear_session();
        state.session = Some(session);
        self.transition(&mut state, Event::Created)?;
        self.persist(&state);
        self.start_polling(&mut state, self.inner.settings.poll_interval);

        self.emit(CoordinatorEvent::SessionCreated {
            session_id: created.session_id.clone(),
        });
        self.emit(CoordinatorEvent::Notice(Notice::success(format!(
            "Session {} created",
            created.session_id
        ))));
        Ok(created.session_id)
    }

    /// Join an existing session as the responder.
    pub async fn join_session(
        &self,
        session_id: &str,
        company_name: &str,
    ) -> Result<Session, SessionError> {
        let session_id = required(session_id, "session_id").map_err(|e| self.fail(e))?;
        let company_name = required(company_name, "company_name").map_err(|e| self.fail(e))?;
        let generation = self.begin_request(Event::JoinRequested)?;

        tracing::info!(session_id = %session_id, company = %company_name, "joining session");
        let request = JoinSessionRequest {
            session_id,
            company_name: company_name.clone(),
        };
        let joined = match self.inner.transport.join(&request).await {
            Ok(joined) => joined,
            Err(e) => return Err(self.request_failed(generation, e)),
        };

        let mut state = self.lock();
        if state.generation != generation {
            return Err(SessionError::NoActiveSession);
        }
        let mut session = Session::new(
            joined.session_id.clone(),
            Role::Responder,
            company_name,
            joined.privacy_level,
        );
        session.initiator_name = joined.company_a_name.clone();
        state.clear_session();
        state.session = Some(session.clone());
        self.transition(&mut state, Event::Joined)?;
        self.persist(&state);
        self.start_polling(&mut state, self.inner.settings.input_poll_interval);

        self.emit(CoordinatorEvent::SessionJoined {
            session_id: joined.session_id.clone(),
            initiator_name: joined.company_a_name,
        });
        Ok(session)
    }

    /// Rehydrate the persisted session, if any, after checking it with the
    /// relay.
    ///
    /// A snapshot the relay no longer recognises is cleared and `Ok(None)`
    /// is returned. Network failures are returned as errors and leave the
    /// snapshot in place for a later attempt.
    pub async fn validate(&self) -> Result<Option<Session>, SessionError> {
        let snapshot = match self.inner.store.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.fail(SessionError::Store(e))),
        };

        {
            let state = self.lock();
            if state.phase != Phase::RoleUnset {
                return Err(self.fail(SessionError::InvalidTransition {
                    from: state.phase,
                    event: Event::Resumed {
                        committed: snapshot.committed,
                        awaiting_peer: false,
                    },
                }));
            }
        }

        tracing::info!(session_id = %snapshot.session_id, "validating saved session");
        let status = match self.inner.transport.status(&snapshot.session_id).await {
            Ok(status) => status,
            Err(e @ (TransportError::NotFound { .. } | TransportError::Rejected { .. })) => {
                if let Err(clear_err) = self.inner.store.clear() {
                    tracing::warn!(error = %clear_err, "failed to clear stale snapshot");
                }
                let message = format!(
                    "Saved session {} is no longer available: {}",
                    snapshot.session_id, e
                );
                self.emit(CoordinatorEvent::Invalidated {
                    message: message.clone(),
                });
                self.emit(CoordinatorEvent::Notice(Notice::warning(message)));
                return Ok(None);
            }
            Err(e) => return Err(self.fail(e.into())),
        };

        let generation = {
            let mut state = self.lock();
            if state.phase != Phase::RoleUnset {
                return Err(SessionError::InvalidTransition {
                    from: state.phase,
                    event: Event::Resumed {
                        committed: snapshot.committed,
                        awaiting_peer: false,
                    },
                });
            }

            let mut session = Session::from_snapshot(&snapshot);
            session.peer_joined = status.peer_joined(session.role);
            session.peer_committed = status.peer_committed(session.role);
            // A crash between the commit acknowledgment and the save leaves
            // the relay ahead of the snapshot.
            session.committed = snapshot.committed || status.committed(session.role);
            let awaiting_peer = session.role == Role::Initiator && !session.peer_joined;
            let event = Event::Resumed {
                committed: session.committed,
                awaiting_peer,
            };
            let changed = session.committed != snapshot.committed;

            state.clear_session();
            state.generation += 1;
            state.session = Some(session);
            let phase = self.transition(&mut state, event)?;
            if changed {
                self.persist(&state);
            }
            let interval = if phase == Phase::WaitingForPeer {
                self.inner.settings.poll_interval
            } else {
                self.inner.settings.input_poll_interval
            };
            self.start_polling(&mut state, interval);

            self.emit(CoordinatorEvent::SessionResumed {
                session_id: snapshot.session_id.clone(),
            });
            self.emit(CoordinatorEvent::Notice(Notice::info(format!(
                "Resumed session {} as {}",
                snapshot.session_id, snapshot.role
            ))));
            state.generation
        };

        self.on_status(generation, status).await;
        Ok(self.session())
    }

    /// Drop the session locally and remove the snapshot.
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        state.clear_session();
        state.generation += 1;
        self.transition(&mut state, Event::Reset)?;
        drop(state);

        self.inner.store.clear().map_err(|e| self.fail(SessionError::Store(e)))?;
        tracing::info!("session reset");
        self.emit(CoordinatorEvent::Notice(Notice::info("Session cleared")));
        Ok(())
    }

    // ── Uploads ──────────────────────────────────────────────────────

    pub fn stage_file(&self, slot: ArtifactSlot, file: StagedFile) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.commit_in_flight {
            return Err(self.fail(SessionError::CommitInFlight));
        }
        let name = file.file_name.clone();
        state
            .uploads
            .stage(slot, file)
            .map_err(|e| self.fail(e.into()))?;
        tracing::debug!(%slot, file = %name, "artifact staged");
        Ok(())
    }

    /// Send both staged artifacts. Succeeds without a request when they were
    /// already accepted.
    pub async fn upload_files(&self) -> Result<(), SessionError> {
        let (generation, upload) = {
            let mut state = self.lock();
            let (session_id, role) = match &state.session {
                Some(s) => (s.session_id.clone(), s.role),
                None => return Err(self.fail(SessionError::NoActiveSession)),
            };
            if state.commit_in_flight {
                return Err(self.fail(SessionError::CommitInFlight));
            }
            let upload = state
                .uploads
                .prepare(&session_id, role)
                .map_err(|e| self.fail(e.into()))?;
            let Some(upload) = upload else {
                return Ok(());
            };
            state.commit_in_flight = true;
            (state.generation, upload)
        };

        let sent = self.send_upload(generation, &upload).await;
        match sent {
            Ok(()) => {
                let mut state = self.lock();
                if state.generation == generation {
                    state.commit_in_flight = false;
                }
                Ok(())
            }
            Err(e) => Err(self.operation_failed(generation, e)),
        }
    }

    async fn send_upload(&self, generation: u64, upload: &ArtifactUpload) -> Result<(), SessionError> {
        tracing::info!(session_id = %upload.session_id, "uploading artifacts");
        let receipt = self.inner.transport.upload(upload).await?;
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(SessionError::NoActiveSession);
            }
            state.uploads.mark_uploaded();
        }
        tracing::debug!(files = receipt.files.len(), "upload acknowledged");
        self.emit(CoordinatorEvent::FilesUploaded);
        self.emit(CoordinatorEvent::Notice(Notice::success(
            receipt
                .message
                .unwrap_or_else(|| "Documents uploaded".to_string()),
        )));
        Ok(())
    }

    // ── Commit & reveal ──────────────────────────────────────────────

    /// Commit `amount` for this participant, uploading staged artifacts first
    /// when needed.
    pub async fn submit_commit(&self, amount: f64) -> Result<CommitOutcome, SessionError> {
        let (generation, session_id, role, upload) = {
            let mut state = self.lock();
            let (session_id, role, committed) = match &state.session {
                Some(s) => (s.session_id.clone(), s.role, s.committed),
                None => return Err(self.fail(SessionError::NoActiveSession)),
            };
            if committed {
                return Err(self.fail(SessionError::AlreadyCommitted));
            }
            if state.commit_in_flight {
                return Err(self.fail(SessionError::CommitInFlight));
            }
            if state.phase != Phase::InputReady {
                return Err(self.fail(SessionError::InvalidTransition {
                    from: state.phase,
                    event: Event::CommitAcknowledged,
                }));
            }
            validate_amount(amount, self.inner.settings.minimum_amount)
                .map_err(|e| self.fail(e.into()))?;
            let upload = state
                .uploads
                .prepare(&session_id, role)
                .map_err(|e| self.fail(e.into()))?;
            state.commit_in_flight = true;
            (state.generation, session_id, role, upload)
        };

        if let Some(upload) = upload {
            if let Err(e) = self.send_upload(generation, &upload).await {
                return Err(self.operation_failed(generation, e));
            }
        }

        tracing::info!(session_id = %session_id, %role, "submitting commitment");
        let request = CommitRequest {
            session_id,
            role,
            amount,
        };
        let receipt = match self.inner.transport.commit(&request).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.operation_failed(generation, e.into())),
        };

        let ticket = {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(SessionError::NoActiveSession);
            }
            state.commit_in_flight = false;
            // A poll tick invalidated the session and already told the user.
            if state.phase == Phase::Invalidated {
                return Err(SessionError::Invalidated);
            }
            if let Some(session) = state.session.as_mut() {
                session.committed = true;
                session.level_info = receipt.level_info.clone();
            }
            self.transition(&mut state, Event::CommitAcknowledged)?;
            self.persist(&state);
            self.emit(CoordinatorEvent::Committed {
                level_info: receipt.level_info.clone(),
            });
            self.emit(CoordinatorEvent::Notice(Notice::success(
                "Commitment recorded",
            )));

            if receipt.both_committed() {
                self.claim_reveal(&mut state)
            } else {
                None
            }
        };

        match ticket {
            Some(ticket) => match self.run_reveal(ticket).await {
                Ok(result) => Ok(CommitOutcome::Revealed(result)),
                Err(e) => Ok(CommitOutcome::RevealFailed {
                    message: e.to_string(),
                }),
            },
            None => Ok(CommitOutcome::AwaitingPeer),
        }
    }

    /// Reveal again after a failed attempt. Returns the cached result when it
    /// has already been shown.
    pub async fn retry_reveal(&self) -> Result<DisplayResult, SessionError> {
        let ticket = {
            let mut state = self.lock();
            match state.phase {
                Phase::ResultShown => {
                    if let Some(result) = &state.result {
                        return Ok(result.clone());
                    }
                    return Err(self.fail(SessionError::RevealNotReady));
                }
                Phase::BothCommitted => {}
                Phase::Invalidated => return Err(self.fail(SessionError::Invalidated)),
                _ => return Err(self.fail(SessionError::RevealNotReady)),
            }
            if state.session.as_ref().is_some_and(|s| s.result_revealed) {
                return Err(self.fail(SessionError::RevealInFlight));
            }
            match self.claim_reveal(&mut state) {
                Some(ticket) => ticket,
                None => return Err(self.fail(SessionError::RevealNotReady)),
            }
        };
        self.run_reveal(ticket).await
    }

    /// Set the reveal guard and move to `BothCommitted`. Must be called with
    /// the state lock held; returns `None` when the guard is already taken.
    fn claim_reveal(&self, state: &mut State) -> Option<RevealTicket> {
        let phase = state.phase;
        if !matches!(phase, Phase::Committed | Phase::BothCommitted) {
            return None;
        }
        let session = state.session.as_mut()?;
        if !session.committed || session.result_revealed {
            return None;
        }
        session.result_revealed = true;
        let ticket = RevealTicket {
            generation: state.generation,
            session_id: session.session_id.clone(),
            role: session.role,
        };

        if phase == Phase::Committed {
            if let Err(e) = self.transition(state, Event::BothCommitted) {
                tracing::warn!(error = %e, "unexpected transition failure");
            }
        }
        state.stop_polling();
        self.persist(state);
        self.emit(CoordinatorEvent::RevealStarted);
        Some(ticket)
    }

    async fn run_reveal(&self, ticket: RevealTicket) -> Result<DisplayResult, SessionError> {
        tracing::info!(session_id = %ticket.session_id, "requesting reveal");
        let request = RevealRequest {
            session_id: ticket.session_id,
            role: ticket.role,
        };
        let outcome = self.inner.transport.reveal(&request).await;

        let mut state = self.lock();
        if state.generation != ticket.generation || state.phase != Phase::BothCommitted {
            tracing::debug!("discarding stale reveal response");
            return Err(SessionError::NoActiveSession);
        }

        match outcome {
            Ok(result) => {
                let (privacy, role) = match &state.session {
                    Some(s) => (s.privacy_level, s.role),
                    None => return Err(SessionError::NoActiveSession),
                };
                let display = DisplayResult::from_reveal(&result, privacy, role);
                self.transition(&mut state, Event::Revealed)?;
                state.result = Some(display.clone());
                state.stop_polling();
                self.persist(&state);
                self.emit(CoordinatorEvent::ResultReady(display.clone()));
                Ok(display)
            }
            Err(e) if e.is_not_found() => {
                self.invalidate_locked(&mut state, e.to_string());
                Err(e.into())
            }
            Err(e) => {
                if let Some(session) = state.session.as_mut() {
                    session.result_revealed = false;
                }
                self.transition(&mut state, Event::RevealFailed)?;
                self.persist(&state);
                tracing::warn!(error = %e, "reveal failed");
                self.emit(CoordinatorEvent::Notice(Notice::error(format!(
                    "Reveal failed: {}. Run `veil reveal` to retry",
                    e
                ))));
                Err(e.into())
            }
        }
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Run one status poll immediately, outside the poller's schedule.
    pub async fn tick(&self) -> PollControl {
        let generation = self.lock().generation;
        self.poll_once(generation).await
    }

    async fn poll_once(&self, generation: u64) -> PollControl {
        let session_id = {
            let state = self.lock();
            if state.generation != generation || !state.phase.wants_polling() {
                return PollControl::Stop;
            }
            match &state.session {
                Some(s) => s.session_id.clone(),
                None => return PollControl::Stop,
            }
        };

        match self.inner.transport.status(&session_id).await {
            Ok(status) => self.on_status(generation, status).await,
            Err(e) if e.is_not_found() => {
                let mut state = self.lock();
                if state.generation == generation {
                    self.invalidate_locked(&mut state, e.to_string());
                }
                PollControl::Stop
            }
            Err(e) => {
                let first = {
                    let mut state = self.lock();
                    if state.generation != generation {
                        return PollControl::Stop;
                    }
                    state.poll_failures += 1;
                    state.poll_failures == 1
                };
                tracing::warn!(error = %e, "status poll failed");
                if first {
                    self.emit(CoordinatorEvent::Notice(Notice::warning(format!(
                        "Status check failed: {}. Still trying",
                        e
                    ))));
                }
                PollControl::Continue
            }
        }
    }

    async fn on_status(&self, generation: u64, status: SessionStatus) -> PollControl {
        let ticket = {
            let mut state = self.lock();
            if state.generation != generation {
                return PollControl::Stop;
            }
            state.poll_failures = 0;
            let phase = state.phase;
            let Some(session) = state.session.as_mut() else {
                return PollControl::Stop;
            };

            let peer_joined = status.peer_joined(session.role);
            let peer_committed = status.peer_committed(session.role);
            let newly_committed = peer_committed && !session.peer_committed;
            let changed =
                peer_joined != session.peer_joined || peer_committed != session.peer_committed;
            session.peer_joined = peer_joined;
            session.peer_committed = peer_committed;
            let self_committed = session.committed;

            if changed {
                self.emit(CoordinatorEvent::PeerStatus {
                    peer_joined,
                    peer_committed,
                    self_committed,
                });
            }
            if newly_committed {
                self.emit(CoordinatorEvent::Notice(Notice::info(
                    "The other company has committed",
                )));
            }

            match phase {
                Phase::WaitingForPeer if peer_joined => {
                    if let Err(e) = self.transition(&mut state, Event::PeerJoined) {
                        tracing::warn!(error = %e, "peer join ignored");
                        return PollControl::Continue;
                    }
                    self.emit(CoordinatorEvent::Notice(Notice::success(
                        "The other company joined",
                    )));
                    let interval = self.inner.settings.input_poll_interval;
                    self.start_polling(&mut state, interval);
                    // The replacement poller takes over.
                    return PollControl::Stop;
                }
                Phase::Committed if status.both_committed() && self_committed => {
                    self.claim_reveal(&mut state)
                }
                _ => None,
            }
        };

        match ticket {
            Some(ticket) => {
                let _ = self.run_reveal(ticket).await;
                PollControl::Stop
            }
            None => PollControl::Continue,
        }
    }

    fn start_polling(&self, state: &mut State, interval: Duration) {
        state.stop_polling();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let generation = state.generation;
        state.poller = Some(Poller::spawn(interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => Coordinator { inner }.poll_once(generation).await,
                    None => PollControl::Stop,
                }
            }
        }));
        tracing::debug!(interval_ms = interval.as_millis() as u64, "poller started");
    }

    // ── Invalidation ─────────────────────────────────────────────────

    /// Tear down a session the relay no longer knows and schedule the
    /// auto-reset. Caller holds the lock.
    fn invalidate_locked(&self, state: &mut State, message: String) {
        if self.transition(state, Event::Invalidate).is_err() {
            return;
        }
        tracing::warn!(%message, "session invalidated");
        state.clear_session();
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear snapshot after invalidation");
        }
        self.emit(CoordinatorEvent::Invalidated {
            message: message.clone(),
        });
        self.emit(CoordinatorEvent::Notice(Notice::error(format!(
            "Session is no longer available: {}",
            message
        ))));

        let weak = Arc::downgrade(&self.inner);
        let generation = state.generation;
        let delay = self.inner.settings.auto_reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Coordinator { inner }.auto_reset(generation);
            }
        });
    }

    fn auto_reset(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.phase != Phase::Invalidated {
            return;
        }
        state.generation += 1;
        if self.transition(&mut state, Event::Reset).is_ok() {
            self.emit(CoordinatorEvent::Notice(Notice::info(
                "Ready for a new session",
            )));
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Surface `err` as a notice and hand it back.
    fn fail(&self, err: SessionError) -> SessionError {
        tracing::debug!(error = %err, "operation failed");
        self.emit(CoordinatorEvent::Notice(Notice::error(err.to_string())));
        err
    }

    fn transition(&self, state: &mut State, event: Event) -> Result<Phase, SessionError> {
        let from = state.phase;
        let to = from.next(event)?;
        state.phase = to;
        if from != to {
            tracing::info!(%from, %to, %event, "phase transition");
            self.emit(CoordinatorEvent::PhaseChanged { from, to });
        }
        Ok(to)
    }

    fn persist(&self, state: &State) {
        let Some(session) = &state.session else {
            return;
        };
        if let Err(e) = self.inner.store.save(&session.snapshot(now_millis())) {
            tracing::warn!(error = %e, "failed to persist session");
            self.emit(CoordinatorEvent::Notice(Notice::warning(format!(
                "Could not save the session locally: {:#}",
                e
            ))));
        }
    }

    /// Enter `Creating`/`Joining`, clearing any finished session first.
    fn begin_request(&self, event: Event) -> Result<u64, SessionError> {
        let mut state = self.lock();
        if state.phase.is_terminal() {
            state.clear_session();
            self.transition(&mut state, Event::Reset)?;
        }
        self.transition(&mut state, event)
            .map_err(|e| self.fail(e))?;
        state.generation += 1;
        Ok(state.generation)
    }

    fn request_failed(&self, generation: u64, err: TransportError) -> SessionError {
        let mut state = self.lock();
        if state.generation == generation {
            let _ = self.transition(&mut state, Event::RequestFailed);
        }
        drop(state);
        self.fail(err.into())
    }

    /// Release the in-flight flag after a failed upload or commit.
    fn operation_failed(&self, generation: u64, err: SessionError) -> SessionError {
        let mut state = self.lock();
        if state.generation != generation {
            return err;
        }
        state.commit_in_flight = false;
        if err.is_invalidation() {
            self.invalidate_locked(&mut state, err.to_string());
            return err;
        }
        drop(state);
        self.fail(err)
    }
}

fn required(value: &str, field: &'static str) -> Result<String, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field }.into());
    }
    Ok(trimmed.to_string())
}

fn validate_amount(amount: f64, minimum: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::AmountNotPositive);
    }
    if amount < minimum {
        return Err(ValidationError::AmountBelowMinimum { minimum });
    }
    Ok(())
}
