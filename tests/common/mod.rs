//! In-process relay used by the integration tests.
//!
//! Implements the `/api/v1/mpc` routes the client talks to, keeping every
//! session in memory. Tiers are assigned from the committed amount using
//! [`LEVELS`].

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};
use veil_common::{
    CommitRequest, CreateSessionRequest, JoinSessionRequest, PrivacyLevel, RevealRequest, Role,
};

/// `(level, name, min, max)` tiers, ascending.
pub const LEVELS: [(u8, &str, f64, Option<f64>); 5] = [
    (1, "Seed", 100_000.0, Some(1_000_000.0)),
    (2, "Growth", 1_000_000.0, Some(10_000_000.0)),
    (3, "Scale", 10_000_000.0, Some(100_000_000.0)),
    (4, "Enterprise", 100_000_000.0, Some(1_000_000_000.0)),
    (5, "Titan", 1_000_000_000.0, None),
];

#[derive(Debug, Default, Clone)]
pub struct StubParty {
    pub name: String,
    pub uploaded: bool,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct StubSession {
    pub privacy_level: PrivacyLevel,
    pub company_a: StubParty,
    pub company_b: Option<StubParty>,
    pub reveal_calls: usize,
    pub created_at: String,
}

impl StubSession {
    fn party_mut(&mut self, role: Role) -> Option<&mut StubParty> {
        match role {
            Role::Initiator => Some(&mut self.company_a),
            Role::Responder => self.company_b.as_mut(),
        }
    }

    fn committed(&self, role: Role) -> bool {
        match role {
            Role::Initiator => self.company_a.amount.is_some(),
            Role::Responder => self.company_b.as_ref().is_some_and(|b| b.amount.is_some()),
        }
    }

    fn both_committed(&self) -> bool {
        self.committed(Role::Initiator) && self.committed(Role::Responder)
    }

    fn phase(&self) -> &'static str {
        if self.reveal_calls > 0 {
            "revealed"
        } else if self.both_committed() {
            "both_committed"
        } else {
            "waiting_for_b"
        }
    }
}

#[derive(Debug, Default)]
pub struct RelayState {
    pub sessions: HashMap<String, StubSession>,
    next_id: u64,
}

type Shared = Arc<RwLock<RelayState>>;

pub struct RelayStub {
    pub state: Shared,
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RelayStub {
    /// Bind to a free localhost port and start serving.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state: Shared = Arc::new(RwLock::new(RelayState::default()));
        let app = router(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            state,
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn reveal_calls(&self, session_id: &str) -> usize {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map(|s| s.reveal_calls)
            .unwrap_or(0)
    }

    /// Forget a session, as the relay does when it expires one.
    pub async fn drop_session(&self, session_id: &str) {
        self.state.write().await.sessions.remove(session_id);
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RelayStub {
    fn drop(&mut self) {
        self.stop();
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/v1/mpc/sessions", post(create))
        .route("/api/v1/mpc/sessions/join", post(join))
        .route("/api/v1/mpc/sessions/upload", post(upload))
        .route("/api/v1/mpc/sessions/commit", post(commit))
        .route("/api/v1/mpc/sessions/reveal", post(reveal))
        .route("/api/v1/mpc/sessions/{id}/status", get(status))
        .route("/api/v1/mpc/sessions/{id}/export", get(export))
        .route("/api/v1/mpc/levels", get(levels))
        .route("/api/v1/mpc/history", get(history))
        .with_state(state)
}

type Reply = (StatusCode, Json<Value>);

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn not_found() -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Session not found" })),
    )
}

fn bad_request(detail: &str) -> Reply {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail })))
}

fn level_json(level: u8) -> Value {
    LEVELS
        .iter()
        .find(|(n, ..)| *n == level)
        .map(|(n, name, min, max)| {
            json!({
                "level": n,
                "name": name,
                "description": format!("{} revenue tier", name),
                "min": min,
                "max": max,
            })
        })
        .unwrap_or(Value::Null)
}

pub fn level_for(amount: f64) -> u8 {
    LEVELS
        .iter()
        .rev()
        .find(|(_, _, min, _)| amount >= *min)
        .map(|(n, ..)| *n)
        .unwrap_or(1)
}

fn result_json(session: &StubSession) -> Value {
    let b = session.company_b.clone().unwrap_or_default();
    let a_level = level_for(session.company_a.amount.unwrap_or_default());
    let b_level = level_for(b.amount.unwrap_or_default());
    let (comparison, message) = match a_level.cmp(&b_level) {
        std::cmp::Ordering::Equal => ("equal", "Both companies are in the same tier"),
        std::cmp::Ordering::Greater => (
            "a_higher",
            "Company A is in a higher tier than Company B",
        ),
        std::cmp::Ordering::Less => ("b_higher", "Company B is in a higher tier than Company A"),
    };
    json!({
        "comparison": comparison,
        "message": message,
        "company_a": { "name": session.company_a.name, "level_info": level_json(a_level) },
        "company_b": { "name": b.name, "level_info": level_json(b_level) },
        "privacy_level": session.privacy_level,
    })
}

async fn create(State(state): State<Shared>, Json(req): Json<CreateSessionRequest>) -> Reply {
    let mut state = state.write().await;
    state.next_id += 1;
    let session_id = format!("sess-{}", state.next_id);
    state.sessions.insert(
        session_id.clone(),
        StubSession {
            privacy_level: req.privacy_level,
            company_a: StubParty {
                name: req.company_name,
                ..Default::default()
            },
            company_b: None,
            reveal_calls: 0,
            created_at: "2026-01-01T00:00:00".to_string(),
        },
    );
    ok(json!({
        "success": true,
        "session_id": session_id,
        "role": "company_a",
        "privacy_level": req.privacy_level,
    }))
}

async fn join(State(state): State<Shared>, Json(req): Json<JoinSessionRequest>) -> Reply {
    let mut state = state.write().await;
    let Some(session) = state.sessions.get_mut(&req.session_id) else {
        return not_found();
    };
    if session.company_b.is_some() {
        return bad_request("Session already has two participants");
    }
    session.company_b = Some(StubParty {
        name: req.company_name,
        ..Default::default()
    });
    ok(json!({
        "success": true,
        "session_id": req.session_id,
        "role": "company_b",
        "privacy_level": session.privacy_level,
        "company_a_name": session.company_a.name,
    }))
}

async fn status(State(state): State<Shared>, Path(id): Path<String>) -> Reply {
    let state = state.read().await;
    let Some(session) = state.sessions.get(&id) else {
        return not_found();
    };
    ok(json!({
        "success": true,
        "status": session.phase(),
        "company_a_committed": session.committed(Role::Initiator),
        "company_b_committed": session.committed(Role::Responder),
        "company_b_joined": session.company_b.is_some(),
    }))
}

async fn upload(State(state): State<Shared>, mut multipart: Multipart) -> Reply {
    let mut session_id = None;
    let mut role = None;
    let mut files = serde_json::Map::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let Ok(data) = field.bytes().await else {
            return bad_request("Malformed upload");
        };
        match name.as_str() {
            "session_id" => session_id = Some(String::from_utf8_lossy(&data).to_string()),
            "role" => role = String::from_utf8_lossy(&data).parse::<Role>().ok(),
            "bank_statement" | "commitment_letter" => {
                files.insert(name, json!(file_name.unwrap_or_default()));
            }
            _ => {}
        }
    }

    let (Some(session_id), Some(role)) = (session_id, role) else {
        return bad_request("session_id and role are required");
    };
    if files.len() != 2 {
        return bad_request("Both documents are required");
    }

    let mut state = state.write().await;
    let Some(session) = state.sessions.get_mut(&session_id) else {
        return not_found();
    };
    let Some(party) = session.party_mut(role) else {
        return bad_request("Company B has not joined");
    };
    party.uploaded = true;
    ok(json!({ "success": true, "message": "Files uploaded", "files": files }))
}

async fn commit(State(state): State<Shared>, Json(req): Json<CommitRequest>) -> Reply {
    let mut state = state.write().await;
    let Some(session) = state.sessions.get_mut(&req.session_id) else {
        return not_found();
    };
    if session.company_b.is_none() {
        return bad_request("Waiting for Company B to join");
    }
    let Some(party) = session.party_mut(req.role) else {
        return bad_request("Unknown participant");
    };
    if !party.uploaded {
        return ok(json!({ "success": false, "message": "Upload documents before committing" }));
    }
    if party.amount.is_some() {
        return bad_request("Already committed");
    }
    party.amount = Some(req.amount);
    let level = level_for(req.amount);
    ok(json!({
        "success": true,
        "level_info": level_json(level),
        "status": session.phase(),
    }))
}

async fn reveal(State(state): State<Shared>, Json(req): Json<RevealRequest>) -> Reply {
    let mut state = state.write().await;
    let Some(session) = state.sessions.get_mut(&req.session_id) else {
        return not_found();
    };
    if !session.both_committed() {
        return bad_request("Both companies must commit before reveal");
    }
    session.reveal_calls += 1;
    ok(json!({ "success": true, "result": result_json(session) }))
}

async fn export(State(state): State<Shared>, Path(id): Path<String>) -> Reply {
    let state = state.read().await;
    let Some(session) = state.sessions.get(&id) else {
        return not_found();
    };
    ok(json!({
        "success": true,
        "data": {
            "session_id": id,
            "status": session.phase(),
            "privacy_level": session.privacy_level,
            "company_a_name": session.company_a.name,
            "company_b_name": session.company_b.as_ref().map(|b| b.name.clone()),
        },
    }))
}

async fn levels() -> Reply {
    let levels: Vec<Value> = LEVELS.iter().map(|(n, ..)| level_json(*n)).collect();
    ok(json!({ "success": true, "levels": levels }))
}

async fn history(State(state): State<Shared>) -> Reply {
    let state = state.read().await;
    let mut entries: Vec<Value> = state
        .sessions
        .iter()
        .filter(|(_, s)| s.reveal_calls > 0)
        .map(|(id, s)| {
            json!({
                "session_id": id,
                "created_at": s.created_at,
                "company_a_name": s.company_a.name,
                "company_b_name": s.company_b.as_ref().map(|b| b.name.clone()),
                "result": result_json(s),
            })
        })
        .collect();
    entries.sort_by(|a, b| a["session_id"].as_str().cmp(&b["session_id"].as_str()));
    ok(json!({ "success": true, "count": entries.len(), "history": entries }))
}
