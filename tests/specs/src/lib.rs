// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session scenarios.
//!
//! [`MockBackend`] is a stateful stand-in for the platform's auth service:
//! it issues, rotates and revokes tokens, so the library and the
//! `sessionward` binary can be exercised against realistic behavior.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// How the refresh endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Issue a new access token and rotate the refresh token.
    Rotate,
    /// Issue a new access token, keep the refresh token.
    Reuse,
    /// Reject every refresh with this status.
    Reject(u16),
}

#[derive(Clone)]
struct User {
    id: String,
    email: String,
    password: String,
    name: String,
}

#[derive(Default)]
struct Tokens {
    /// access token -> user id
    access: HashMap<String, String>,
    /// refresh token -> user id
    refresh: HashMap<String, String>,
}

struct BackendState {
    users: Mutex<Vec<User>>,
    tokens: Mutex<Tokens>,
    serial: AtomicU64,
    refresh_mode: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    /// When set, access tokens are JWTs expiring this many seconds after issue.
    access_ttl: Mutex<Option<u64>>,
    /// Backdates `iat` (and with it `exp`) of issued JWTs by this many seconds.
    access_age: AtomicU64,
    fail_logout: AtomicBool,
    login_calls: AtomicU32,
    refresh_calls: AtomicU32,
    logout_calls: AtomicU32,
    protected_calls: AtomicU32,
}

/// Running mock auth service bound to a random local port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        sessionward::install_crypto_provider();
        let state = Arc::new(BackendState {
            users: Mutex::new(vec![]),
            tokens: Mutex::new(Tokens::default()),
            serial: AtomicU64::new(0),
            refresh_mode: Mutex::new(RefreshMode::Rotate),
            refresh_delay: Mutex::new(Duration::ZERO),
            access_ttl: Mutex::new(None),
            access_age: AtomicU64::new(0),
            fail_logout: AtomicBool::new(false),
            login_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            protected_calls: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/me", get(me))
            .route("/api/results", get(results))
            .route("/api/answers", post(answers))
            .route("/api/rejects-everyone", get(rejects_everyone))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, state })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Register a user that can log in.
    pub fn add_user(&self, id: &str, email: &str, password: &str) {
        self.state.users.lock().push(User {
            id: id.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            name: format!("User {id}"),
        });
    }

    /// Issue a token pair for `user_id` without going through login.
    pub fn issue(&self, user_id: &str) -> (String, String) {
        let access = self.state.new_access(user_id);
        let refresh = self.state.new_refresh(user_id);
        (access, refresh)
    }

    /// Revoke every access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.state.tokens.lock().access.clear();
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.state.refresh_mode.lock() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    /// Issue JWT access tokens expiring `ttl_secs` after issue.
    pub fn set_access_ttl(&self, ttl_secs: Option<u64>) {
        *self.state.access_ttl.lock() = ttl_secs;
    }

    /// Issue JWTs as if they had been minted `age_secs` ago.
    pub fn set_access_age(&self, age_secs: u64) {
        self.state.access_age.store(age_secs, Ordering::SeqCst);
    }

    pub fn set_logout_failure(&self, fail: bool) {
        self.state.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn is_refresh_token_live(&self, token: &str) -> bool {
        self.state.tokens.lock().refresh.contains_key(token)
    }

    pub fn login_calls(&self) -> u32 {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.state.logout_calls.load(Ordering::SeqCst)
    }

    pub fn protected_calls(&self) -> u32 {
        self.state.protected_calls.load(Ordering::SeqCst)
    }
}

impl BackendState {
    fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn new_access(&self, user_id: &str) -> String {
        let serial = self.next_serial();
        let token = match *self.access_ttl.lock() {
            Some(ttl) => {
                let iat = epoch_secs().saturating_sub(self.access_age.load(Ordering::SeqCst));
                jwt(user_id, iat, iat + ttl, serial)
            }
            None => format!("access-{user_id}-{serial}"),
        };
        self.tokens.lock().access.insert(token.clone(), user_id.to_owned());
        token
    }

    fn new_refresh(&self, user_id: &str) -> String {
        let token = format!("refresh-{user_id}-{}", self.next_serial());
        self.tokens.lock().refresh.insert(token.clone(), user_id.to_owned());
        token
    }

    fn authorized(&self, headers: &HeaderMap) -> Option<User> {
        let token = bearer(headers)?;
        let user_id = self.tokens.lock().access.get(&token).cloned()?;
        self.users.lock().iter().find(|u| u.id == user_id).cloned()
    }
}

fn profile(user: &User) -> Value {
    json!({ "id": user.id, "email": user.email, "name": user.name, "role": "candidate" })
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthorized" }))).into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(s): State<Arc<BackendState>>, Json(body): Json<LoginBody>) -> Response {
    s.login_calls.fetch_add(1, Ordering::SeqCst);
    let user = s
        .users
        .lock()
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .cloned();
    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid email or password" })),
        )
            .into_response();
    };
    let access = s.new_access(&user.id);
    let refresh = s.new_refresh(&user.id);
    Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "owner_id": user.id,
        "profile": profile(&user),
    }))
    .into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(s): State<Arc<BackendState>>, Json(body): Json<RefreshBody>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *s.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mode = *s.refresh_mode.lock();
    if let RefreshMode::Reject(code) = mode {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::UNAUTHORIZED);
        return (status, Json(json!({ "message": "refresh rejected" }))).into_response();
    }

    let user_id = s.tokens.lock().refresh.get(&body.refresh_token).cloned();
    let Some(user_id) = user_id else {
        return unauthorized();
    };
    let access = s.new_access(&user_id);
    if mode == RefreshMode::Rotate {
        s.tokens.lock().refresh.remove(&body.refresh_token);
        let rotated = s.new_refresh(&user_id);
        return Json(json!({ "access_token": access, "refresh_token": rotated })).into_response();
    }
    Json(json!({ "access_token": access })).into_response()
}

#[derive(Deserialize, Default)]
struct LogoutBody {
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn logout(State(s): State<Arc<BackendState>>, body: String) -> Response {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    if s.fail_logout.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "logout unavailable").into_response();
    }
    let body: LogoutBody = serde_json::from_str(&body).unwrap_or_default();
    if let Some(token) = body.refresh_token {
        s.tokens.lock().refresh.remove(&token);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn me(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    match s.authorized(&headers) {
        Some(user) => Json(profile(&user)).into_response(),
        None => unauthorized(),
    }
}

async fn results(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    s.protected_calls.fetch_add(1, Ordering::SeqCst);
    match s.authorized(&headers) {
        Some(user) => Json(json!({
            "owner": user.id,
            "results": [{ "test": "interests", "score": 42 }],
        }))
        .into_response(),
        None => unauthorized(),
    }
}

async fn answers(
    State(s): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.protected_calls.fetch_add(1, Ordering::SeqCst);
    match s.authorized(&headers) {
        Some(user) => Json(json!({ "owner": user.id, "received": body })).into_response(),
        None => unauthorized(),
    }
}

async fn rejects_everyone(State(s): State<Arc<BackendState>>) -> Response {
    s.protected_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Unsigned JWT for `sub` issued at `iat`, expiring at `exp`; `jti` keeps
/// tokens distinct.
pub fn jwt(sub: &str, iat: u64, exp: u64, jti: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = json!({ "sub": sub, "exp": exp, "iat": iat, "jti": jti });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

// -- Binary runner -------------------------------------------------------------

/// Resolve the path to the compiled `sessionward` binary.
pub fn sessionward_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("sessionward")
}

/// Captured result of one binary invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `sessionward` against `base_url` with its state under `state_dir`.
pub async fn run_cli(base_url: &str, state_dir: &Path, args: &[&str]) -> anyhow::Result<CliOutput> {
    let binary = sessionward_binary();
    anyhow::ensure!(binary.exists(), "sessionward binary not found at {}", binary.display());

    let output = tokio::process::Command::new(&binary)
        .arg("--base-url")
        .arg(base_url)
        .arg("--state-dir")
        .arg(state_dir)
        .args(args)
        .env("SESSIONWARD_LOG_LEVEL", "warn")
        .env("SESSIONWARD_LOG_FORMAT", "text")
        .env_remove("SESSIONWARD_PASSWORD")
        .output()
        .await?;

    Ok(CliOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
