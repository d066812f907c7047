// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable auth backend and a wired-up
//! session stack around it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::cache::ResponseCache;
use crate::client::SessionClient;
use crate::config::SessionConfig;
use crate::events::SessionEvents;
use crate::refresh::RefreshCoordinator;
use crate::storage::MemoryStorage;
use crate::store::TokenStore;

/// Build an unsigned JWT with the given `exp`.
pub fn jwt(sub: &str, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

/// Unsigned JWT with both `iat` and `exp`.
pub fn jwt_issued(sub: &str, iat: u64, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload =
        URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","iat":{iat},"exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

pub fn now_secs() -> u64 {
    crate::token::epoch_secs()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Scripted responses for [`MockAuth`].
pub struct MockAuthBuilder {
    refresh: Vec<(u16, String)>,
    refresh_delay: Duration,
    data_delay: Duration,
    login: (u16, String),
    me: Option<(u16, String)>,
    logout_status: u16,
    accepted: Vec<String>,
}

impl Default for MockAuthBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthBuilder {
    pub fn new() -> Self {
        Self {
            refresh: vec![(500, "{}".to_owned())],
            refresh_delay: Duration::ZERO,
            data_delay: Duration::ZERO,
            login: (500, "{}".to_owned()),
            me: None,
            logout_status: 200,
            accepted: vec![],
        }
    }

    /// Responses to successive refresh calls; the last one repeats.
    pub fn refresh(mut self, responses: Vec<(u16, serde_json::Value)>) -> Self {
        self.refresh = responses.into_iter().map(|(s, b)| (s, b.to_string())).collect();
        self
    }

    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Delay before `/api/data` answers.
    pub fn data_delay(mut self, delay: Duration) -> Self {
        self.data_delay = delay;
        self
    }

    pub fn login(mut self, code: u16, body: serde_json::Value) -> Self {
        self.login = (code, body.to_string());
        self
    }

    /// Fixed identity response. Without one, `/api/auth/me` answers with a
    /// profile for whichever accepted token was presented.
    pub fn me(mut self, code: u16, body: serde_json::Value) -> Self {
        self.me = Some((code, body.to_string()));
        self
    }

    pub fn logout_status(mut self, code: u16) -> Self {
        self.logout_status = code;
        self
    }

    /// Tokens the protected routes accept.
    pub fn accept(mut self, token: &str) -> Self {
        self.accepted.push(token.to_owned());
        self
    }

    pub async fn start(self) -> anyhow::Result<MockAuth> {
        let mock = MockAuth {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            refresh_calls: Arc::new(AtomicU32::new(0)),
            data_calls: Arc::new(AtomicU32::new(0)),
            login_calls: Arc::new(AtomicU32::new(0)),
            logout_calls: Arc::new(AtomicU32::new(0)),
            me_calls: Arc::new(AtomicU32::new(0)),
            accepted: Arc::new(Mutex::new(self.accepted)),
            refresh_bodies: Arc::new(Mutex::new(vec![])),
        };

        let refresh_route = {
            let count = Arc::clone(&mock.refresh_calls);
            let bodies = Arc::clone(&mock.refresh_bodies);
            let responses = Arc::new(self.refresh);
            let delay = self.refresh_delay;
            post(move |body: String| {
                let count = Arc::clone(&count);
                let bodies = Arc::clone(&bodies);
                let responses = Arc::clone(&responses);
                async move {
                    let idx = count.fetch_add(1, Ordering::SeqCst) as usize;
                    bodies.lock().push(body);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let (code, body) = responses
                        .get(idx)
                        .or_else(|| responses.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    (status(code), body)
                }
            })
        };

        let data_route = {
            let count = Arc::clone(&mock.data_calls);
            let accepted = Arc::clone(&mock.accepted);
            let delay = self.data_delay;
            move |headers: HeaderMap, body: String| {
                let count = Arc::clone(&count);
                let accepted = Arc::clone(&accepted);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match bearer(&headers) {
                        Some(token) if accepted.lock().contains(&token) => {
                            let reply = serde_json::json!({ "token": token, "body": body });
                            (StatusCode::OK, reply.to_string())
                        }
                        _ => (StatusCode::UNAUTHORIZED, "{}".to_owned()),
                    }
                }
            }
        };

        let login_route = {
            let count = Arc::clone(&mock.login_calls);
            let (code, body) = self.login;
            post(move || {
                count.fetch_add(1, Ordering::SeqCst);
                let body = body.clone();
                async move { (status(code), body) }
            })
        };

        let logout_route = {
            let count = Arc::clone(&mock.logout_calls);
            let code = self.logout_status;
            post(move || {
                count.fetch_add(1, Ordering::SeqCst);
                async move { (status(code), "{}".to_owned()) }
            })
        };

        let me_route = {
            let count = Arc::clone(&mock.me_calls);
            let accepted = Arc::clone(&mock.accepted);
            let fixed = self.me;
            get(move |headers: HeaderMap| {
                count.fetch_add(1, Ordering::SeqCst);
                let accepted = Arc::clone(&accepted);
                let fixed = fixed.clone();
                async move {
                    if let Some((code, body)) = fixed {
                        return (status(code), body);
                    }
                    match bearer(&headers) {
                        Some(token) if accepted.lock().contains(&token) => {
                            let reply = serde_json::json!({ "id": "u1", "email": "ada@example.com" });
                            (StatusCode::OK, reply.to_string())
                        }
                        _ => (StatusCode::UNAUTHORIZED, "{}".to_owned()),
                    }
                }
            })
        };

        let app = Router::new()
            .route("/api/auth/refresh", refresh_route)
            .route("/api/auth/login", login_route)
            .route("/api/auth/logout", logout_route)
            .route("/api/auth/me", me_route)
            .route("/api/data", get(data_route.clone()).post(data_route))
            .route(
                "/api/always401",
                get(|| async { (StatusCode::UNAUTHORIZED, "{}".to_owned()) }),
            )
            .route("/api/boom", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(MockAuth { addr, ..mock })
    }
}

/// Running mock auth backend with per-route call counters.
pub struct MockAuth {
    pub addr: SocketAddr,
    pub refresh_calls: Arc<AtomicU32>,
    pub data_calls: Arc<AtomicU32>,
    pub login_calls: Arc<AtomicU32>,
    pub logout_calls: Arc<AtomicU32>,
    pub me_calls: Arc<AtomicU32>,
    accepted: Arc<Mutex<Vec<String>>>,
    refresh_bodies: Arc<Mutex<Vec<String>>>,
}

impl MockAuth {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn accept(&self, token: &str) {
        self.accepted.lock().push(token.to_owned());
    }

    pub fn refreshes(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_bodies(&self) -> Vec<String> {
        self.refresh_bodies.lock().clone()
    }
}

/// Store, coordinator and client wired together over memory storage.
pub struct Harness {
    pub config: SessionConfig,
    pub storage: MemoryStorage,
    pub store: Arc<TokenStore>,
    pub events: SessionEvents,
    pub cache: Arc<ResponseCache>,
    pub coordinator: RefreshCoordinator,
    pub client: SessionClient,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(SessionConfig::new(base_url))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_storage(config, MemoryStorage::new())
    }

    /// Rehydrates from whatever `storage` already holds.
    pub fn with_storage(config: SessionConfig, storage: MemoryStorage) -> Self {
        let store = Arc::new(TokenStore::open(Arc::new(storage.clone())));
        let events = SessionEvents::new();
        let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
        crate::install_crypto_provider();
        let http = reqwest::Client::new();
        let coordinator = RefreshCoordinator::new(
            &config,
            http.clone(),
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&cache),
        );
        let client = SessionClient::new(
            &config,
            http,
            Arc::clone(&store),
            coordinator.clone(),
            Arc::clone(&cache),
        );
        Self { config, storage, store, events, cache, coordinator, client }
    }

    pub fn seed(&self, access: &str, refresh: Option<&str>, owner: &str) -> anyhow::Result<()> {
        self.store.set_tokens(access.into(), refresh.map(str::to_owned), Some(owner.into()))?;
        Ok(())
    }
}
