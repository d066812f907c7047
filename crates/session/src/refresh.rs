// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! At most one refresh call is in flight. Callers arriving while it runs
//! attach to the same shared future and observe the same token or the same
//! error. A failed cycle clears the session and emits one `ForcedLogout`,
//! from inside the shared future, so the event fires once per cycle no matter
//! how many callers were waiting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{RefreshRequest, RefreshResponse};
use crate::cache::ResponseCache;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{expired_redirect, LogoutReason, SessionEvent, SessionEvents};
use crate::store::{SessionSnapshot, TokenStore};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, SessionError>>>;

struct InFlight {
    generation: u64,
    /// Owner of the session the cycle renews.
    owner_id: Option<String>,
    future: RefreshFuture,
}

/// The token a rejected request carried, and the owner it was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleToken<'a> {
    pub access_token: &'a str,
    pub owner_id: &'a str,
}

impl<'a> StaleToken<'a> {
    pub fn new(access_token: &'a str, owner_id: &'a str) -> Self {
        Self { access_token, owner_id }
    }
}

/// Outcome of the last failed cycle, keyed by the access token that was
/// current when it started.
struct Failure {
    access_token: String,
    error: SessionError,
}

#[derive(Default)]
struct CoordinatorState {
    generation: u64,
    in_flight: Option<InFlight>,
    last_failure: Option<Failure>,
}

struct Inner {
    http: reqwest::Client,
    store: Arc<TokenStore>,
    events: SessionEvents,
    cache: Arc<ResponseCache>,
    refresh_url: String,
    refresh_timeout: Duration,
    login_redirect: String,
    state: Mutex<CoordinatorState>,
}

/// Coordinates refreshes for one [`TokenStore`]. Cheap to clone.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        config: &SessionConfig,
        http: reqwest::Client,
        store: Arc<TokenStore>,
        events: SessionEvents,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                store,
                events,
                cache,
                refresh_url: config.url(&config.refresh_path),
                refresh_timeout: config.refresh_timeout(),
                login_redirect: config.login_redirect.clone(),
                state: Mutex::new(CoordinatorState::default()),
            }),
        }
    }

    /// Join the in-flight refresh, or start one.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        self.refresh_after(None).await
    }

    /// Refresh on behalf of a request rejected while carrying `stale`.
    ///
    /// A token is only ever handed back for the owner the request was sent
    /// for: once the session belongs to someone else, the answer is
    /// `SessionOwnershipMismatch`. Otherwise joins the in-flight refresh if
    /// there is one. Failing that, if the store already holds a different
    /// token (a refresh completed after the request was sent), that token is
    /// returned without a network call. A `stale` token whose refresh already
    /// failed gets that failure back.
    pub async fn refresh_after(
        &self,
        stale: Option<StaleToken<'_>>,
    ) -> Result<String, SessionError> {
        let (future, started) = {
            let mut state = self.inner.state.lock();
            let current = self.inner.store.snapshot();
            if let (Some(stale), Some(current)) = (stale, current.as_ref()) {
                if current.owner_id != stale.owner_id {
                    debug!("session owner changed since the request was sent");
                    return Err(SessionError::SessionOwnershipMismatch);
                }
            }
            match state.in_flight {
                Some(ref in_flight) => {
                    let foreign = stale.is_some_and(|stale| {
                        in_flight.owner_id.as_deref().is_some_and(|o| o != stale.owner_id)
                    });
                    if foreign {
                        return Err(SessionError::SessionOwnershipMismatch);
                    }
                    (in_flight.future.clone(), false)
                }
                None => {
                    if let Some(stale) = stale {
                        match current {
                            Some(ref current) if current.access_token != stale.access_token => {
                                return Ok(current.access_token.clone());
                            }
                            _ => {}
                        }
                        if let Some(ref failure) = state.last_failure {
                            if failure.access_token == stale.access_token {
                                return Err(failure.error.clone());
                            }
                        }
                    }
                    (self.start(&mut state, current), true)
                }
            }
        };
        if started {
            // Drive the cycle to completion even if every waiter is dropped.
            tokio::spawn(future.clone());
        }
        future.await
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    /// Number of refresh cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.inner.state.lock().generation
    }

    fn start(
        &self,
        state: &mut CoordinatorState,
        snapshot: Option<SessionSnapshot>,
    ) -> RefreshFuture {
        state.generation += 1;
        let generation = state.generation;
        let owner_id = snapshot.as_ref().map(|s| s.owner_id.clone());
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let started_with = snapshot.as_ref().map(|s| s.access_token.clone());
            let result = inner.run(snapshot).await;

            let mut state = inner.state.lock();
            if state.in_flight.as_ref().is_some_and(|f| f.generation == generation) {
                state.in_flight = None;
            }
            match (&result, started_with) {
                (Err(error), Some(access_token)) => {
                    state.last_failure = Some(Failure { access_token, error: error.clone() });
                }
                (Ok(_), _) => state.last_failure = None,
                _ => {}
            }
            result
        }
        .boxed()
        .shared();
        state.in_flight = Some(InFlight { generation, owner_id, future: future.clone() });
        future
    }
}

impl Inner {
    async fn run(&self, snapshot: Option<SessionSnapshot>) -> Result<String, SessionError> {
        let Some(snapshot) = snapshot else {
            debug!("refresh requested without a session");
            return Err(SessionError::NoRefreshToken);
        };
        let Some(refresh_token) = snapshot.refresh_token else {
            return Err(self.fail(
                &snapshot.access_token,
                SessionError::NoRefreshToken,
                LogoutReason::NoRefreshToken,
            ));
        };

        info!(owner = %snapshot.owner_id, "refreshing access token");
        let response = match tokio::time::timeout(self.refresh_timeout, self.call(&refresh_token))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(self.fail(&snapshot.access_token, e, LogoutReason::RefreshFailed))
            }
            Err(_) => {
                let e = SessionError::RefreshFailed(format!(
                    "timed out after {}ms",
                    self.refresh_timeout.as_millis()
                ));
                return Err(self.fail(&snapshot.access_token, e, LogoutReason::RefreshFailed));
            }
        };

        let access_token = response.access_token;
        match self.store.replace_if_current(
            &refresh_token,
            access_token.clone(),
            response.refresh_token,
        ) {
            Ok(true) => {
                info!(owner = %snapshot.owner_id, "access token refreshed");
                self.events.emit(SessionEvent::Refreshed { owner_id: snapshot.owner_id });
                Ok(access_token)
            }
            Ok(false) => {
                debug!("session changed during refresh, discarding refreshed tokens");
                match self.store.snapshot() {
                    Some(current) if current.owner_id == snapshot.owner_id => {
                        Ok(current.access_token)
                    }
                    Some(_) => Err(SessionError::SessionOwnershipMismatch),
                    None => Err(SessionError::Unauthenticated),
                }
            }
            Err(e) => {
                // The store already dropped the session.
                self.forced_logout(LogoutReason::RefreshFailed);
                Err(e)
            }
        }
    }

    async fn call(&self, refresh_token: &str) -> Result<RefreshResponse, SessionError> {
        let body = RefreshRequest { refresh_token: refresh_token.to_owned() };
        let resp = self
            .http
            .post(&self.refresh_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::RefreshFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SessionError::RefreshFailed(format!("rejected ({status}): {text}")));
        }

        let parsed: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| SessionError::RefreshFailed(format!("malformed response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(SessionError::RefreshFailed("empty access token".to_owned()));
        }
        Ok(parsed)
    }

    /// Clear the session the failed cycle started from and raise the forced
    /// logout. A session replaced mid-flight is left untouched.
    fn fail(&self, started_with: &str, error: SessionError, reason: LogoutReason) -> SessionError {
        warn!(err = %error, reason = reason.as_str(), "refresh failed");
        if self.store.clear_if_current(started_with) {
            self.forced_logout(reason);
        } else {
            debug!("session replaced during failed refresh, keeping it");
        }
        error
    }

    fn forced_logout(&self, reason: LogoutReason) {
        self.cache.clear();
        let redirect_to = expired_redirect(&self.login_redirect, reason);
        info!(reason = reason.as_str(), redirect = %redirect_to, "forced logout");
        self.events.emit(SessionEvent::ForcedLogout { reason, redirect_to });
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
