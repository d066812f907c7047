// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-facing session surface.
//!
//! [`AuthContext`] owns the store, the refresh coordinator and the client,
//! restores a persisted session at startup and exposes login, logout and
//! the current user.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Method;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{LoginRequest, LoginResponse, LogoutRequest};
use crate::cache::ResponseCache;
use crate::client::SessionClient;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{SessionEvent, SessionEvents};
use crate::refresh::RefreshCoordinator;
use crate::storage::{FileStorage, SessionStorage, UserProfile};
use crate::store::TokenStore;

/// How startup rehydration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Nothing was persisted.
    NoSession,
    /// The persisted session was confirmed by the identity endpoint.
    Restored,
    /// The identity check failed for a non-auth reason; running on the
    /// cached profile until revalidation.
    CachedProfile,
    /// The persisted session could not be renewed and was force-logged-out.
    Expired,
    /// The persisted session was rejected and cleared.
    Rejected,
}

pub struct AuthContext {
    config: SessionConfig,
    store: Arc<TokenStore>,
    events: SessionEvents,
    cache: Arc<ResponseCache>,
    client: SessionClient,
    user: Arc<RwLock<Option<UserProfile>>>,
    shutdown: CancellationToken,
    startup: Startup,
}

impl AuthContext {
    /// Open the session persisted under the configured state directory.
    pub async fn init(config: SessionConfig) -> Self {
        let storage = Arc::new(FileStorage::new(config.state_dir()));
        Self::with_storage(config, storage).await
    }

    /// Build over `storage` and confirm any restored session with the
    /// identity endpoint.
    pub async fn with_storage(config: SessionConfig, storage: Arc<dyn SessionStorage>) -> Self {
        crate::install_crypto_provider();
        let http = reqwest::Client::builder().build().unwrap_or_default();
        let store = Arc::new(TokenStore::open(storage));
        let events = SessionEvents::new();
        let cache = Arc::new(ResponseCache::new(config.cache_ttl()));
        let coordinator = RefreshCoordinator::new(
            &config,
            http.clone(),
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&cache),
        );
        let client =
            SessionClient::new(&config, http, Arc::clone(&store), coordinator, Arc::clone(&cache));

        let mut ctx = Self {
            config,
            store,
            events,
            cache,
            client,
            user: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
            startup: Startup::NoSession,
        };
        ctx.startup = ctx.restore().await;
        ctx
    }

    async fn restore(&self) -> Startup {
        if !self.store.validate_session() {
            debug!("no stored session");
            return Startup::NoSession;
        }
        match fetch_identity(&self.client, &self.config.identity_path).await {
            Ok(profile) => {
                info!(owner = %profile.id, "session restored");
                self.remember(profile);
                Startup::Restored
            }
            Err(e) if e.is_session_ending() => {
                // The coordinator already cleared the session.
                warn!(err = %e, "stored session could not be renewed");
                Startup::Expired
            }
            Err(SessionError::Unauthenticated) => {
                warn!("stored session rejected, clearing");
                self.store.clear();
                Startup::Rejected
            }
            Err(e) => match self.store.cached_profile() {
                Some(profile) => {
                    warn!(err = %e, owner = %profile.id, "identity check failed, using cached profile");
                    *self.user.write() = Some(profile);
                    self.spawn_revalidation();
                    Startup::CachedProfile
                }
                None => {
                    warn!(err = %e, "identity check failed and no cached profile, clearing");
                    self.store.clear();
                    Startup::Rejected
                }
            },
        }
    }

    /// Outcome of startup rehydration.
    pub fn startup(&self) -> Startup {
        self.startup
    }

    /// Retry the identity check once after `revalidate_delay`.
    fn spawn_revalidation(&self) {
        let client = self.client.clone();
        let user = Arc::clone(&self.user);
        let path = self.config.identity_path.clone();
        let delay = self.config.revalidate_delay();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            match fetch_identity(&client, &path).await {
                Ok(profile) => {
                    debug!(owner = %profile.id, "session revalidated");
                    if let Err(e) = client.store().store_profile(&profile) {
                        warn!(err = %e, "failed to cache profile");
                    }
                    *user.write() = Some(profile);
                }
                Err(SessionError::Unauthenticated) => {
                    warn!("session rejected on revalidation, clearing");
                    client.store().clear();
                    *user.write() = None;
                }
                Err(e) if e.is_session_ending() => {
                    *user.write() = None;
                }
                Err(e) => debug!(err = %e, "revalidation failed, keeping cached profile"),
            }
        });
    }

    /// Log in with email and password, replacing any existing session.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        if self.store.clear() {
            debug!("cleared previous session before login");
        }
        self.cache.clear();
        *self.user.write() = None;

        let body = LoginRequest { email: email.to_owned(), password: password.to_owned() };
        let request = self.client.request(Method::POST, &self.config.login_path).json(&body);
        let response = self.client.execute_unintercepted(request).await?;

        let status = response.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            let text = response.text().await.unwrap_or_default();
            info!(status = status.as_u16(), "login rejected");
            return Err(SessionError::InvalidCredentials(rejection_message(&text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SessionError::from_status(status, text));
        }

        let parsed: LoginResponse =
            response.json().await.map_err(|e| SessionError::Decode(e.to_string()))?;
        let owner = parsed
            .owner()
            .ok_or_else(|| SessionError::Decode("login response carries no user id".to_owned()))?
            .to_owned();
        self.store.set_tokens(parsed.access_token, parsed.refresh_token, Some(owner.clone()))?;

        let profile = match parsed.profile {
            Some(profile) if profile.id == owner => profile,
            _ => match fetch_identity(&self.client, &self.config.identity_path).await {
                Ok(profile) => profile,
                Err(e) => {
                    debug!(err = %e, "identity lookup after login failed");
                    UserProfile { id: owner.clone(), ..UserProfile::default() }
                }
            },
        };
        self.remember(profile.clone());

        info!(owner = %owner, "logged in");
        self.events.emit(SessionEvent::LoggedIn { owner_id: owner });
        Ok(profile)
    }

    /// End the session. The remote call is best effort; the local session is
    /// cleared regardless of its outcome.
    pub async fn logout(&self) {
        if let Some(snapshot) = self.store.snapshot() {
            let body = LogoutRequest { refresh_token: snapshot.refresh_token };
            let request = self
                .client
                .request(Method::POST, &self.config.logout_path)
                .bearer_auth(&snapshot.access_token)
                .json(&body);
            match self.client.execute_unintercepted(request).await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = response.status().as_u16(), "remote logout rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(err = %e, "remote logout failed"),
            }
        }

        self.store.clear();
        self.cache.clear();
        *self.user.write() = None;
        info!("logged out");
        self.events.emit(SessionEvent::LoggedOut);
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.validate_session()
    }

    /// Profile of the logged-in user, if it still matches the session owner.
    pub fn current_user(&self) -> Option<UserProfile> {
        let owner = self.store.owner_id()?;
        let user = self.user.read().clone()?;
        (user.id == owner).then_some(user)
    }

    /// Re-fetch the identity and update the cached profile.
    pub async fn refresh_current_user(&self) -> Result<UserProfile, SessionError> {
        let profile = fetch_identity(&self.client, &self.config.identity_path).await?;
        self.remember(profile.clone());
        Ok(profile)
    }

    /// Session events, including forced logouts.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stop background work.
    pub fn dispose(&self) {
        self.shutdown.cancel();
    }

    fn remember(&self, profile: UserProfile) {
        if let Err(e) = self.store.store_profile(&profile) {
            warn!(err = %e, "failed to cache profile");
        }
        *self.user.write() = Some(profile);
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn fetch_identity(client: &SessionClient, path: &str) -> Result<UserProfile, SessionError> {
    client.get_json(path).await
}

/// Pull a human-readable message out of a rejection body.
fn rejection_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("message").or_else(|| v.get("error")).and_then(|m| m.as_str()).map(str::to_owned)
    });
    match message {
        Some(m) if !m.is_empty() => m,
        _ if !body.trim().is_empty() && parsed.is_none() => body.trim().to_owned(),
        _ => "invalid email or password".to_owned(),
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
