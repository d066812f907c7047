// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client wrapper that carries the session.
//!
//! Every request made through [`SessionClient::execute`] gets the current
//! bearer token. A 401 triggers one refresh through the shared coordinator
//! and one replay; anything else is handed back untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::refresh::{RefreshCoordinator, StaleToken};
use crate::store::{SessionSnapshot, TokenStore};
use crate::token;

struct Inner {
    http: reqwest::Client,
    store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    cache: Arc<ResponseCache>,
    base_url: String,
    request_timeout: Duration,
    expiry_skew: Duration,
    proactive_refresh: bool,
}

/// Session-aware HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(
        config: &SessionConfig,
        http: reqwest::Client,
        store: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                store,
                coordinator,
                cache,
                base_url: config.base().to_owned(),
                request_timeout: config.request_timeout(),
                expiry_skew: config.expiry_skew(),
                proactive_refresh: config.proactive_refresh,
            }),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.inner.cache
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Builder for `path` with the request timeout applied. Send it with
    /// [`execute`](Self::execute).
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.inner.http.request(method, self.url(path)).timeout(self.inner.request_timeout)
    }

    /// Send without touching the session: no bearer, no refresh, no replay.
    /// Used for the auth endpoints themselves.
    pub async fn execute_unintercepted(
        &self,
        builder: RequestBuilder,
    ) -> Result<Response, SessionError> {
        Ok(builder.send().await?)
    }

    /// Send with the session attached, refreshing and replaying once on 401.
    ///
    /// A caller-supplied `Authorization` header is sent as is; if it is
    /// rejected, the replay carries the session's token instead. The replay
    /// only ever goes out for the owner the request was first sent for.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, SessionError> {
        let mut request = builder.build()?;

        let session = self.session_for_send().await?;
        let caller_token = caller_bearer(&request);
        if caller_token.is_none() {
            if let Some(ref session) = session {
                set_bearer(&mut request, &session.access_token)?;
            }
        }
        let replay = request.try_clone();

        let response = self.inner.http.execute(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(session) = session else {
            if caller_token.is_some() {
                return Ok(response);
            }
            debug!("401 without a session, nothing to refresh");
            return Err(SessionError::NoRefreshToken);
        };
        let Some(mut replay) = replay else {
            debug!("401 on a request with a streaming body, not replaying");
            return Ok(response);
        };

        debug!(url = %replay.url(), "401, refreshing session");
        let sent_with = caller_token.as_deref().unwrap_or(&session.access_token);
        let stale = StaleToken::new(sent_with, &session.owner_id);
        let fresh = self.inner.coordinator.refresh_after(Some(stale)).await?;
        set_bearer(&mut replay, &fresh)?;

        let retried = self.inner.http.execute(replay).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %retried.url(), "401 after refresh, giving up");
            return Err(SessionError::Unauthenticated);
        }
        Ok(retried)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.execute(self.request(Method::GET, path)).await?;
        decode_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.execute(self.request(Method::POST, path).json(body)).await?;
        decode_json(response).await
    }

    /// [`get_json`](Self::get_json) through the owner-scoped response cache.
    pub async fn get_json_cached<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let owner = self.inner.store.owner_id();
        if let Some(ref owner) = owner {
            if let Some(hit) = self.inner.cache.get(owner, path) {
                debug!(path, "response cache hit");
                return serde_json::from_value(hit).map_err(|e| SessionError::Decode(e.to_string()));
            }
        }

        let value: serde_json::Value = self.get_json(path).await?;
        // Only cache when the session did not change owner mid-request.
        match (owner, self.inner.store.owner_id()) {
            (Some(before), Some(after)) if before == after => {
                self.inner.cache.insert(&after, path, value.clone());
            }
            _ => {}
        }
        serde_json::from_value(value).map_err(|e| SessionError::Decode(e.to_string()))
    }

    /// Current session, with its access token renewed first when it is a
    /// JWT about to expire.
    async fn session_for_send(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let Some(session) = self.inner.store.snapshot() else {
            return Ok(None);
        };
        let early = self.inner.proactive_refresh
            && token::wants_early_refresh(
                &session.access_token,
                self.inner.expiry_skew,
                session.received_at,
            );
        if !early {
            return Ok(Some(session));
        }
        debug!("access token inside expiry window, refreshing before send");
        let stale = StaleToken::new(&session.access_token, &session.owner_id);
        let fresh = self.inner.coordinator.refresh_after(Some(stale)).await?;
        Ok(Some(SessionSnapshot { access_token: fresh, ..session }))
    }
}

/// Bearer token the caller set on the request, if any.
fn caller_bearer(request: &reqwest::Request) -> Option<String> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value).to_owned())
}

fn set_bearer(request: &mut reqwest::Request, token: &str) -> Result<(), SessionError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| SessionError::Transport("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

/// Map a non-2xx response to an error, otherwise decode the JSON body.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, SessionError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(SessionError::from_status(status, text));
    }
    response.json::<T>().await.map_err(|e| SessionError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
