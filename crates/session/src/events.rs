// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle notifications.
//!
//! Consumers subscribe to react to forced logouts (redirect, "session
//! expired" notice) without polling the store.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Why the session was ended by the system rather than the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The refresh endpoint rejected the refresh token or could not be reached.
    RefreshFailed,
    /// A refresh was needed but there was no refresh token.
    NoRefreshToken,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshFailed => "refresh_failed",
            Self::NoRefreshToken => "no_refresh_token",
        }
    }
}

/// Events emitted by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login succeeded.
    LoggedIn { owner_id: String },
    /// Tokens were replaced by a refresh.
    Refreshed { owner_id: String },
    /// The user logged out.
    LoggedOut,
    /// The session was cleared by the system. `redirect_to` points at the
    /// login entry point, annotated so the UI can show a notice.
    ForcedLogout { reason: LogoutReason, redirect_to: String },
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers; having none is fine.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the annotated redirect target for a forced logout.
pub fn expired_redirect(login_path: &str, reason: LogoutReason) -> String {
    let sep = if login_path.contains('?') { '&' } else { '?' };
    format!("{login_path}{sep}session=expired&reason={}", reason.as_str())
}
