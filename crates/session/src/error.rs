// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced by the session layer.
///
/// `Clone` because a single refresh outcome fans out to every request waiting
/// on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Login rejected by the remote service. The only variant meant to be
    /// shown inline next to a form.
    InvalidCredentials(String),
    /// A refresh was needed but no refresh token is held.
    NoRefreshToken,
    /// The refresh endpoint rejected the request, or the call itself failed.
    RefreshFailed(String),
    /// Persisted and in-memory owner ids diverged; the session was dropped.
    SessionOwnershipMismatch,
    /// 401 after a successful refresh and replay.
    Unauthenticated,
    /// Non-2xx response from a typed helper.
    Http { status: u16, message: String },
    /// Network-level failure outside of the refresh path.
    Transport(String),
    /// Response body could not be decoded.
    Decode(String),
    /// Durable session storage could not be read or written.
    Storage(String),
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::NoRefreshToken => "NO_REFRESH_TOKEN",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::SessionOwnershipMismatch => "SESSION_OWNERSHIP_MISMATCH",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Http { .. } => "HTTP",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// Whether this error ends the session (forced logout) rather than being
    /// handled next to the caller.
    pub fn is_session_ending(&self) -> bool {
        matches!(
            self,
            Self::NoRefreshToken | Self::RefreshFailed(_) | Self::SessionOwnershipMismatch
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthenticated => Some(401),
            _ => None,
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => Self::Unauthenticated,
            code => Self::Http { status: code, message },
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials(msg) => write!(f, "invalid credentials: {msg}"),
            Self::NoRefreshToken => f.write_str("no refresh token available"),
            Self::RefreshFailed(msg) => write!(f, "session refresh failed: {msg}"),
            Self::SessionOwnershipMismatch => f.write_str("session owner changed"),
            Self::Unauthenticated => f.write_str("request rejected as unauthenticated"),
            Self::Http { status, message } => write!(f, "server returned {status}: {message}"),
            Self::Transport(msg) => write!(f, "request failed: {msg}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
            Self::Storage(msg) => write!(f, "session storage: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
