// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless helpers over access tokens.
//!
//! Tokens are treated as opaque unless they look like a JWT, in which case
//! the payload segment is decoded (signature is not verified, the server does
//! that) to read the `exp` claim.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Early-expiry margin: tokens are considered expired this long before their
/// `exp` claim so refresh happens before the server starts rejecting them.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(300);

/// Claims carried in a token payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry as epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issued-at as epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON object payload.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _sig) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() || payload.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload).or_else(|_| URL_SAFE.decode(payload)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry of the token as epoch seconds, if it carries one.
pub fn expires_at(token: &str) -> Option<u64> {
    decode(token)?.exp
}

/// Whether the token is expired, or will be within `skew`.
///
/// Undecodable tokens and tokens without `exp` count as expired.
pub fn is_expired(token: &str, skew: Duration) -> bool {
    is_expired_at(token, skew, epoch_secs())
}

pub(crate) fn is_expired_at(token: &str, skew: Duration, now: u64) -> bool {
    match expires_at(token) {
        Some(exp) => now.saturating_add(skew.as_secs()) >= exp,
        None => true,
    }
}

/// Time left before the token's `exp`, zero when expired or undecodable.
pub fn time_until_expiry(token: &str) -> Duration {
    match expires_at(token) {
        Some(exp) => Duration::from_secs(exp.saturating_sub(epoch_secs())),
        None => Duration::ZERO,
    }
}

/// Whether a token should be renewed before it is sent.
///
/// True for a JWT with `exp` that has entered the `skew` window, unless its
/// whole lifetime (from `iat`, or from `received_at` when the claim is
/// absent) fits inside the window: renewing such a token would only yield
/// another one that is already due.
pub fn wants_early_refresh(token: &str, skew: Duration, received_at: Option<u64>) -> bool {
    wants_early_refresh_at(token, skew, received_at, epoch_secs())
}

pub(crate) fn wants_early_refresh_at(
    token: &str,
    skew: Duration,
    received_at: Option<u64>,
    now: u64,
) -> bool {
    let Some(claims) = decode(token) else {
        return false;
    };
    let Some(exp) = claims.exp else {
        return false;
    };
    let skew = skew.as_secs();
    if now.saturating_add(skew) < exp {
        return false;
    }
    match claims.iat.or(received_at) {
        Some(issued) => exp.saturating_sub(issued) > skew,
        None => true,
    }
}

/// Whether the token is a decodable JWT carrying an `exp` claim.
pub fn has_expiry(token: &str) -> bool {
    expires_at(token).is_some()
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
