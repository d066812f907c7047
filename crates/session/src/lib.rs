// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sessionward: client-side session lifecycle for token-authenticated APIs.
//!
//! Holds the access/refresh token pair with its owner, attaches it to
//! outgoing requests, refreshes it once for any number of concurrent 401s,
//! replays the rejected requests, and forces a logout when refresh fails.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod refresh;
pub mod storage;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Once;

pub use crate::auth::{AuthContext, Startup};
pub use crate::client::SessionClient;
pub use crate::config::SessionConfig;
pub use crate::error::SessionError;
pub use crate::events::{LogoutReason, SessionEvent, SessionEvents};
pub use crate::storage::{FileStorage, MemoryStorage, PersistedSession, SessionStorage, UserProfile};
pub use crate::store::TokenStore;

/// Install the ring crypto provider for rustls. Safe to call repeatedly.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
