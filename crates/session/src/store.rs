// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative holder of the current session.
//!
//! Every read re-checks the persisted owner id so a session written by a
//! different user (another process sharing the storage, an unclean
//! logout/login) is dropped before its tokens reach a caller. Reads and
//! writes share one lock, held across the storage round trip, so a caller
//! never sees a token paired with the wrong owner.
//!
//! Mutators are crate-private: only the refresh coordinator and the auth
//! context write tokens.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::storage::{PersistedSession, SessionStorage, UserProfile};
use crate::token::epoch_secs;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    access_token: String,
    refresh_token: Option<String>,
    owner_id: Option<String>,
    /// Epoch seconds when this process received the access token.
    received_at: Option<u64>,
}

/// Consistent (token, owner) pair read under one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub owner_id: String,
    /// Epoch seconds when the access token was received; `None` for a
    /// session rehydrated from storage.
    pub received_at: Option<u64>,
}

pub struct TokenStore {
    session: Mutex<Option<Session>>,
    storage: Arc<dyn SessionStorage>,
}

impl TokenStore {
    /// Build a store and rehydrate it from `storage`.
    pub fn open(storage: Arc<dyn SessionStorage>) -> Self {
        let session = match storage.load() {
            Ok(persisted) => persisted.access_token.map(|access_token| Session {
                access_token,
                refresh_token: persisted.refresh_token,
                owner_id: persisted.owner_id,
                received_at: None,
            }),
            Err(e) => {
                warn!(err = %e, "failed to load persisted session");
                None
            }
        };
        if let Some(ref s) = session {
            debug!(owner = ?s.owner_id, "rehydrated session from storage");
        }
        Self { session: Mutex::new(session), storage }
    }

    /// Current access token, if a session exists and still belongs to the
    /// persisted owner.
    pub fn get_access_token(&self) -> Option<String> {
        self.snapshot().map(|s| s.access_token)
    }

    /// Current refresh token, under the same ownership checks.
    pub fn get_refresh_token(&self) -> Option<String> {
        self.snapshot().and_then(|s| s.refresh_token)
    }

    /// Owner of the current session.
    pub fn owner_id(&self) -> Option<String> {
        self.snapshot().map(|s| s.owner_id)
    }

    /// Atomic read of the whole session.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let mut session = self.session.lock();
        self.verify(&mut session).ok()?;
        let current = session.as_ref()?;
        Some(SessionSnapshot {
            access_token: current.access_token.clone(),
            refresh_token: current.refresh_token.clone(),
            owner_id: current.owner_id.clone()?,
            received_at: current.received_at,
        })
    }

    /// True only if a token and owner are present and agree with storage.
    /// An inconsistent session is cleared.
    pub fn validate_session(&self) -> bool {
        let mut session = self.session.lock();
        self.verify(&mut session).is_ok() && session.is_some()
    }

    /// Whether the "has session" flag is raised in storage.
    pub fn has_session_flag(&self) -> bool {
        self.storage.session_flag()
    }

    /// Last-known profile snapshot for the current owner.
    pub fn cached_profile(&self) -> Option<UserProfile> {
        let mut session = self.session.lock();
        self.verify(&mut session).ok()?;
        session.as_ref()?;
        self.storage.load().ok()?.profile
    }

    /// Replace both tokens. With no `owner_id`, adopts the owner currently
    /// recorded in storage.
    pub(crate) fn set_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        owner_id: Option<String>,
    ) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        let persisted = self.storage.load().unwrap_or_default();
        let owner_id = owner_id.or_else(|| persisted.owner_id.clone());
        if owner_id.is_none() {
            warn!("storing tokens without a known owner; they will be discarded on read");
        }
        let profile = if persisted.owner_id == owner_id { persisted.profile } else { None };
        let next =
            Session { access_token, refresh_token, owner_id, received_at: Some(epoch_secs()) };
        self.write(&mut session, next, profile)
    }

    /// Swap in refreshed tokens, but only if the session still holds
    /// `expected_refresh`. Returns `false` when the session was cleared or
    /// replaced while the refresh was in flight.
    pub(crate) fn replace_if_current(
        &self,
        expected_refresh: &str,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<bool, SessionError> {
        let mut session = self.session.lock();
        if self.verify(&mut session).is_err() {
            return Ok(false);
        }
        let Some(current) = session.as_ref() else {
            return Ok(false);
        };
        if current.refresh_token.as_deref() != Some(expected_refresh) {
            return Ok(false);
        }
        let next = Session {
            access_token,
            refresh_token: refresh_token.or_else(|| current.refresh_token.clone()),
            owner_id: current.owner_id.clone(),
            received_at: Some(epoch_secs()),
        };
        let profile = self.storage.load().ok().and_then(|p| p.profile);
        self.write(&mut session, next, profile)?;
        Ok(true)
    }

    /// Record the profile snapshot for the current owner.
    pub(crate) fn store_profile(&self, profile: &UserProfile) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        self.verify(&mut session)?;
        let Some(current) = session.as_ref() else {
            return Ok(());
        };
        if current.owner_id.as_deref() != Some(profile.id.as_str()) {
            debug!(profile = %profile.id, "ignoring profile for a different owner");
            return Ok(());
        }
        let record = persisted_from(current, Some(profile.clone()));
        self.storage.save(&record).map_err(|e| SessionError::Storage(e.to_string()))
    }

    /// Wipe memory, storage, cached profile and the session flag. Returns
    /// whether a session existed.
    pub(crate) fn clear(&self) -> bool {
        let mut session = self.session.lock();
        let existed = session.is_some();
        self.wipe(&mut session);
        if existed {
            info!("session cleared");
        }
        existed
    }

    /// Like [`clear`](Self::clear), but only while the session still holds
    /// `expected_access`. A session replaced in the meantime is left alone.
    pub(crate) fn clear_if_current(&self, expected_access: &str) -> bool {
        let mut session = self.session.lock();
        let current = session.as_ref().is_some_and(|s| s.access_token == expected_access);
        if !current {
            return false;
        }
        self.wipe(&mut session);
        info!("session cleared");
        true
    }

    fn write(
        &self,
        session: &mut Option<Session>,
        next: Session,
        profile: Option<UserProfile>,
    ) -> Result<(), SessionError> {
        let record = persisted_from(&next, profile);
        let written = self
            .storage
            .save(&record)
            .and_then(|()| self.storage.set_session_flag(true));
        match written {
            Ok(()) => {
                *session = Some(next);
                Ok(())
            }
            Err(e) => {
                warn!(err = %e, "failed to persist session, dropping it");
                self.wipe(session);
                Err(SessionError::Storage(e.to_string()))
            }
        }
    }

    /// Enforce owner invariants, clearing on violation.
    fn verify(&self, session: &mut Option<Session>) -> Result<(), SessionError> {
        let Some(current) = session.as_ref() else {
            return Ok(());
        };
        let Some(owner) = current.owner_id.clone() else {
            warn!("access token without owner, discarding session");
            self.wipe(session);
            return Err(SessionError::SessionOwnershipMismatch);
        };
        match self.storage.load() {
            Ok(persisted) if persisted.owner_id.as_deref() == Some(owner.as_str()) => Ok(()),
            Ok(persisted) => {
                warn!(
                    owner = %owner,
                    persisted = ?persisted.owner_id,
                    "session owner changed in storage, discarding session"
                );
                // A record holding another user's own tokens is theirs to keep;
                // our tokens relabelled with another owner are wiped.
                let foreign = persisted.owner_id.is_some()
                    && persisted.access_token.is_some()
                    && persisted.access_token.as_deref() != Some(current.access_token.as_str());
                if foreign {
                    *session = None;
                } else {
                    self.wipe(session);
                }
                Err(SessionError::SessionOwnershipMismatch)
            }
            Err(e) => {
                warn!(err = %e, "unreadable session storage, discarding session");
                self.wipe(session);
                Err(SessionError::SessionOwnershipMismatch)
            }
        }
    }

    fn wipe(&self, session: &mut Option<Session>) {
        *session = None;
        if let Err(e) = self.storage.clear() {
            warn!(err = %e, "failed to clear persisted session");
        }
        if let Err(e) = self.storage.set_session_flag(false) {
            warn!(err = %e, "failed to lower session flag");
        }
    }
}

fn persisted_from(session: &Session, profile: Option<UserProfile>) -> PersistedSession {
    PersistedSession {
        access_token: Some(session.access_token.clone()),
        refresh_token: session.refresh_token.clone(),
        owner_id: session.owner_id.clone(),
        profile,
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
