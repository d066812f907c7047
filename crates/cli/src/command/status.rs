// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sessionward status`: offline view of the persisted session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use sessionward::token;
use sessionward::{FileStorage, SessionConfig, TokenStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state_dir: PathBuf,
    /// "has session" flag as persisted.
    pub flag: bool,
    /// Token and owner present and consistent.
    pub active: bool,
    pub owner: Option<String>,
    /// Seconds until `exp`; `None` for opaque tokens.
    pub expires_in_secs: Option<u64>,
}

impl StatusReport {
    pub fn collect(config: &SessionConfig) -> Self {
        let state_dir = config.state_dir();
        let store = TokenStore::open(Arc::new(FileStorage::new(&state_dir)));
        let flag = store.has_session_flag();
        let snapshot = store.snapshot();
        let expires_in_secs = snapshot
            .as_ref()
            .filter(|s| token::has_expiry(&s.access_token))
            .map(|s| token::time_until_expiry(&s.access_token).as_secs());
        Self {
            state_dir,
            flag,
            active: snapshot.is_some(),
            owner: snapshot.map(|s| s.owner_id),
            expires_in_secs,
        }
    }
}

pub fn run(config: &SessionConfig, out: &mut (dyn Write + Send)) -> anyhow::Result<()> {
    let report = StatusReport::collect(config);
    writeln!(out, "state dir: {}", report.state_dir.display())?;
    writeln!(out, "session: {}", if report.active { "active" } else { "none" })?;
    writeln!(out, "flag: {}", if report.flag { "set" } else { "unset" })?;
    if let Some(ref owner) = report.owner {
        writeln!(out, "owner: {owner}")?;
    }
    if report.active {
        match report.expires_in_secs {
            Some(0) => writeln!(out, "expires: expired")?,
            Some(secs) => writeln!(out, "expires: in {secs}s")?,
            None => writeln!(out, "expires: unknown (opaque token)")?,
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
