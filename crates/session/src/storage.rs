// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable session persistence.
//!
//! The whole session record is one JSON document so tokens and owner id are
//! always written together. A separate flag file mirrors "a session exists"
//! without carrying the token, for cheap presence checks by other processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Last-known user profile, as returned by the login and identity endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id", alias = "user_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Persisted session record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
}

impl PersistedSession {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.owner_id.is_none()
    }
}

/// Backend for durable session state.
///
/// Implementations must make `save` visible to the next `load` before
/// returning, including loads from other processes sharing the backend.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> anyhow::Result<PersistedSession>;
    fn save(&self, session: &PersistedSession) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
    /// Raise or lower the non-sensitive "has session" flag.
    fn set_session_flag(&self, present: bool) -> anyhow::Result<()>;
    fn session_flag(&self) -> bool;
}

const SESSION_FILE: &str = "session.json";
const FLAG_FILE: &str = "has_session";

/// File-backed storage: `session.json` plus a `has_session` flag file.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn flag_path(&self) -> PathBuf {
        self.dir.join(FLAG_FILE)
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> anyhow::Result<PersistedSession> {
        let path = self.session_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedSession::default())
            }
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(PersistedSession::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, session: &PersistedSession) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(session)?;
        write_atomic(&self.session_path(), json.as_bytes())
    }

    fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn set_session_flag(&self, present: bool) -> anyhow::Result<()> {
        let path = self.flag_path();
        if present {
            std::fs::create_dir_all(&self.dir)?;
            write_atomic(&path, b"1")
        } else {
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }

    fn session_flag(&self) -> bool {
        self.flag_path().exists()
    }
}

/// Write tmp + rename.
///
/// Uses a unique temp filename (PID + counter) so concurrent writers never
/// share a `.tmp` file.
fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// In-memory storage, for tests and for embedders that persist elsewhere.
///
/// Clones share the same underlying map so a test can play "another tab"
/// mutating persisted state behind the store's back.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: std::sync::Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<&'static str, String>,
    profile: Option<UserProfile>,
    flag: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite only the persisted owner id.
    pub fn set_owner_id(&self, owner_id: Option<&str>) {
        let mut inner = self.inner.lock();
        match owner_id {
            Some(id) => {
                inner.values.insert("owner_id", id.to_owned());
            }
            None => {
                inner.values.remove("owner_id");
            }
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> anyhow::Result<PersistedSession> {
        let inner = self.inner.lock();
        Ok(PersistedSession {
            access_token: inner.values.get("access_token").cloned(),
            refresh_token: inner.values.get("refresh_token").cloned(),
            owner_id: inner.values.get("owner_id").cloned(),
            profile: inner.profile.clone(),
        })
    }

    fn save(&self, session: &PersistedSession) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let fields = [
            ("access_token", &session.access_token),
            ("refresh_token", &session.refresh_token),
            ("owner_id", &session.owner_id),
        ];
        for (key, value) in fields {
            match value {
                Some(v) => {
                    inner.values.insert(key, v.clone());
                }
                None => {
                    inner.values.remove(key);
                }
            }
        }
        inner.profile = session.profile.clone();
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.values.clear();
        inner.profile = None;
        Ok(())
    }

    fn set_session_flag(&self, present: bool) -> anyhow::Result<()> {
        self.inner.lock().flag = present;
        Ok(())
    }

    fn session_flag(&self) -> bool {
        self.inner.lock().flag
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
