//! Persisted session state.
//!
//! The host owns credential storage; this module only fixes the shape it
//! must round-trip across restarts, plus a small file-backed convenience
//! store for hosts without their own persistence layer. The JSON layout is
//! stable: `{userCode, credential: {accessToken, refreshToken, t,
//! expireTime, uid}, terminalId, endpoint}`.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use super::credentials::Credential;

/// The session directory name under the home directory.
const SESSION_DIR: &str = ".gimdow";

/// The session file name.
const SESSION_FILE: &str = "session.json";

/// Everything needed to resume an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// The user code the session was paired under; pre-fills re-pairing.
    pub user_code: String,
    /// The bearer credential current at save time.
    pub credential: Credential,
    /// Terminal identifier minted when pairing completed.
    pub terminal_id: String,
    /// Regional endpoint the session talks to.
    pub endpoint: String,
}

/// File-backed session storage.
///
/// Optional: hosts with their own persistence simply serialize
/// [`SessionState`] themselves.
#[derive(Debug)]
pub struct SessionStore {
    session_path: PathBuf,
}

impl SessionStore {
    /// Create a store at the default location (`~/.gimdow/session.json`).
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn new() -> Option<Self> {
        let home = dirs::home_dir()?;
        let session_path = home.join(SESSION_DIR).join(SESSION_FILE);
        Some(Self { session_path })
    }

    /// Create a store at an explicit path.
    pub fn with_path(session_path: PathBuf) -> Self {
        Self { session_path }
    }

    /// Get the path to the session file.
    pub fn session_path(&self) -> &PathBuf {
        &self.session_path
    }

    /// Load the saved session, `None` if absent or unreadable.
    pub fn load(&self) -> Option<SessionState> {
        let file = File::open(&self.session_path).ok()?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).ok()
    }

    /// Save the session, creating the parent directory if needed.
    /// Returns `true` if successful.
    pub fn save(&self, session: &SessionState) -> bool {
        if let Some(parent) = self.session_path.parent() {
            if !parent.exists() && fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        let file = match File::create(&self.session_path) {
            Ok(f) => f,
            Err(_) => return false,
        };

        let mut writer = BufWriter::new(file);
        if serde_json::to_writer_pretty(&mut writer, session).is_err() {
            return false;
        }

        writer.flush().is_ok()
    }

    /// Remove the session file. Returns `true` if gone afterwards.
    pub fn clear(&self) -> bool {
        if !self.session_path.exists() {
            return true;
        }
        fs::remove_file(&self.session_path).is_ok()
    }
}
