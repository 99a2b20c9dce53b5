//! Bearer credential model and the shared credential store.
//!
//! One [`CredentialStore`] exists per account session and is the single
//! owner of the current [`Credential`]. Consumers call [`CredentialStore::get`]
//! at each call boundary and must not cache the returned value: the refresh
//! path replaces the credential in place at any time.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Bearer credential issued by the vendor cloud.
///
/// Serializes in the vendor's camelCase shape so it can be embedded directly
/// in the persisted session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Bearer token sent on every authenticated request.
    pub access_token: String,
    /// Token exchanged for a new credential once the access token expires.
    pub refresh_token: String,
    /// Issue timestamp, epoch milliseconds (vendor field `t`).
    pub t: i64,
    /// Lifetime of the access token, in seconds.
    pub expire_time: i64,
    /// Cloud account id the credential belongs to.
    pub uid: String,
}

impl Credential {
    /// Epoch-millisecond instant at which the access token stops working.
    pub fn expires_at_ms(&self) -> i64 {
        self.t + self.expire_time * 1000
    }

    /// Check expiry against the current wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Check expiry against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms()
    }
}

/// Callback invoked after every credential replacement.
pub type RefreshListener = Arc<dyn Fn(&Credential) + Send + Sync>;

/// Single owner of the session credential.
///
/// `get` and `replace` are mutually exclusive: a reader never observes a
/// half-updated credential. Listeners registered with [`on_refresh`] fire
/// after the internal lock is released; a listener must still not call
/// [`replace`] synchronously, since that would notify the remaining
/// listeners of a credential that is already stale.
///
/// The store never persists anything. Every `replace` is surfaced to the
/// listeners precisely so the host can write its own durable copy.
///
/// [`on_refresh`]: CredentialStore::on_refresh
/// [`replace`]: CredentialStore::replace
#[derive(Default)]
pub struct CredentialStore {
    current: Mutex<Option<Credential>>,
    listeners: Mutex<Vec<RefreshListener>>,
}

impl CredentialStore {
    /// Create an empty, unauthenticated store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a credential restored by the host.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: Mutex::new(Some(credential)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot the current credential for one call boundary.
    pub fn get(&self) -> Result<Credential, AgentError> {
        self.current
            .lock()
            .expect("credential lock poisoned")
            .clone()
            .ok_or(AgentError::Unauthenticated)
    }

    /// Whether a credential is present at all (it may still be expired).
    pub fn is_authenticated(&self) -> bool {
        self.current
            .lock()
            .expect("credential lock poisoned")
            .is_some()
    }

    /// Replace the credential and notify all refresh listeners.
    ///
    /// The only mutator. Listener invocation happens outside the credential
    /// lock so readers are never blocked on host persistence.
    pub fn replace(&self, credential: Credential) {
        {
            let mut current = self.current.lock().expect("credential lock poisoned");
            *current = Some(credential.clone());
        }

        let listeners: Vec<RefreshListener> = self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clone();
        for listener in &listeners {
            listener(&credential);
        }
    }

    /// Drop the credential; subsequent `get` calls fail `Unauthenticated`.
    pub fn clear(&self) {
        *self.current.lock().expect("credential lock poisoned") = None;
    }

    /// Register a listener fired once per credential replacement.
    pub fn on_refresh(&self, listener: impl Fn(&Credential) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Arc::new(listener));
    }
}
