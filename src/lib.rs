//! Gimdow smart-lock cloud agent.
//!
//! Client-side agent that keeps an eventually-consistent view of a Gimdow
//! lock by polling the vendor cloud's event log, and manages the QR-pairing
//! session plus bearer-token refresh needed to talk to it.
//!
//! The usual wiring:
//!
//! 1. Run [`auth::PairingFlow`] once to establish a session; persist the
//!    returned [`auth::SessionState`].
//! 2. Build a [`api::CloudApi`] on the session's regional endpoint and a
//!    [`auth::CredentialStore`] restored from the saved credential; hook
//!    [`auth::CredentialStore::on_refresh`] to keep the saved copy current.
//! 3. Create one [`agent::LockAgent`] per lock and drive `poll_state` from
//!    the host scheduler; `lock`/`unlock` on demand.
//! 4. Feed push-channel notifications into
//!    [`manager::LockManager::handle_event`].

pub mod adapters;
pub mod agent;
pub mod api;
pub mod auth;
pub mod cursor;
pub mod error;
pub mod events;
pub mod manager;
pub mod reconcile;
pub mod traits;

pub use agent::LockAgent;
pub use api::CloudApi;
pub use auth::{Credential, CredentialStore, PairingFlow, PairingState, ScanPoll, SessionState};
pub use cursor::{LogWindowCursor, ReconciliationWindow};
pub use error::AgentError;
pub use events::{DeviceEvent, DeviceEventKind, DeviceListener};
pub use manager::LockManager;
pub use reconcile::{LockStateSnapshot, LogCode, LogEntry};
