//! Session and pairing lifecycle.
//!
//! [`pairing::PairingFlow`] runs once per session to establish a
//! [`credentials::Credential`]; afterwards the shared
//! [`credentials::CredentialStore`] keeps it alive through the refresh path
//! and [`session::SessionState`] fixes the shape the host persists.

pub mod credentials;
pub mod pairing;
pub mod session;

pub use credentials::{Credential, CredentialStore};
pub use pairing::{PairingFlow, PairingState, ScanPoll};
pub use session::{SessionState, SessionStore};
