//! Error taxonomy for the lock agent.
//!
//! Three failure classes cross the crate boundary:
//!
//! - [`AgentError::Transport`] — the request never produced a usable vendor
//!   response (connection, timeout, non-2xx status, undecodable body).
//!   Retrying the whole cycle is safe; backoff is the caller's business.
//! - [`AgentError::RejectedByRemote`] — the vendor answered with
//!   `success=false` and an error code. Recoverable, but usually requires a
//!   step back in whichever flow produced it (e.g. a fresh pairing token).
//! - [`AgentError::Unauthenticated`] — no credential, or the vendor
//!   explicitly invalidated the session. Recoverable only by re-pairing.
//!
//! An inconclusive reconciliation cycle is deliberately *not* an error: the
//! previous snapshot is kept and the condition is logged at debug level.

use thiserror::Error;

use crate::traits::HttpError;

/// Unified error type returned by the agent's public operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Network or decoding failure before a vendor verdict was reached.
    #[error("transport failure: {0}")]
    Transport(#[from] HttpError),

    /// The vendor explicitly returned `success=false`.
    #[error("rejected by remote (code {code}): {message}")]
    RejectedByRemote {
        /// Vendor error code, `0` when the response carried none.
        code: i64,
        message: String,
    },

    /// No authenticated session, or the remote invalidated the session.
    #[error("no authenticated session")]
    Unauthenticated,

    /// A pairing poll was issued without an outstanding pairing token.
    #[error("no pairing attempt in progress")]
    NoPairingInProgress,
}

impl AgentError {
    /// Whether the caller can recover without user interaction.
    ///
    /// Transport failures retry cleanly; remote rejections recover after the
    /// owning flow steps back. A dead session needs the user to re-pair.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AgentError::Unauthenticated)
    }

    /// Whether the host should re-run the pairing flow instead of retrying.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, AgentError::Unauthenticated)
    }
}
