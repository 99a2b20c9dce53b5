//! QR pairing state machine.
//!
//! Pairing exchanges a user-supplied code for a scannable token, then polls
//! until the vendor app has scanned and approved it:
//!
//! ```text
//! AwaitingUserCode --start()--> AwaitingScan --poll_scan_result()--> Authenticated
//!        ^                          |
//!        |                          v
//!        +------- abandon() ---> Failed
//! ```
//!
//! A failed token request keeps the flow in `AwaitingUserCode` with the
//! entered code retrievable, so the host can pre-fill a retry form. A
//! failed scan poll stays in `AwaitingScan` but grabs a fresh token first:
//! pairing tokens are single-use and short-lived, so the old one is dead
//! the moment a poll comes back negative.
//!
//! Poll cadence is the host's concern; the flow only defines what one poll
//! does.

use std::sync::Arc;

use uuid::Uuid;

use super::credentials::CredentialStore;
use super::session::SessionState;
use crate::api::{CloudApi, DEFAULT_ENDPOINT};
use crate::error::AgentError;
use crate::traits::HttpClient;

/// Prefix turning a pairing token into the payload the vendor app expects
/// behind the QR image. Rendering the image is the host's job.
pub const QR_PAYLOAD_PREFIX: &str = "tuyaSmart--qrLogin?token=";

/// Pairing flow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Waiting for the user to supply an account code.
    AwaitingUserCode,
    /// A pairing token is outstanding, waiting for the app to scan it.
    AwaitingScan,
    /// Pairing completed; the credential is published.
    Authenticated,
    /// The attempt was abandoned.
    Failed,
}

/// Outcome of one scan poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPoll {
    /// Pairing completed; the full session is ready for the host to persist.
    Authenticated(SessionState),
    /// Not approved yet. A fresh pairing token has already been obtained;
    /// re-render the QR payload and poll again later.
    Pending {
        /// Vendor message explaining the negative answer, if any.
        message: Option<String>,
    },
}

/// Drives one pairing attempt against the vendor cloud.
pub struct PairingFlow {
    api: CloudApi,
    store: Arc<CredentialStore>,
    state: PairingState,
    user_code: Option<String>,
    qr_token: Option<String>,
    poll_attempts: u32,
}

impl PairingFlow {
    /// Create a flow talking to the default (pre-pairing) endpoint.
    pub fn new(http: Arc<dyn HttpClient>, store: Arc<CredentialStore>) -> Self {
        Self::with_endpoint(http, store, DEFAULT_ENDPOINT)
    }

    /// Create a flow against a specific endpoint (tests, regional setups).
    pub fn with_endpoint(
        http: Arc<dyn HttpClient>,
        store: Arc<CredentialStore>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            api: CloudApi::with_endpoint(http, Arc::clone(&store), endpoint),
            store,
            state: PairingState::AwaitingUserCode,
            user_code: None,
            qr_token: None,
            poll_attempts: 0,
        }
    }

    /// Current state of the flow.
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// The user code entered so far, kept across failed attempts so the
    /// host can pre-fill it.
    pub fn user_code(&self) -> Option<&str> {
        self.user_code.as_deref()
    }

    /// The outstanding pairing token, if any.
    pub fn qr_token(&self) -> Option<&str> {
        self.qr_token.as_deref()
    }

    /// The string to encode as a QR image for the outstanding token.
    pub fn qr_payload(&self) -> Option<String> {
        self.qr_token
            .as_deref()
            .map(|token| format!("{}{}", QR_PAYLOAD_PREFIX, token))
    }

    /// Number of scan polls issued for the current attempt.
    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    /// Begin pairing with a user code; returns the pairing token.
    ///
    /// On success the flow moves to `AwaitingScan`. On failure it stays in
    /// `AwaitingUserCode` with the code retained, and the error tells the
    /// host what to display: a vendor rejection (bad code) reads differently
    /// from an unreachable cloud.
    pub async fn start(&mut self, user_code: &str) -> Result<String, AgentError> {
        self.user_code = Some(user_code.to_string());

        match self.api.request_pairing_token(user_code).await {
            Ok(token) => {
                tracing::info!("pairing token obtained, awaiting scan");
                self.state = PairingState::AwaitingScan;
                self.qr_token = Some(token.clone());
                self.poll_attempts = 0;
                Ok(token)
            }
            Err(err) => {
                tracing::warn!("pairing token request failed: {}", err);
                self.state = PairingState::AwaitingUserCode;
                self.qr_token = None;
                Err(err)
            }
        }
    }

    /// Re-authentication entry point for a previously known user code.
    ///
    /// Skips collecting a code from the user; if the token request fails
    /// the flow falls back to `AwaitingUserCode` so a (possibly new) code
    /// can be entered.
    pub async fn resume(&mut self, user_code: &str) -> Result<String, AgentError> {
        tracing::info!("resuming pairing with stored user code");
        self.start(user_code).await
    }

    /// Ask whether the outstanding token has been scanned and approved.
    ///
    /// Only meaningful in `AwaitingScan`. On approval the credential is
    /// published into the [`CredentialStore`] and the complete
    /// [`SessionState`] is returned for the host to persist. A negative
    /// answer re-requests a fresh token before returning `Pending`.
    pub async fn poll_scan_result(&mut self) -> Result<ScanPoll, AgentError> {
        if self.state != PairingState::AwaitingScan {
            return Err(AgentError::NoPairingInProgress);
        }
        let qr_token = self
            .qr_token
            .clone()
            .ok_or(AgentError::NoPairingInProgress)?;
        let user_code = self
            .user_code
            .clone()
            .ok_or(AgentError::NoPairingInProgress)?;

        self.poll_attempts += 1;

        match self.api.poll_pairing_result(&qr_token, &user_code).await {
            Ok(grant) => {
                if grant.access_token.is_empty() || grant.refresh_token.is_empty() {
                    // An approved grant with empty tokens is unusable; treat
                    // it like a negative answer rather than publishing it.
                    tracing::warn!("pairing result carried an empty token grant");
                    return self
                        .renew_token(&user_code, Some("empty token grant".to_string()))
                        .await;
                }

                let endpoint = grant
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| self.api.endpoint().to_string());
                let terminal_id = grant
                    .terminal_id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let credential = grant.into_credential("");

                self.store.replace(credential.clone());
                self.state = PairingState::Authenticated;
                self.qr_token = None;
                tracing::info!("pairing approved, session established for uid {}", credential.uid);

                Ok(ScanPoll::Authenticated(SessionState {
                    user_code,
                    credential,
                    terminal_id,
                    endpoint,
                }))
            }
            Err(AgentError::RejectedByRemote { code, message }) => {
                tracing::debug!("scan not approved yet (code {}): {}", code, message);
                self.renew_token(&user_code, Some(message)).await
            }
            Err(err) => {
                // Transport trouble: keep the current token, the host
                // retries the same poll later.
                Err(err)
            }
        }
    }

    /// Abandon the attempt; terminal.
    pub fn abandon(&mut self) {
        tracing::info!("pairing attempt abandoned");
        self.state = PairingState::Failed;
        self.qr_token = None;
    }

    /// Replace the outstanding single-use token after a negative poll.
    async fn renew_token(
        &mut self,
        user_code: &str,
        message: Option<String>,
    ) -> Result<ScanPoll, AgentError> {
        let fresh = self.api.request_pairing_token(user_code).await?;
        self.qr_token = Some(fresh);
        Ok(ScanPoll::Pending { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockHttpClient, MockResponse};
    use crate::traits::Response;
    use bytes::Bytes;
    use serde_json::json;

    const ENDPOINT: &str = "https://cloud.test";
    const TOKEN_URL: &str = "https://cloud.test/v1.0/m/life/ha/token";
    const RESULT_URL: &str = "https://cloud.test/v1.0/m/life/ha/token/result";

    fn flow(http: &MockHttpClient) -> (PairingFlow, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::new());
        let flow = PairingFlow::with_endpoint(Arc::new(http.clone()), Arc::clone(&store), ENDPOINT);
        (flow, store)
    }

    fn json_response(body: serde_json::Value) -> Response {
        Response::new(200, Bytes::from(body.to_string()))
    }

    #[tokio::test]
    async fn test_start_moves_to_awaiting_scan() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": true, "result": {"qrcode": "qr-1"}}),
        );
        let (mut flow, _) = flow(&http);

        let token = flow.start("code-1").await.unwrap();
        assert_eq!(token, "qr-1");
        assert_eq!(flow.state(), PairingState::AwaitingScan);
        assert_eq!(flow.qr_token(), Some("qr-1"));
        assert_eq!(
            flow.qr_payload().unwrap(),
            "tuyaSmart--qrLogin?token=qr-1"
        );
    }

    #[tokio::test]
    async fn test_rejected_start_keeps_user_code() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": false, "code": 1106, "msg": "invalid user code"}),
        );
        let (mut flow, _) = flow(&http);

        let err = flow.start("code-1").await.unwrap_err();
        assert!(matches!(err, AgentError::RejectedByRemote { .. }));
        assert_eq!(flow.state(), PairingState::AwaitingUserCode);
        assert_eq!(flow.user_code(), Some("code-1"));
        assert!(flow.qr_token().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_on_start_keeps_user_code() {
        let http = MockHttpClient::new();
        http.set_response(
            TOKEN_URL,
            MockResponse::Error(crate::traits::HttpError::ConnectionFailed(
                "refused".to_string(),
            )),
        );
        let (mut flow, _) = flow(&http);

        let err = flow.start("code-1").await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
        assert_eq!(flow.state(), PairingState::AwaitingUserCode);
        assert_eq!(flow.user_code(), Some("code-1"));
    }

    #[tokio::test]
    async fn test_poll_before_start_is_an_error() {
        let http = MockHttpClient::new();
        let (mut flow, _) = flow(&http);
        let err = flow.poll_scan_result().await.unwrap_err();
        assert!(matches!(err, AgentError::NoPairingInProgress));
    }

    #[tokio::test]
    async fn test_successful_poll_publishes_credential() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": true, "result": {"qrcode": "qr-1"}}),
        );
        http.set_json_response(
            RESULT_URL,
            200,
            &json!({"success": true, "result": {
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "t": 1_700_000_000_000_i64,
                "expire_time": 7200,
                "uid": "uid-1",
                "terminal_id": "terminal-1",
                "endpoint": "https://eu.cloud.test",
            }}),
        );
        let (mut flow, store) = flow(&http);

        flow.start("code-1").await.unwrap();
        let poll = flow.poll_scan_result().await.unwrap();

        let session = match poll {
            ScanPoll::Authenticated(session) => session,
            other => panic!("expected Authenticated, got {:?}", other),
        };
        assert_eq!(flow.state(), PairingState::Authenticated);
        assert_eq!(session.user_code, "code-1");
        assert_eq!(session.terminal_id, "terminal-1");
        assert_eq!(session.endpoint, "https://eu.cloud.test");
        assert_eq!(session.credential.access_token, "access-1");
        assert_eq!(session.credential.uid, "uid-1");

        // The credential is published to the shared store.
        assert_eq!(store.get().unwrap().access_token, "access-1");
    }

    #[tokio::test]
    async fn test_poll_fills_missing_terminal_and_endpoint() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": true, "result": {"qrcode": "qr-1"}}),
        );
        http.set_json_response(
            RESULT_URL,
            200,
            &json!({"success": true, "result": {
                "access_token": "access-1",
                "refresh_token": "refresh-1",
            }}),
        );
        let (mut flow, _) = flow(&http);

        flow.start("code-1").await.unwrap();
        let poll = flow.poll_scan_result().await.unwrap();

        let session = match poll {
            ScanPoll::Authenticated(session) => session,
            other => panic!("expected Authenticated, got {:?}", other),
        };
        assert!(!session.terminal_id.is_empty());
        assert_eq!(session.endpoint, ENDPOINT);
    }

    #[tokio::test]
    async fn test_negative_poll_renews_token_and_stays_in_awaiting_scan() {
        let http = MockHttpClient::new();
        http.set_response(
            TOKEN_URL,
            MockResponse::Sequence(vec![
                json_response(json!({"success": true, "result": {"qrcode": "qr-1"}})),
                json_response(json!({"success": true, "result": {"qrcode": "qr-2"}})),
            ]),
        );
        http.set_json_response(
            RESULT_URL,
            200,
            &json!({"success": false, "code": 1007, "msg": "not scanned"}),
        );
        let (mut flow, store) = flow(&http);

        flow.start("code-1").await.unwrap();
        let poll = flow.poll_scan_result().await.unwrap();

        assert_eq!(
            poll,
            ScanPoll::Pending {
                message: Some("not scanned".to_string())
            }
        );
        assert_eq!(flow.state(), PairingState::AwaitingScan);
        // The single-use token was replaced.
        assert_eq!(flow.qr_token(), Some("qr-2"));
        assert_eq!(flow.poll_attempts(), 1);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_empty_grant_is_never_published() {
        let http = MockHttpClient::new();
        http.set_response(
            TOKEN_URL,
            MockResponse::Sequence(vec![
                json_response(json!({"success": true, "result": {"qrcode": "qr-1"}})),
                json_response(json!({"success": true, "result": {"qrcode": "qr-2"}})),
            ]),
        );
        http.set_json_response(
            RESULT_URL,
            200,
            &json!({"success": true, "result": {
                "access_token": "",
                "refresh_token": "",
            }}),
        );
        let (mut flow, store) = flow(&http);

        flow.start("code-1").await.unwrap();
        let poll = flow.poll_scan_result().await.unwrap();

        assert!(matches!(poll, ScanPoll::Pending { .. }));
        assert_eq!(flow.state(), PairingState::AwaitingScan);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_transport_failure_during_poll_keeps_token() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": true, "result": {"qrcode": "qr-1"}}),
        );
        http.set_response(
            RESULT_URL,
            MockResponse::Error(crate::traits::HttpError::Timeout("30s".to_string())),
        );
        let (mut flow, _) = flow(&http);

        flow.start("code-1").await.unwrap();
        let err = flow.poll_scan_result().await.unwrap_err();

        assert!(matches!(err, AgentError::Transport(_)));
        assert_eq!(flow.state(), PairingState::AwaitingScan);
        assert_eq!(flow.qr_token(), Some("qr-1"));
    }

    #[tokio::test]
    async fn test_abandon_is_terminal() {
        let http = MockHttpClient::new();
        http.set_json_response(
            TOKEN_URL,
            200,
            &json!({"success": true, "result": {"qrcode": "qr-1"}}),
        );
        let (mut flow, _) = flow(&http);

        flow.start("code-1").await.unwrap();
        flow.abandon();
        assert_eq!(flow.state(), PairingState::Failed);
        assert!(flow.qr_token().is_none());

        let err = flow.poll_scan_result().await.unwrap_err();
        assert!(matches!(err, AgentError::NoPairingInProgress));
    }
}
