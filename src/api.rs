//! Typed client for the vendor cloud platform.
//!
//! Every call goes through the injected [`HttpClient`] and speaks the
//! vendor's uniform response envelope `{success, result, code, msg, t}`.
//! `success=false` is a vendor verdict, not a transport failure, and is
//! surfaced as [`AgentError::RejectedByRemote`] — except for the explicit
//! session-invalid codes, which become [`AgentError::Unauthenticated`] so
//! the host knows to re-pair instead of retrying.
//!
//! Authenticated calls refresh the bearer credential transparently when it
//! has expired; each refresh replaces the credential in the shared
//! [`CredentialStore`] and fires its refresh listeners.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::auth::credentials::{Credential, CredentialStore};
use crate::error::AgentError;
use crate::reconcile::{LogCode, LogEntry};
use crate::traits::{Headers, HttpClient, HttpError, Response};

/// Regional endpoint used before pairing reveals the account's home region.
pub const DEFAULT_ENDPOINT: &str = "https://apigw.iotbing.com";

/// Fixed client identifier this integration pairs under.
pub const CLIENT_ID: &str = "HA_3y9q4ak7g4ephrvke";

/// Fixed authorization schema sent with pairing-token requests.
pub const LOGIN_SCHEMA: &str = "haauthorize";

/// Log stream queried for reconciliation (door action records).
pub const LOG_TYPE_ACTION: u8 = 7;

const PAIRING_TOKEN_PATH: &str = "/v1.0/m/life/ha/token";
const PAIRING_RESULT_PATH: &str = "/v1.0/m/life/ha/token/result";
const TOKEN_REFRESH_PATH: &str = "/v1.0/m/life/ha/token/refresh";
const DEVICES_PATH: &str = "/v1.0/m/life/ha/devices";

/// Fallback access-token lifetime when the grant omits one, in seconds.
const DEFAULT_EXPIRE_TIME: i64 = 7200;

/// Uniform vendor response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrTokenResult {
    qrcode: String,
}

/// Token fields returned by pairing completion and token refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Issue timestamp, epoch milliseconds.
    #[serde(default)]
    pub t: Option<i64>,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expire_time: Option<i64>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub terminal_id: Option<String>,
    /// Regional endpoint the session should talk to from now on.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl TokenGrant {
    /// Build a credential, filling fields the grant omitted from context.
    pub fn into_credential(self, fallback_uid: &str) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            t: self.t.unwrap_or_else(|| Utc::now().timestamp_millis()),
            expire_time: self.expire_time.unwrap_or(DEFAULT_EXPIRE_TIME),
            uid: self.uid.unwrap_or_else(|| fallback_uid.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketResult {
    ticket_id: String,
}

#[derive(Debug, Deserialize)]
struct LogsResult {
    #[serde(default)]
    logs: Vec<WireLogEntry>,
}

#[derive(Debug, Deserialize)]
struct WireLogEntry {
    code: String,
    #[serde(default)]
    event_time: i64,
}

#[derive(Debug, Deserialize)]
struct StatusItem {
    code: String,
    value: serde_json::Value,
}

/// One paired device as reported by the device-cache refresh call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceSummary {
    #[serde(rename = "device_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
}

/// Client for the vendor cloud platform.
pub struct CloudApi {
    endpoint: String,
    http: Arc<dyn HttpClient>,
    store: Arc<CredentialStore>,
}

impl CloudApi {
    /// Create a client against the pre-pairing default endpoint.
    pub fn new(http: Arc<dyn HttpClient>, store: Arc<CredentialStore>) -> Self {
        Self::with_endpoint(http, store, DEFAULT_ENDPOINT)
    }

    /// Create a client against a specific regional endpoint (from a
    /// restored session or a completed pairing).
    pub fn with_endpoint(
        http: Arc<dyn HttpClient>,
        store: Arc<CredentialStore>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
            store,
        }
    }

    /// The regional endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The shared credential store backing authenticated calls.
    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    // ----- session lifecycle -------------------------------------------------

    /// Request a single-use pairing token for the given user code.
    pub async fn request_pairing_token(&self, user_code: &str) -> Result<String, AgentError> {
        let body = json!({
            "client_id": CLIENT_ID,
            "schema": LOGIN_SCHEMA,
            "user_code": user_code,
        });
        let result: QrTokenResult = self
            .post_enveloped(PAIRING_TOKEN_PATH, &body, false)
            .await?;
        tracing::debug!("obtained pairing token for user code {}", user_code);
        Ok(result.qrcode)
    }

    /// Ask whether the pairing token has been scanned and approved.
    ///
    /// Success returns the token grant; an unscanned or expired token comes
    /// back as [`AgentError::RejectedByRemote`].
    pub async fn poll_pairing_result(
        &self,
        qr_token: &str,
        user_code: &str,
    ) -> Result<TokenGrant, AgentError> {
        let body = json!({
            "token": qr_token,
            "client_id": CLIENT_ID,
            "user_code": user_code,
        });
        self.post_enveloped(PAIRING_RESULT_PATH, &body, false).await
    }

    /// Exchange the stored refresh token for a new credential.
    ///
    /// Replaces the credential in the store (notifying refresh listeners)
    /// before returning. A vendor rejection here means the refresh token
    /// itself is dead, so it surfaces as `Unauthenticated`.
    pub async fn refresh_credential(&self) -> Result<Credential, AgentError> {
        let current = self.store.get()?;
        let body = json!({
            "client_id": CLIENT_ID,
            "refresh_token": current.refresh_token,
        });
        let grant: TokenGrant = self
            .post_enveloped(TOKEN_REFRESH_PATH, &body, false)
            .await
            .map_err(|err| match err {
                AgentError::RejectedByRemote { code, message } => {
                    tracing::warn!("token refresh rejected (code {}): {}", code, message);
                    AgentError::Unauthenticated
                }
                other => other,
            })?;

        if grant.access_token.is_empty() || grant.refresh_token.is_empty() {
            tracing::warn!("token refresh returned an empty grant");
            return Err(AgentError::Unauthenticated);
        }

        let refreshed = grant.into_credential(&current.uid);
        self.store.replace(refreshed.clone());
        tracing::info!("access token refreshed, valid for {}s", refreshed.expire_time);
        Ok(refreshed)
    }

    /// Return a usable credential, refreshing first if the current one has
    /// expired. Fails `Unauthenticated` when no session exists.
    pub async fn ensure_fresh_credential(&self) -> Result<Credential, AgentError> {
        let credential = self.store.get()?;
        if !credential.is_expired() {
            return Ok(credential);
        }
        tracing::info!("access token expired, refreshing");
        self.refresh_credential().await
    }

    // ----- device operations -------------------------------------------------

    /// Obtain a one-time ticket authorizing a door operation.
    pub async fn post_ticket(&self, device_id: &str) -> Result<String, AgentError> {
        let path = format!("/v1.0/smart-lock/devices/{}/password-ticket", device_id);
        let result: TicketResult = self.post_enveloped(&path, &json!({}), true).await?;
        tracing::debug!("obtained door ticket for device {}", device_id);
        Ok(result.ticket_id)
    }

    /// Execute a door operation under a previously issued ticket.
    /// `open == true` unlocks, `open == false` locks.
    pub async fn operate_door(
        &self,
        device_id: &str,
        ticket_id: &str,
        open: bool,
    ) -> Result<(), AgentError> {
        let path = format!(
            "/v1.0/smart-lock/devices/{}/password-free/door-operate",
            device_id
        );
        let body = json!({
            "ticket_id": ticket_id,
            "open": open,
        });
        self.post_unit(&path, &body, true).await
    }

    /// Ask the device to push its current state to the cloud, so the log
    /// stream read next is not stale.
    pub async fn sync_device(&self, device_id: &str) -> Result<(), AgentError> {
        let path = format!("/v1.0/iot-03/devices/{}/commands", device_id);
        let body = json!({
            "commands": [{"code": "synch_method", "value": true}],
        });
        self.post_unit(&path, &body, true).await
    }

    /// Fetch device log entries for a time window.
    ///
    /// `codes` narrows the query server-side; unknown codes in the response
    /// still come back mapped to [`LogCode::Other`].
    pub async fn fetch_logs(
        &self,
        device_id: &str,
        start_ms: i64,
        end_ms: i64,
        codes: &[&str],
        log_type: u8,
    ) -> Result<Vec<LogEntry>, AgentError> {
        let path = format!(
            "/v1.0/devices/{}/logs?start_time={}&end_time={}&codes={}&type={}",
            device_id,
            start_ms,
            end_ms,
            codes.join(","),
            log_type,
        );
        let result: LogsResult = self.get_enveloped(&path, true).await?;
        let entries: Vec<LogEntry> = result
            .logs
            .into_iter()
            .map(|log| LogEntry {
                code: LogCode::from_wire(&log.code),
                timestamp_ms: log.event_time,
            })
            .collect();
        tracing::debug!(
            "fetched {} log entries for device {} in [{}, {})",
            entries.len(),
            device_id,
            start_ms,
            end_ms,
        );
        Ok(entries)
    }

    /// Read one status property of a device, `None` if not reported.
    pub async fn fetch_property(
        &self,
        device_id: &str,
        code: &str,
    ) -> Result<Option<String>, AgentError> {
        let path = format!("/v1.0/devices/{}/status", device_id);
        let items: Vec<StatusItem> = self.get_enveloped(&path, true).await?;
        let value = items.into_iter().find(|item| item.code == code).map(|item| {
            match item.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }
        });
        Ok(value)
    }

    /// Refresh the device cache: the current set of paired devices.
    ///
    /// An explicit invalid-signature/session answer surfaces as
    /// `Unauthenticated` (via the envelope handling) so the host re-pairs
    /// rather than retrying blindly.
    pub async fn fetch_devices(&self) -> Result<Vec<DeviceSummary>, AgentError> {
        self.get_enveloped(DEVICES_PATH, true).await
    }

    // ----- plumbing ----------------------------------------------------------

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.endpoint, path_and_query)
    }

    async fn request_headers(&self, authed: bool) -> Result<Headers, AgentError> {
        let mut headers = Headers::new();
        headers.insert("client_id".to_string(), CLIENT_ID.to_string());
        if authed {
            let credential = Box::pin(self.ensure_fresh_credential()).await?;
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", credential.access_token),
            );
        }
        Ok(headers)
    }

    async fn get_enveloped<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        authed: bool,
    ) -> Result<T, AgentError> {
        let headers = self.request_headers(authed).await?;
        let response = self.http.get(&self.url(path_and_query), &headers).await?;
        Self::expect_result(Self::open_envelope(response)?)
    }

    async fn post_enveloped<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        authed: bool,
    ) -> Result<T, AgentError> {
        Self::expect_result(self.post_raw(path, body, authed).await?)
    }

    async fn post_unit(
        &self,
        path: &str,
        body: &serde_json::Value,
        authed: bool,
    ) -> Result<(), AgentError> {
        self.post_raw::<serde_json::Value>(path, body, authed)
            .await
            .map(|_| ())
    }

    async fn post_raw<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
        authed: bool,
    ) -> Result<Option<T>, AgentError> {
        let mut headers = self.request_headers(authed).await?;
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let response = self
            .http
            .post(&self.url(path), &body.to_string(), &headers)
            .await?;
        Self::open_envelope(response)
    }

    /// Decode the envelope and translate a vendor `success=false` into the
    /// error taxonomy. Returns the (possibly absent) `result` payload.
    fn open_envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>, AgentError> {
        if !response.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(HttpError::ServerError {
                status: response.status,
                message,
            }
            .into());
        }

        let envelope: Envelope<T> = response
            .json()
            .map_err(|err| HttpError::Decode(err.to_string()))?;

        if envelope.success {
            return Ok(envelope.result);
        }

        let code = envelope.code.unwrap_or(0);
        let message = envelope.msg.unwrap_or_default();
        if is_session_invalid(code, &message) {
            tracing::warn!("remote invalidated the session (code {}): {}", code, message);
            Err(AgentError::Unauthenticated)
        } else {
            Err(AgentError::RejectedByRemote { code, message })
        }
    }

    fn expect_result<T>(result: Option<T>) -> Result<T, AgentError> {
        result.ok_or_else(|| HttpError::Decode("envelope missing result field".to_string()).into())
    }
}

/// Vendor answers that mean the session itself is dead.
fn is_session_invalid(code: i64, message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    matches!(code, 1010 | 1011) || message.contains("sign invalid") || message.contains("token invalid")
}
