//! Shared helpers for integration tests.

use std::sync::Arc;

use chrono::Utc;

use gimdow_agent::adapters::ReqwestHttpClient;
use gimdow_agent::api::CloudApi;
use gimdow_agent::auth::{Credential, CredentialStore};

/// A credential that is valid for the next two hours.
pub fn valid_credential() -> Credential {
    Credential {
        access_token: "access-valid".to_string(),
        refresh_token: "refresh-valid".to_string(),
        t: Utc::now().timestamp_millis(),
        expire_time: 7200,
        uid: "uid-1".to_string(),
    }
}

/// A credential whose access token expired long ago.
pub fn expired_credential() -> Credential {
    Credential {
        access_token: "access-expired".to_string(),
        refresh_token: "refresh-valid".to_string(),
        t: 0,
        expire_time: 1,
        uid: "uid-1".to_string(),
    }
}

/// CloudApi over the real reqwest adapter, pointed at a wiremock server.
pub fn cloud_api(endpoint: &str, credential: Credential) -> (Arc<CloudApi>, Arc<CredentialStore>) {
    let store = Arc::new(CredentialStore::with_credential(credential));
    let api = Arc::new(CloudApi::with_endpoint(
        Arc::new(ReqwestHttpClient::new()),
        Arc::clone(&store),
        endpoint,
    ));
    (api, store)
}
