//! HTTP client for the public key directory.
//!
//! Endpoints:
//! - `GET  {base}/userPublicKey/{identity}` -> `{"publicKey": "<base64 SPKI DER>"}`,
//!   404 when the identity never published a key.
//! - `POST {base}/updatePublicKey` with `{"username", "publicKey"}`.

use crate::config::VanishConfig;
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vanish_types::Identity;
use vanish_vault::{Directory, DirectoryError, DirectoryResult};

/// [`Directory`] backed by the HTTP key directory service.
pub struct HttpDirectory {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePublicKeyRequest<'a> {
    username: &'a str,
    public_key: String,
}

impl HttpDirectory {
    pub fn new(config: &VanishConfig) -> RelayResult<Self> {
        let base_url = Url::parse(&config.directory_base_url)
            .map_err(|e| RelayError::Config(format!("invalid directory_base_url: {e}")))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Rejected("directory URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn status_error(status: StatusCode, context: &str) -> DirectoryError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DirectoryError::Unavailable(format!("{context}: HTTP {status}"))
    } else {
        DirectoryError::Rejected(format!("{context}: HTTP {status}"))
    }
}

fn transport_error(e: reqwest::Error) -> DirectoryError {
    if e.is_decode() {
        DirectoryError::Rejected(format!("malformed directory response: {e}"))
    } else {
        DirectoryError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn get_public_key(&self, identity: &Identity) -> DirectoryResult<Vec<u8>> {
        let url = self.endpoint(&["userPublicKey", identity.as_str()])?;
        let resp = self.client.get(url).send().await.map_err(transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(identity.clone()));
        }
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), "public key lookup"));
        }

        let body: PublicKeyResponse = resp.json().await.map_err(transport_error)?;
        let encoded = body
            .public_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DirectoryError::NotFound(identity.clone()))?;
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DirectoryError::Rejected(format!("invalid public key encoding: {e}")))?;

        debug!(%identity, len = der.len(), "fetched public key");
        Ok(der)
    }

    async fn set_public_key(&self, identity: &Identity, spki_der: &[u8]) -> DirectoryResult<()> {
        let url = self.endpoint(&["updatePublicKey"])?;
        let body = UpdatePublicKeyRequest {
            username: identity.as_str(),
            public_key: STANDARD.encode(spki_der),
        };
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status(), "public key update"));
        }
        debug!(%identity, "published public key");
        Ok(())
    }
}
