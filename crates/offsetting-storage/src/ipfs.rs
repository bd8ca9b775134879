//! IPFS HTTP API client (`/api/v0/add`).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use offsetting_protocol::ContentRef;

use crate::gateway::{gateway_url, GatewayAuth};
use crate::store::ContentStore;
use crate::StorageError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Uploads documents through an IPFS HTTP API gateway.
#[derive(Debug, Clone)]
pub struct IpfsGateway {
    base_url: String,
    auth: GatewayAuth,
    http: reqwest::Client,
}

impl IpfsGateway {
    /// `endpoint` is a URL or a multiaddr such as `/ip4/127.0.0.1/tcp/5001/http`.
    pub fn new(endpoint: &str, auth: GatewayAuth) -> Result<Self, StorageError> {
        let base_url = gateway_url(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Connect(format!("http client: {e}")))?;
        Ok(Self { base_url, auth, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ContentStore for IpfsGateway {
    async fn put(&self, document: &Value) -> Result<ContentRef, StorageError> {
        let body = serde_json::to_vec(document).map_err(|e| StorageError::Document(e.to_string()))?;
        let part = Part::bytes(body)
            .file_name("technics.json")
            .mime_str("application/json")
            .map_err(|e| StorageError::Document(e.to_string()))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/api/v0/add", self.base_url);
        let mut request = self.http.post(&url).multipart(form);
        if let Some((login, password)) = self.auth.credentials()? {
            request = request.basic_auth(login, Some(password));
        }

        tracing::debug!(url = %url, "Uploading document to IPFS");
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Connect(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StorageError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Gateway {
                status: status.as_u16(),
                body,
            });
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        Cid::from_str(&added.hash)
            .map_err(|e| StorageError::InvalidResponse(format!("'{}' is not a CID: {e}", added.hash)))?;

        tracing::info!(cid = %added.hash, "Document pinned to IPFS");
        Ok(ContentRef::new(added.hash))
    }
}
