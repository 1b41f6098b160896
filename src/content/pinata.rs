/// Pinata pinning client
use super::{ContentStore, PinnedContent, SERVICE};
use crate::{
    config::ContentStoreConfig,
    degraded::Degraded,
    error::{CertError, CertResult},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Clone)]
pub struct PinataContentStore {
    http_client: Client,
    config: ContentStoreConfig,
}

impl PinataContentStore {
    pub fn new(config: ContentStoreConfig) -> CertResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CertError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{}", self.config.gateway_url.trim_end_matches('/'), cid)
    }
}

#[async_trait]
impl ContentStore for PinataContentStore {
    async fn pin(&self, name: &str, document: &Value) -> Result<PinnedContent, Degraded> {
        let url = format!(
            "{}/pinning/pinJSONToIPFS",
            self.config.api_url.trim_end_matches('/')
        );
        let body = json!({
            "pinataContent": document,
            "pinataMetadata": { "name": name },
        });

        let response = self
            .http_client
            .post(&url)
            .header("pinata_api_key", &self.config.api_key)
            .header("pinata_secret_api_key", &self.config.secret_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Degraded::new(SERVICE, "pin", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Degraded::new(SERVICE, "pin", format!("HTTP {}: {}", status, text)));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| Degraded::new(SERVICE, "pin", format!("invalid response: {}", e)))?;

        tracing::info!("Pinned {} as {}", name, pinned.ipfs_hash);
        Ok(PinnedContent {
            url: self.gateway_url(&pinned.ipfs_hash),
            cid: pinned.ipfs_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> ContentStoreConfig {
        ContentStoreConfig {
            api_url: api_url.to_string(),
            api_key: "key".to_string(),
            secret_api_key: "secret".to_string(),
            gateway_url: "https://gateway.pinata.cloud/".to_string(),
        }
    }

    #[test]
    fn test_gateway_url() {
        let store = PinataContentStore::new(config("https://api.pinata.cloud")).unwrap();
        assert_eq!(
            store.gateway_url("bafy123"),
            "https://gateway.pinata.cloud/ipfs/bafy123"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades() {
        let store = PinataContentStore::new(config("http://127.0.0.1:9")).unwrap();
        let err = store.pin("CERT-0001", &json!({"a": 1})).await.unwrap_err();
        assert_eq!(err.service, SERVICE);
        assert_eq!(err.operation, "pin");
    }
}
