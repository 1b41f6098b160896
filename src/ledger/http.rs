/// Ledger gateway client over HTTP
use super::{LedgerClient, LedgerReceipt, LedgerRegistration, SERVICE};
use crate::{
    certificate::hash::ledger_key,
    config::LedgerConfig,
    degraded::Degraded,
    error::{CertError, CertResult},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct AttestResponse {
    valid: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeResponse {
    tx_hash: String,
}

/// Client for a ledger gateway fronting the attestation contract
#[derive(Clone)]
pub struct HttpLedgerClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> CertResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("certverify/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CertError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, Degraded> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Degraded::new(SERVICE, operation, e.to_string()))?;

        Self::decode(operation, response).await
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, Degraded> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Degraded::new(
                SERVICE,
                operation,
                format!("HTTP {}: {}", status, body),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Degraded::new(SERVICE, operation, format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn attest(&self, certificate_id: &str) -> Result<bool, Degraded> {
        let url = format!("{}/certificates/{}", self.base_url, ledger_key(certificate_id));
        debug!("Querying ledger attestation for {}", certificate_id);

        let response: AttestResponse = self.send("attest", self.http_client.get(&url)).await?;
        Ok(response.valid)
    }

    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt, Degraded> {
        let url = format!("{}/certificates", self.base_url);
        debug!("Registering certificate key {} on ledger", registration.certificate_key);

        self.send("register", self.http_client.post(&url).json(registration))
            .await
    }

    async fn revoke(&self, certificate_id: &str, reason: &str) -> Result<String, Degraded> {
        let url = format!(
            "{}/certificates/{}/revoke",
            self.base_url,
            ledger_key(certificate_id)
        );

        let response: RevokeResponse = self
            .send(
                "revoke",
                self.http_client.post(&url).json(&json!({ "reason": reason })),
            )
            .await?;
        Ok(response.tx_hash)
    }
}
