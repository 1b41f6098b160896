/// External ledger collaborator
///
/// The ledger is an append-only attestation store keyed by certificate. It is
/// reached through the `LedgerClient` trait so workflows can be exercised
/// against fakes; failures come back as `Degraded`, never as `CertError`.

mod http;

pub use http::HttpLedgerClient;

use crate::{certificate::hash::ledger_key, degraded::Degraded};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "ledger";

/// Transaction metadata returned by a successful registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub tx_hash: String,
    pub block_number: Option<i64>,
    pub gas_used: Option<String>,
}

/// Registration call arguments
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRegistration {
    pub certificate_key: String,
    pub holder_name: String,
    pub course: String,
    /// Seconds since the epoch, 0 when the certificate never expires
    pub valid_until: i64,
    /// Empty when nothing was pinned
    pub content_hash: String,
}

impl LedgerRegistration {
    pub fn new(
        certificate_id: &str,
        holder_name: &str,
        course: &str,
        valid_until: i64,
        content_hash: Option<&str>,
    ) -> Self {
        Self {
            certificate_key: ledger_key(certificate_id),
            holder_name: holder_name.to_string(),
            course: course.to_string(),
            valid_until,
            content_hash: content_hash.unwrap_or_default().to_string(),
        }
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether the ledger currently attests the certificate as registered and not revoked
    async fn attest(&self, certificate_id: &str) -> Result<bool, Degraded>;

    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt, Degraded>;

    /// Revoke on the ledger, returning the transaction hash
    async fn revoke(&self, certificate_id: &str, reason: &str) -> Result<String, Degraded>;
}

/// Stand-in used when no ledger gateway is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledLedger;

#[async_trait]
impl LedgerClient for DisabledLedger {
    async fn attest(&self, _certificate_id: &str) -> Result<bool, Degraded> {
        Err(Degraded::disabled(SERVICE, "attest"))
    }

    async fn register(&self, _registration: &LedgerRegistration) -> Result<LedgerReceipt, Degraded> {
        Err(Degraded::disabled(SERVICE, "register"))
    }

    async fn revoke(&self, _certificate_id: &str, _reason: &str) -> Result<String, Degraded> {
        Err(Degraded::disabled(SERVICE, "revoke"))
    }
}
