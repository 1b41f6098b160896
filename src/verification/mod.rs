/// Trust composition
///
/// Folds the record's status, the ledger's attestation and hash commitments
/// into a single verdict. Lookup-based verification is lenient about ledger
/// outages; hash and QR verification require an active attestation.

use crate::{
    certificate::{parse_payload, Certificate, CertificateStore, ParsedPayload},
    config::VerificationConfig,
    error::{CertError, CertResult},
    ledger::LedgerClient,
    metrics,
};
use serde::Serialize;
use std::sync::Arc;

/// How a caller identifies the certificate to verify
#[derive(Debug, Clone, Copy)]
pub enum LookupKey<'a> {
    Token(&'a str),
    CertificateId(&'a str),
}

impl LookupKey<'_> {
    fn method(&self) -> &'static str {
        match self {
            LookupKey::Token(_) => "token",
            LookupKey::CertificateId(_) => "certificate_id",
        }
    }
}

/// Verdict of the lenient lookup verification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_valid: bool,
    pub reasons: Vec<String>,
    pub ledger_attested: bool,
    pub was_issued_on_ledger: bool,
    pub content_hash: Option<String>,
    pub certificate: Certificate,
}

/// Verdict of strict hash verification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashVerdict {
    pub is_valid: bool,
    pub reasons: Vec<String>,
    pub ledger_attested: bool,
    pub hash_match: bool,
    pub stored_hash: Option<String>,
    pub provided_hash: String,
    pub certificate: Certificate,
}

/// Verdict of student-hash verification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentHashVerdict {
    pub is_valid: bool,
    pub reasons: Vec<String>,
    pub hash_match: bool,
    pub ledger_attested: bool,
    pub was_issued_on_ledger: bool,
    pub certificate: Certificate,
}

/// Ledger view used by the lenient rule
struct LedgerView {
    attested: bool,
    issued_on_ledger: bool,
    unreachable: bool,
}

pub struct TrustComposer {
    store: Arc<dyn CertificateStore>,
    ledger: Arc<dyn LedgerClient>,
    config: VerificationConfig,
}

impl TrustComposer {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        ledger: Arc<dyn LedgerClient>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    async fn lookup(&self, key: LookupKey<'_>) -> CertResult<Certificate> {
        let found = match key {
            LookupKey::Token(token) => self.store.find_by_token(token).await?,
            LookupKey::CertificateId(id) => self.store.find_by_certificate_id(id).await?,
        };
        found.ok_or_else(|| CertError::NotFound("Certificate not found".to_string()))
    }

    async fn find_by_id(&self, certificate_id: &str) -> CertResult<Certificate> {
        self.lookup(LookupKey::CertificateId(certificate_id)).await
    }

    /// Ledger attestation where a transport failure falls back to whether the
    /// certificate was recorded on the ledger at issuance
    async fn lenient_ledger(&self, certificate: &Certificate) -> LedgerView {
        let issued_on_ledger = certificate.was_issued_on_ledger();
        match self.ledger.attest(&certificate.certificate_id).await {
            Ok(attested) => LedgerView {
                attested,
                issued_on_ledger,
                unreachable: false,
            },
            Err(degraded) => {
                degraded.log();
                LedgerView {
                    attested: issued_on_ledger,
                    issued_on_ledger,
                    unreachable: true,
                }
            }
        }
    }

    /// Ledger attestation where any failure counts as "not attested"
    async fn strict_ledger(&self, certificate_id: &str, reasons: &mut Vec<String>) -> bool {
        match self.ledger.attest(certificate_id).await {
            Ok(true) => true,
            Ok(false) => {
                reasons.push("Ledger does not attest this certificate".to_string());
                false
            }
            Err(degraded) => {
                degraded.log();
                reasons.push("Ledger attestation unavailable".to_string());
                false
            }
        }
    }

    fn lenient_reasons(&self, certificate: &Certificate, ledger: &LedgerView) -> (bool, Vec<String>) {
        let mut reasons = Vec::new();
        let status_ok = certificate.is_valid_status();
        if !status_ok {
            reasons.push(match &certificate.revoke_reason {
                Some(reason) => format!("Certificate has been revoked: {}", reason),
                None => "Certificate has been revoked".to_string(),
            });
        }

        let anchored = ledger.attested || ledger.issued_on_ledger || self.config.accept_unanchored;
        if !anchored {
            reasons.push(if ledger.unreachable {
                "Ledger unavailable and certificate was never recorded on it".to_string()
            } else {
                "Certificate is not attested on the ledger".to_string()
            });
        }

        (status_ok && anchored, reasons)
    }

    /// Verify by token or certificate ID
    pub async fn verify(&self, key: LookupKey<'_>) -> CertResult<Verdict> {
        let certificate = self.lookup(key).await?;
        let ledger = self.lenient_ledger(&certificate).await;
        let (is_valid, reasons) = self.lenient_reasons(&certificate, &ledger);

        metrics::record_verification(key.method(), is_valid);
        tracing::debug!(
            certificate_id = %certificate.certificate_id,
            is_valid,
            "Verified certificate"
        );

        Ok(Verdict {
            is_valid,
            reasons,
            ledger_attested: ledger.attested,
            was_issued_on_ledger: ledger.issued_on_ledger,
            content_hash: certificate.resolved_content_hash().map(str::to_string),
            certificate,
        })
    }

    /// Strict verification against a content hash
    pub async fn verify_hash(
        &self,
        certificate_id: &str,
        provided_hash: &str,
    ) -> CertResult<HashVerdict> {
        let verdict = self.strict_hash_verdict(certificate_id, provided_hash).await?;
        metrics::record_verification("hash", verdict.is_valid);
        Ok(verdict)
    }

    async fn strict_hash_verdict(
        &self,
        certificate_id: &str,
        provided_hash: &str,
    ) -> CertResult<HashVerdict> {
        let certificate = self.find_by_id(certificate_id).await?;
        let mut reasons = Vec::new();

        let status_ok = certificate.is_valid_status();
        if !status_ok {
            reasons.push("Certificate has been revoked".to_string());
        }

        let stored_hash = certificate.resolved_content_hash().map(str::to_string);
        let hash_match = stored_hash.as_deref() == Some(provided_hash);
        if !hash_match {
            reasons.push(match &stored_hash {
                Some(_) => "Hash does not match the stored content hash".to_string(),
                None => "Certificate has no stored content hash".to_string(),
            });
        }

        let ledger_attested = self
            .strict_ledger(&certificate.certificate_id, &mut reasons)
            .await;

        Ok(HashVerdict {
            is_valid: status_ok && ledger_attested && hash_match,
            reasons,
            ledger_attested,
            hash_match,
            stored_hash,
            provided_hash: provided_hash.to_string(),
            certificate,
        })
    }

    /// Verify a scanned QR payload
    pub async fn verify_qr_payload(&self, raw: &str) -> CertResult<HashVerdict> {
        let verdict = match parse_payload(raw)? {
            ParsedPayload::Certificate {
                certificate_id,
                hash,
            } => self.strict_hash_verdict(&certificate_id, &hash).await?,
            ParsedPayload::Batch { .. } => {
                return Err(CertError::UnsupportedType(
                    "batch_certificate verification is not supported".to_string(),
                ))
            }
        };

        metrics::record_verification("qr", verdict.is_valid);
        Ok(verdict)
    }

    /// Offline-style check of the student hash sent to the recipient
    pub async fn verify_student_hash(
        &self,
        certificate_id: &str,
        provided_hash: &str,
    ) -> CertResult<StudentHashVerdict> {
        let certificate = self.find_by_id(certificate_id).await?;
        let ledger = self.lenient_ledger(&certificate).await;
        let (lenient_ok, mut reasons) = self.lenient_reasons(&certificate, &ledger);

        let hash_match = certificate
            .student_hash
            .as_deref()
            .is_some_and(|stored| stored.eq_ignore_ascii_case(provided_hash.trim()));
        if !hash_match {
            reasons.push("Student hash does not match".to_string());
        }

        let is_valid = lenient_ok && hash_match;
        metrics::record_verification("student_hash", is_valid);

        Ok(StudentHashVerdict {
            is_valid,
            reasons,
            hash_match,
            ledger_attested: ledger.attested,
            was_issued_on_ledger: ledger.issued_on_ledger,
            certificate,
        })
    }
}
