/// Certificate issuance workflow
///
/// Creates the durable record first, then attaches best-effort extras:
/// content pinning, ledger registration and the recipient email. Only input
/// problems, the issuer precondition and duplicate IDs fail an issuance.

use crate::{
    certificate::{
        self, hash, parse_date, qr, Certificate, CertificatePayload, CertificateStatus,
        CertificateStore, ContentRef, Metadata,
    },
    content::ContentStore,
    db::account::Account,
    degraded::tolerate,
    error::{field_issues, CertError, CertResult, FieldIssue},
    ledger::{LedgerClient, LedgerReceipt, LedgerRegistration},
    mailer::{CertificateNotice, Notifier},
    metrics,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Certificate fields supplied by an issuer
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub certificate_id: String,
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub recipient_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub recipient_email: Option<String>,
    #[validate(length(min = 2, message = "must be at least 2 characters"))]
    pub course_name: String,
    /// Defaults to today
    pub issued_on: Option<String>,
    /// Absent means the certificate never expires
    pub valid_until: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    /// Transaction hash of a ledger write the caller already performed
    pub ledger_tx_hash: Option<String>,
}

impl IssueCertificateRequest {
    /// Trim text fields and drop empty optionals sent by web forms
    fn normalize(mut self) -> Self {
        fn non_empty(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.certificate_id = self.certificate_id.trim().to_string();
        self.recipient_name = self.recipient_name.trim().to_string();
        self.course_name = self.course_name.trim().to_string();
        self.recipient_email = non_empty(self.recipient_email).map(|e| e.to_lowercase());
        self.issued_on = non_empty(self.issued_on);
        self.valid_until = non_empty(self.valid_until);
        self.ledger_tx_hash = non_empty(self.ledger_tx_hash);
        self
    }
}

/// How the certificate ended up on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// Registered by this service
    Anchored,
    /// Registered by the caller, hash stored as supplied
    Supplied,
    /// Registration failed or no ledger is configured
    Unanchored,
}

impl LedgerStatus {
    fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Anchored => "anchored",
            LedgerStatus::Supplied => "supplied",
            LedgerStatus::Unanchored => "unanchored",
        }
    }
}

/// Result of a successful issuance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceOutcome {
    pub certificate: Certificate,
    /// JSON string to render into the QR image
    pub qr_payload: String,
    /// PNG data URL of a QR code carrying the verification link
    pub qr_image: Option<String>,
    pub verify_url: String,
    pub student_hash: String,
    pub content_hash: Option<String>,
    pub ledger_status: LedgerStatus,
    pub ledger: Option<LedgerReceipt>,
}

/// Validated and parsed input
struct Draft {
    request: IssueCertificateRequest,
    issued_on: chrono::NaiveDate,
    valid_until: Option<chrono::NaiveDate>,
    metadata: Metadata,
}

pub struct IssuanceWorkflow {
    store: Arc<dyn CertificateStore>,
    ledger: Arc<dyn LedgerClient>,
    content: Arc<dyn ContentStore>,
    notifier: Arc<dyn Notifier>,
    public_url: String,
}

impl IssuanceWorkflow {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        ledger: Arc<dyn LedgerClient>,
        content: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        public_url: String,
    ) -> Self {
        Self {
            store,
            ledger,
            content,
            notifier,
            public_url,
        }
    }

    /// Check the request and collect every violated field
    fn validate(request: IssueCertificateRequest) -> CertResult<Draft> {
        let request = request.normalize();
        let mut issues = match request.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => field_issues(&errors),
        };

        let issued_on = match request.issued_on.as_deref() {
            Some(raw) => parse_date("issuedOn", raw).map_err(|i| issues.push(i)).ok(),
            None => Some(Utc::now().date_naive()),
        };
        let valid_until = match request.valid_until.as_deref() {
            Some(raw) => match parse_date("validUntil", raw) {
                Ok(date) => Some(date),
                Err(issue) => {
                    issues.push(issue);
                    None
                }
            },
            None => None,
        };
        if let (Some(from), Some(until)) = (issued_on, valid_until) {
            if until < from {
                issues.push(FieldIssue::new("validUntil", "must not be before issuedOn"));
            }
        }

        let metadata = match Metadata::from_input(request.metadata.as_ref()) {
            Ok(metadata) => Some(metadata),
            Err(mut metadata_issues) => {
                issues.append(&mut metadata_issues);
                None
            }
        };

        match (issued_on, metadata) {
            (Some(issued_on), Some(metadata)) if issues.is_empty() => Ok(Draft {
                request,
                issued_on,
                valid_until,
                metadata,
            }),
            _ => Err(CertError::InvalidInput(issues)),
        }
    }

    /// Issue a certificate on behalf of `issuer`
    pub async fn issue(
        &self,
        issuer: &Account,
        request: IssueCertificateRequest,
    ) -> CertResult<IssuanceOutcome> {
        if !issuer.can_issue() {
            return Err(CertError::NotApproved);
        }

        let Draft {
            request,
            issued_on,
            valid_until,
            mut metadata,
        } = Self::validate(request)?;
        let certificate_id = request.certificate_id.clone();

        if self
            .store
            .find_by_certificate_id(&certificate_id)
            .await?
            .is_some()
        {
            return Err(CertError::Conflict(format!(
                "Certificate ID {} already exists",
                certificate_id
            )));
        }

        let verification_token = Uuid::new_v4().to_string();

        let document = json!({
            "certificateId": certificate_id,
            "recipientName": request.recipient_name,
            "courseName": request.course_name,
            "issuedOn": issued_on.format("%Y-%m-%d").to_string(),
            "validUntil": valid_until.map(|d| d.format("%Y-%m-%d").to_string()),
            "issuer": issuer.name,
            "organization": issuer.organization,
            "metadata": metadata.fields,
        });
        let pinned = tolerate(self.content.pin(&certificate_id, &document).await);
        if let Some(pinned) = &pinned {
            metadata.content = Some(ContentRef {
                cid: Some(pinned.cid.clone()),
                url: Some(pinned.url.clone()),
            });
        }

        let now = Utc::now();
        let record = Certificate {
            certificate_id: certificate_id.clone(),
            verification_token,
            recipient_name: request.recipient_name.clone(),
            recipient_email: request.recipient_email.clone(),
            course_name: request.course_name.clone(),
            issued_on,
            valid_until,
            issuer_id: issuer.id.clone(),
            metadata,
            content_hash: pinned.map(|p| p.cid),
            ledger_tx_hash: None,
            ledger_block_number: None,
            ledger_gas_used: None,
            ledger_revoke_tx_hash: None,
            student_hash: None,
            status: CertificateStatus::Valid,
            revoke_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&record).await?;

        let (ledger_status, receipt) = match request.ledger_tx_hash {
            Some(tx_hash) => {
                let receipt = LedgerReceipt {
                    tx_hash,
                    block_number: None,
                    gas_used: None,
                };
                self.store
                    .record_ledger_receipt(&certificate_id, &receipt)
                    .await?;
                (LedgerStatus::Supplied, Some(receipt))
            }
            None => {
                let registration = LedgerRegistration::new(
                    &certificate_id,
                    &record.recipient_name,
                    &record.course_name,
                    record.valid_until_epoch(),
                    record.content_hash.as_deref(),
                );
                match tolerate(self.ledger.register(&registration).await) {
                    Some(receipt) => {
                        self.store
                            .record_ledger_receipt(&certificate_id, &receipt)
                            .await?;
                        (LedgerStatus::Anchored, Some(receipt))
                    }
                    None => (LedgerStatus::Unanchored, None),
                }
            }
        };

        let student_hash = hash::student_hash(
            &record.recipient_name,
            &record.course_name,
            record.issued_on,
            &certificate_id,
        );
        self.store
            .set_student_hash(&certificate_id, &student_hash)
            .await?;

        let certificate = self
            .store
            .find_by_certificate_id(&certificate_id)
            .await?
            .ok_or_else(|| {
                CertError::Internal(format!("Certificate {} vanished after insert", certificate_id))
            })?;

        let verify_url = certificate::verify_url(&self.public_url, &certificate.verification_token);
        let qr_payload = CertificatePayload::for_certificate(&certificate, &verify_url).encode()?;
        let qr_image = match qr::render_data_url(&verify_url) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("QR image for {} not rendered: {}", certificate_id, e);
                None
            }
        };

        if let Some(email) = &certificate.recipient_email {
            self.dispatch_notice(CertificateNotice {
                recipient_email: email.clone(),
                recipient_name: certificate.recipient_name.clone(),
                course_name: certificate.course_name.clone(),
                certificate_id: certificate_id.clone(),
                verify_url: verify_url.clone(),
                student_hash: student_hash.clone(),
                qr_image: qr_image.clone(),
            });
        }

        metrics::record_issuance(ledger_status.as_str());
        info!(
            certificate_id = %certificate_id,
            issuer = %issuer.id,
            ledger = ledger_status.as_str(),
            "Issued certificate"
        );

        Ok(IssuanceOutcome {
            content_hash: certificate.content_hash.clone(),
            certificate,
            qr_payload,
            qr_image,
            verify_url,
            student_hash,
            ledger_status,
            ledger: receipt,
        })
    }

    /// Send the recipient email in the background
    fn dispatch_notice(&self, notice: CertificateNotice) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(degraded) = notifier.send_certificate(&notice).await {
                warn!(
                    "Certificate email for {} not delivered",
                    notice.certificate_id
                );
                degraded.log();
            }
        });
    }
}
