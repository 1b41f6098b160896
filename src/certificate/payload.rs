/// QR-encodable verification payloads
///
/// The issuance workflow emits a `certificate` payload; the trust composer
/// parses whatever a scanner hands back.
use crate::{
    certificate::Certificate,
    error::{CertError, CertResult},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CERTIFICATE_PAYLOAD_TYPE: &str = "certificate";
pub const BATCH_PAYLOAD_TYPE: &str = "batch_certificate";

const CERTIFICATE_FIELDS: &[&str] = &[
    "certificateId",
    "recipientName",
    "courseName",
    "issuedOn",
    "hash",
];
const BATCH_FIELDS: &[&str] = &["merkleRoot", "proof", "leaf"];

/// Payload embedded in a certificate QR code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub certificate_id: String,
    pub recipient_name: String,
    pub course_name: String,
    pub issued_on: String,
    /// Content hash, empty when nothing was pinned
    pub hash: String,
    pub verify_url: String,
    pub timestamp: i64,
}

impl CertificatePayload {
    pub fn for_certificate(certificate: &Certificate, verify_url: &str) -> Self {
        Self {
            payload_type: CERTIFICATE_PAYLOAD_TYPE.to_string(),
            certificate_id: certificate.certificate_id.clone(),
            recipient_name: certificate.recipient_name.clone(),
            course_name: certificate.course_name.clone(),
            issued_on: certificate.issued_on.format("%Y-%m-%d").to_string(),
            hash: certificate
                .resolved_content_hash()
                .unwrap_or_default()
                .to_string(),
            verify_url: verify_url.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Compact JSON string ready to be rendered into a QR image
    pub fn encode(&self) -> CertResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CertError::Internal(format!("Failed to encode payload: {}", e)))
    }
}

/// A structurally valid payload
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Certificate {
        certificate_id: String,
        hash: String,
    },
    Batch {
        merkle_root: Value,
        proof: Value,
        leaf: Value,
    },
}

/// Parse a raw QR payload and check the fields its declared type requires
pub fn parse_payload(raw: &str) -> CertResult<ParsedPayload> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| CertError::MalformedPayload("Invalid QR data format".to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| CertError::MalformedPayload("QR data must be an object".to_string()))?;

    let payload_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CertError::MalformedPayload("missing type".to_string()))?;

    let required = match payload_type {
        CERTIFICATE_PAYLOAD_TYPE => CERTIFICATE_FIELDS,
        BATCH_PAYLOAD_TYPE => BATCH_FIELDS,
        other => return Err(CertError::UnsupportedType(other.to_string())),
    };

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| object.get(*field).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(CertError::MalformedPayload(format!(
            "{} payload missing {}",
            payload_type,
            missing.join(", ")
        )));
    }

    if payload_type == BATCH_PAYLOAD_TYPE {
        return Ok(ParsedPayload::Batch {
            merkle_root: object["merkleRoot"].clone(),
            proof: object["proof"].clone(),
            leaf: object["leaf"].clone(),
        });
    }

    let text = |field: &str| {
        object[field].as_str().map(str::to_string).ok_or_else(|| {
            CertError::MalformedPayload(format!("{} must be a string", field))
        })
    };

    Ok(ParsedPayload::Certificate {
        certificate_id: text("certificateId")?,
        hash: text("hash")?,
    })
}
