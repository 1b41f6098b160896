/// Certificate data models
use crate::error::{CertError, CertResult, FieldIssue};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};
use std::collections::BTreeMap;

/// Reserved metadata key holding the content-store reference
pub const CONTENT_METADATA_KEY: &str = "ipfs";

/// Lifecycle state; `Revoked` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> CertResult<Self> {
        match s {
            "valid" => Ok(CertificateStatus::Valid),
            "revoked" => Ok(CertificateStatus::Revoked),
            _ => Err(CertError::Internal(format!("Invalid certificate status: {}", s))),
        }
    }
}

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl MetadataValue {
    /// Convert a JSON value, refusing arrays and objects
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(MetadataValue::Null),
            Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(MetadataValue::Integer)
                .or_else(|| n.as_f64().map(MetadataValue::Float)),
            Value::String(s) => Some(MetadataValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Content-store reference pinned for a certificate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRef {
    pub cid: Option<String>,
    pub url: Option<String>,
}

/// Open string -> scalar map plus the reserved content reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(
        rename = "ipfs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<ContentRef>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, MetadataValue>,
}

impl Metadata {
    /// Build metadata from caller input, collecting per-key issues
    pub fn from_input(
        input: Option<&serde_json::Map<String, Value>>,
    ) -> Result<Self, Vec<FieldIssue>> {
        let mut fields = BTreeMap::new();
        let mut issues = Vec::new();

        for (key, value) in input.into_iter().flatten() {
            if key == CONTENT_METADATA_KEY {
                issues.push(FieldIssue::new(
                    format!("metadata.{}", key),
                    "is reserved for the content-store reference",
                ));
                continue;
            }
            match MetadataValue::from_json(value) {
                Some(v) => {
                    fields.insert(key.clone(), v);
                }
                None => issues.push(FieldIssue::new(
                    format!("metadata.{}", key),
                    "must be a string, number, boolean or null",
                )),
            }
        }

        if issues.is_empty() {
            Ok(Self {
                content: None,
                fields,
            })
        } else {
            Err(issues)
        }
    }
}

/// Certificate record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_id: String,
    /// Capability token; only handed out through verification links
    #[serde(skip_serializing)]
    pub verification_token: String,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub course_name: String,
    pub issued_on: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub issuer_id: String,
    pub metadata: Metadata,
    pub content_hash: Option<String>,
    pub ledger_tx_hash: Option<String>,
    pub ledger_block_number: Option<i64>,
    pub ledger_gas_used: Option<String>,
    pub ledger_revoke_tx_hash: Option<String>,
    pub student_hash: Option<String>,
    pub status: CertificateStatus,
    pub revoke_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub const COLUMNS: &'static str = "certificate_id, verification_token, recipient_name, \
         recipient_email, course_name, issued_on, valid_until, issuer_id, metadata, content_hash, \
         ledger_tx_hash, ledger_block_number, ledger_gas_used, ledger_revoke_tx_hash, \
         student_hash, status, revoke_reason, created_at, updated_at";

    pub fn from_row(row: &SqliteRow) -> CertResult<Self> {
        let metadata: String = row.try_get("metadata")?;
        let metadata: Metadata = serde_json::from_str(&metadata)
            .map_err(|e| CertError::Internal(format!("Invalid stored metadata: {}", e)))?;
        let status: String = row.try_get("status")?;

        Ok(Certificate {
            certificate_id: row.try_get("certificate_id")?,
            verification_token: row.try_get("verification_token")?,
            recipient_name: row.try_get("recipient_name")?,
            recipient_email: row.try_get("recipient_email")?,
            course_name: row.try_get("course_name")?,
            issued_on: row.try_get("issued_on")?,
            valid_until: row.try_get("valid_until")?,
            issuer_id: row.try_get("issuer_id")?,
            metadata,
            content_hash: row.try_get("content_hash")?,
            ledger_tx_hash: row.try_get("ledger_tx_hash")?,
            ledger_block_number: row.try_get("ledger_block_number")?,
            ledger_gas_used: row.try_get("ledger_gas_used")?,
            ledger_revoke_tx_hash: row.try_get("ledger_revoke_tx_hash")?,
            student_hash: row.try_get("student_hash")?,
            status: CertificateStatus::parse(&status)?,
            revoke_reason: row.try_get("revoke_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn is_valid_status(&self) -> bool {
        self.status == CertificateStatus::Valid
    }

    /// A ledger transaction was recorded for this certificate
    pub fn was_issued_on_ledger(&self) -> bool {
        self.ledger_tx_hash.is_some()
    }

    /// Own content hash, falling back to the copy embedded in metadata
    pub fn resolved_content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref().or_else(|| {
            self.metadata
                .content
                .as_ref()
                .and_then(|c| c.cid.as_deref())
        })
    }

    /// Seconds since the epoch at the start of `valid_until`, 0 for no expiry
    pub fn valid_until_epoch(&self) -> i64 {
        self.valid_until
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0)
    }
}

/// Parse a caller-supplied date (`YYYY-MM-DD` or RFC 3339)
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, FieldIssue> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| FieldIssue::new(field, "must be a date (YYYY-MM-DD or RFC 3339)"))
}
