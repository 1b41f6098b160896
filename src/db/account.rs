/// Account database models
use crate::{
    account::ApprovalStatus,
    error::{CertError, CertResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// Account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Issuer,
    Verifier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Issuer => "issuer",
            Role::Verifier => "verifier",
        }
    }

    pub fn parse(s: &str) -> CertResult<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "issuer" => Ok(Role::Issuer),
            "verifier" => Ok(Role::Verifier),
            _ => Err(CertError::Internal(format!("Invalid role: {}", s))),
        }
    }
}

/// Account record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub organization: Option<String>,
    pub approval_status: ApprovalStatus,
    pub access_requested_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Columns selected by every account query, in `from_row` order
    pub const COLUMNS: &'static str = "id, name, email, password_hash, role, organization, \
         approval_status, access_requested_at, approved_at, last_login_at, is_active, created_at";

    pub fn from_row(row: &SqliteRow) -> CertResult<Self> {
        let role: String = row.try_get("role")?;
        let approval_status: String = row.try_get("approval_status")?;

        Ok(Account {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: Role::parse(&role)?,
            organization: row.try_get("organization")?,
            approval_status: ApprovalStatus::parse(&approval_status)?,
            access_requested_at: row.try_get("access_requested_at")?,
            approved_at: row.try_get("approved_at")?,
            last_login_at: row.try_get("last_login_at")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Admins are implicitly approved regardless of stored approval status
    pub fn is_approved(&self) -> bool {
        self.role == Role::Admin || self.approval_status == ApprovalStatus::Approved
    }

    /// Whether this account may start the issuance workflow
    pub fn can_issue(&self) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Issuer => self.is_approved(),
            Role::Verifier => false,
        }
    }

    /// Human readable status used by the admin UI
    pub fn status_label(&self) -> &'static str {
        match (self.role, self.approval_status) {
            (Role::Admin, _) => "Admin",
            (Role::Issuer, ApprovalStatus::Approved) => "Approved Issuer",
            (Role::Issuer, ApprovalStatus::Pending) => "Pending Approval",
            (Role::Issuer, ApprovalStatus::Rejected) => "Rejected",
            (Role::Issuer, ApprovalStatus::None) => "Issuer",
            (Role::Verifier, _) => "Verifier",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role, approval_status: ApprovalStatus) -> Account {
        Account {
            id: "acct-1".to_string(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            password_hash: String::new(),
            role,
            organization: None,
            approval_status,
            access_requested_at: None,
            approved_at: None,
            last_login_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_admin_is_implicitly_approved() {
        let admin = account(Role::Admin, ApprovalStatus::None);
        assert!(admin.is_approved());
        assert!(admin.can_issue());
    }

    #[test]
    fn test_issuer_needs_approval() {
        assert!(!account(Role::Issuer, ApprovalStatus::Pending).can_issue());
        assert!(!account(Role::Issuer, ApprovalStatus::Rejected).can_issue());
        assert!(!account(Role::Issuer, ApprovalStatus::None).can_issue());
        assert!(account(Role::Issuer, ApprovalStatus::Approved).can_issue());
    }

    #[test]
    fn test_verifier_never_issues() {
        assert!(!account(Role::Verifier, ApprovalStatus::Approved).can_issue());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut acct = account(Role::Verifier, ApprovalStatus::None);
        acct.password_hash = "secret-hash".to_string();
        let json = serde_json::to_string(&acct).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"approvalStatus\":\"none\""));
    }
}
