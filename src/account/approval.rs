/// Issuer approval state machine
///
/// `none -> pending -> {approved, rejected}`. The account owner may request
/// access from any state, which always lands in `pending` (an approved issuer
/// asking again gives up issuing rights until re-approved); only an admin may
/// decide a pending request. The resulting state gates the issuance workflow and nothing else.
use crate::{
    db::account::{Account, Role},
    error::{CertError, CertResult},
};
use serde::{Deserialize, Serialize};

/// Approval state of an issuer account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::None => "none",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> CertResult<Self> {
        match s {
            "none" => Ok(ApprovalStatus::None),
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(CertError::Internal(format!("Invalid approval status: {}", s))),
        }
    }
}

/// Requested change to an approval state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    /// Owner asks for issuing rights
    Request,
    /// Admin grants a pending request
    Approve,
    /// Admin refuses a pending request
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Request => "request",
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

/// Compute the next approval state for `subject` when `actor` applies `action`.
pub fn transition(
    actor: &Account,
    subject: &Account,
    action: ApprovalAction,
) -> CertResult<ApprovalStatus> {
    if subject.role != Role::Issuer {
        return Err(CertError::InvalidTransition(format!(
            "approval only applies to issuer accounts, {} is a {}",
            subject.email,
            subject.role.as_str()
        )));
    }

    let current = subject.approval_status;

    match action {
        ApprovalAction::Request => {
            if actor.id != subject.id {
                return Err(CertError::Authorization(
                    "Only the account owner may request access".to_string(),
                ));
            }
            Ok(ApprovalStatus::Pending)
        }
        ApprovalAction::Approve | ApprovalAction::Reject => {
            if actor.role != Role::Admin {
                return Err(CertError::Authorization(
                    "Admin role required to decide access requests".to_string(),
                ));
            }
            if current != ApprovalStatus::Pending {
                return Err(CertError::InvalidTransition(format!(
                    "cannot {} an issuer in state {}",
                    action.as_str(),
                    current.as_str()
                )));
            }
            Ok(if action == ApprovalAction::Approve {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Rejected
            })
        }
    }
}
