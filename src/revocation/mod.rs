/// Certificate revocation workflow
///
/// The local transition to `revoked` is final; the ledger revoke call that
/// follows is best-effort.

use crate::{
    certificate::{Certificate, CertificateStore},
    db::account::{Account, Role},
    degraded::tolerate,
    error::{CertError, CertResult},
    ledger::LedgerClient,
    metrics,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

/// Revoked record plus the ledger transaction, if one was made
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationOutcome {
    pub certificate: Certificate,
    pub ledger_tx_hash: Option<String>,
}

pub struct RevocationWorkflow {
    store: Arc<dyn CertificateStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl RevocationWorkflow {
    pub fn new(store: Arc<dyn CertificateStore>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { store, ledger }
    }

    /// Revoke `certificate_id` on behalf of `actor`
    ///
    /// Issuers can only see their own certificates; admins can revoke any.
    pub async fn revoke(
        &self,
        actor: &Account,
        certificate_id: &str,
        reason: Option<&str>,
    ) -> CertResult<RevocationOutcome> {
        let found = match actor.role {
            Role::Admin => self.store.find_by_certificate_id(certificate_id).await?,
            Role::Issuer => {
                self.store
                    .find_for_issuer(certificate_id, &actor.id)
                    .await?
            }
            Role::Verifier => {
                return Err(CertError::Authorization(
                    "Only issuers and admins can revoke certificates".to_string(),
                ))
            }
        };
        let certificate = found.ok_or_else(|| {
            CertError::NotFound(format!("Certificate {} not found", certificate_id))
        })?;

        if !certificate.is_valid_status() {
            return Err(CertError::AlreadyRevoked(certificate_id.to_string()));
        }

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON);

        // Conditional update: a concurrent revocation makes this one lose
        if !self.store.mark_revoked(certificate_id, reason).await? {
            return Err(CertError::AlreadyRevoked(certificate_id.to_string()));
        }

        let ledger_tx_hash = tolerate(self.ledger.revoke(certificate_id, reason).await);
        if let Some(tx_hash) = &ledger_tx_hash {
            self.store.record_revoke_tx(certificate_id, tx_hash).await?;
        }

        metrics::record_revocation(if ledger_tx_hash.is_some() {
            "anchored"
        } else {
            "unanchored"
        });
        info!(
            certificate_id,
            actor = %actor.id,
            reason,
            "Revoked certificate"
        );

        let certificate = self
            .store
            .find_by_certificate_id(certificate_id)
            .await?
            .ok_or_else(|| CertError::NotFound(format!("Certificate {} not found", certificate_id)))?;

        Ok(RevocationOutcome {
            certificate,
            ledger_tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::ApprovalStatus,
        certificate::{CertificateStatus, SqliteCertificateStore},
        config::VerificationConfig,
        content::fake::FakeContentStore,
        db,
        issuance::{IssuanceWorkflow, IssueCertificateRequest},
        ledger::fake::{Behaviour, FakeLedger},
        mailer::fake::RecordingNotifier,
        verification::{LookupKey, TrustComposer},
    };
    use sqlx::SqlitePool;

    struct Harness {
        pool: SqlitePool,
        store: Arc<SqliteCertificateStore>,
        ledger: Arc<FakeLedger>,
    }

    impl Harness {
        async fn new(behaviour: Behaviour) -> Self {
            let pool = db::test_pool().await;
            Self {
                store: Arc::new(SqliteCertificateStore::new(pool.clone())),
                pool,
                ledger: Arc::new(FakeLedger::new(behaviour)),
            }
        }

        fn workflow(&self) -> RevocationWorkflow {
            RevocationWorkflow::new(self.store.clone(), self.ledger.clone())
        }

        async fn account(&self, id: &str, role: Role) -> Account {
            let status = if role == Role::Issuer {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::None
            };
            db::insert_test_account(&self.pool, id, role, status).await
        }

        async fn issue(&self, issuer: &Account, certificate_id: &str) {
            IssuanceWorkflow::new(
                self.store.clone(),
                self.ledger.clone(),
                Arc::new(FakeContentStore::working()),
                Arc::new(RecordingNotifier::default()),
                "http://localhost:4000".to_string(),
            )
            .issue(
                issuer,
                IssueCertificateRequest {
                    certificate_id: certificate_id.to_string(),
                    recipient_name: "Alice".to_string(),
                    course_name: "Algorithms 101".to_string(),
                    issued_on: Some("2024-01-01".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        async fn is_valid(&self, certificate_id: &str) -> bool {
            TrustComposer::new(
                self.store.clone(),
                self.ledger.clone(),
                VerificationConfig::default(),
            )
            .verify(LookupKey::CertificateId(certificate_id))
            .await
            .unwrap()
            .is_valid
        }
    }

    #[tokio::test]
    async fn test_revoke_is_one_way() {
        let h = Harness::new(Behaviour::Honest).await;
        let issuer = h.account("issuer-1", Role::Issuer).await;
        h.issue(&issuer, "CERT-0001").await;
        assert!(h.is_valid("CERT-0001").await);

        let outcome = h
            .workflow()
            .revoke(&issuer, "CERT-0001", Some("duplicate"))
            .await
            .unwrap();
        assert_eq!(outcome.certificate.status, CertificateStatus::Revoked);
        assert_eq!(outcome.certificate.revoke_reason.as_deref(), Some("duplicate"));
        assert!(outcome.ledger_tx_hash.is_some());
        assert_eq!(
            outcome.certificate.ledger_revoke_tx_hash,
            outcome.ledger_tx_hash
        );
        // Registration hash is kept
        assert!(outcome.certificate.was_issued_on_ledger());

        assert!(!h.is_valid("CERT-0001").await);
        assert!(matches!(
            h.workflow().revoke(&issuer, "CERT-0001", Some("again")).await,
            Err(CertError::AlreadyRevoked(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_reason_uses_default() {
        let h = Harness::new(Behaviour::Honest).await;
        let issuer = h.account("issuer-1", Role::Issuer).await;
        h.issue(&issuer, "CERT-0001").await;

        let outcome = h
            .workflow()
            .revoke(&issuer, "CERT-0001", Some("   "))
            .await
            .unwrap();
        assert_eq!(outcome.certificate.revoke_reason.as_deref(), Some(DEFAULT_REASON));
    }

    #[tokio::test]
    async fn test_ledger_outage_does_not_block_revocation() {
        let h = Harness::new(Behaviour::Honest).await;
        let issuer = h.account("issuer-1", Role::Issuer).await;
        h.issue(&issuer, "CERT-0001").await;

        let offline = RevocationWorkflow::new(
            h.store.clone(),
            Arc::new(FakeLedger::new(Behaviour::Unreachable)),
        );
        let outcome = offline.revoke(&issuer, "CERT-0001", None).await.unwrap();
        assert_eq!(outcome.certificate.status, CertificateStatus::Revoked);
        assert!(outcome.ledger_tx_hash.is_none());

        // Still attested on the ledger, but the local revocation wins
        assert!(!h.is_valid("CERT-0001").await);
    }

    #[tokio::test]
    async fn test_issuer_scope_and_admin_override() {
        let h = Harness::new(Behaviour::Honest).await;
        let owner = h.account("issuer-1", Role::Issuer).await;
        let other = h.account("issuer-2", Role::Issuer).await;
        let admin = h.account("admin-1", Role::Admin).await;
        let verifier = h.account("verifier-1", Role::Verifier).await;
        h.issue(&owner, "CERT-0001").await;

        assert!(matches!(
            h.workflow().revoke(&other, "CERT-0001", None).await,
            Err(CertError::NotFound(_))
        ));
        assert!(matches!(
            h.workflow().revoke(&verifier, "CERT-0001", None).await,
            Err(CertError::Authorization(_))
        ));
        assert!(h.workflow().revoke(&admin, "CERT-0001", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_certificate_is_not_found() {
        let h = Harness::new(Behaviour::Honest).await;
        let issuer = h.account("issuer-1", Role::Issuer).await;
        assert!(matches!(
            h.workflow().revoke(&issuer, "CERT-404", None).await,
            Err(CertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_revocations_have_one_winner() {
        let h = Harness::new(Behaviour::Honest).await;
        let issuer = h.account("issuer-1", Role::Issuer).await;
        h.issue(&issuer, "CERT-0001").await;
        let first = h.workflow();
        let second = h.workflow();

        let (a, b) = tokio::join!(
            first.revoke(&issuer, "CERT-0001", Some("a")),
            second.revoke(&issuer, "CERT-0001", Some("b"))
        );
        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        assert!([&a, &b]
            .iter()
            .any(|r| matches!(r, Err(CertError::AlreadyRevoked(_)))));
    }
}
