/// Certificate record store
use crate::{
    certificate::{Certificate, CertificateStatus},
    error::{CertError, CertResult},
    ledger::LedgerReceipt,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

/// Durable certificate records keyed by certificate ID and verification token
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_certificate_id(&self, certificate_id: &str)
        -> CertResult<Option<Certificate>>;

    async fn find_by_token(&self, token: &str) -> CertResult<Option<Certificate>>;

    /// Certificate issued by `issuer_id`, if any
    async fn find_for_issuer(
        &self,
        certificate_id: &str,
        issuer_id: &str,
    ) -> CertResult<Option<Certificate>>;

    /// Certificates issued by `issuer_id`, newest first
    async fn list_by_issuer(&self, issuer_id: &str) -> CertResult<Vec<Certificate>>;

    /// Insert a new record; duplicate IDs or tokens yield `Conflict`
    async fn insert(&self, certificate: &Certificate) -> CertResult<()>;

    /// Back-fill ledger transaction metadata after registration
    async fn record_ledger_receipt(
        &self,
        certificate_id: &str,
        receipt: &LedgerReceipt,
    ) -> CertResult<()>;

    async fn set_student_hash(&self, certificate_id: &str, student_hash: &str) -> CertResult<()>;

    /// Move a valid certificate to revoked; `false` when it was not valid
    async fn mark_revoked(&self, certificate_id: &str, reason: &str) -> CertResult<bool>;

    async fn record_revoke_tx(&self, certificate_id: &str, tx_hash: &str) -> CertResult<()>;
}

/// SQLite-backed certificate store
#[derive(Clone)]
pub struct SqliteCertificateStore {
    db: SqlitePool,
}

impl SqliteCertificateStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        binds: &[&str],
    ) -> CertResult<Option<Certificate>> {
        let sql = format!("SELECT {} FROM certificate WHERE {}", Certificate::COLUMNS, clause);
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }

        query
            .fetch_optional(&self.db)
            .await?
            .map(|row| Certificate::from_row(&row))
            .transpose()
    }

    fn expect_updated(rows_affected: u64, certificate_id: &str) -> CertResult<()> {
        if rows_affected == 0 {
            return Err(CertError::NotFound(format!(
                "Certificate {} not found",
                certificate_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateStore for SqliteCertificateStore {
    async fn find_by_certificate_id(
        &self,
        certificate_id: &str,
    ) -> CertResult<Option<Certificate>> {
        self.fetch_one_where("certificate_id = ?1", &[certificate_id])
            .await
    }

    async fn find_by_token(&self, token: &str) -> CertResult<Option<Certificate>> {
        self.fetch_one_where("verification_token = ?1", &[token]).await
    }

    async fn find_for_issuer(
        &self,
        certificate_id: &str,
        issuer_id: &str,
    ) -> CertResult<Option<Certificate>> {
        self.fetch_one_where(
            "certificate_id = ?1 AND issuer_id = ?2",
            &[certificate_id, issuer_id],
        )
        .await
    }

    async fn list_by_issuer(&self, issuer_id: &str) -> CertResult<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM certificate WHERE issuer_id = ?1 ORDER BY created_at DESC",
            Certificate::COLUMNS
        ))
        .bind(issuer_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Certificate::from_row).collect()
    }

    async fn insert(&self, certificate: &Certificate) -> CertResult<()> {
        let metadata = serde_json::to_string(&certificate.metadata)
            .map_err(|e| CertError::Internal(format!("Failed to encode metadata: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO certificate (certificate_id, verification_token, recipient_name,
                 recipient_email, course_name, issued_on, valid_until, issuer_id, metadata,
                 content_hash, ledger_tx_hash, ledger_block_number, ledger_gas_used,
                 ledger_revoke_tx_hash, student_hash, status, revoke_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        )
        .bind(&certificate.certificate_id)
        .bind(&certificate.verification_token)
        .bind(&certificate.recipient_name)
        .bind(&certificate.recipient_email)
        .bind(&certificate.course_name)
        .bind(certificate.issued_on)
        .bind(certificate.valid_until)
        .bind(&certificate.issuer_id)
        .bind(metadata)
        .bind(&certificate.content_hash)
        .bind(&certificate.ledger_tx_hash)
        .bind(certificate.ledger_block_number)
        .bind(&certificate.ledger_gas_used)
        .bind(&certificate.ledger_revoke_tx_hash)
        .bind(&certificate.student_hash)
        .bind(certificate.status.as_str())
        .bind(&certificate.revoke_reason)
        .bind(certificate.created_at)
        .bind(certificate.updated_at)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(CertError::Conflict(
                format!("Certificate ID {} already exists", certificate.certificate_id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_ledger_receipt(
        &self,
        certificate_id: &str,
        receipt: &LedgerReceipt,
    ) -> CertResult<()> {
        let result = sqlx::query(
            "UPDATE certificate
             SET ledger_tx_hash = ?1, ledger_block_number = ?2, ledger_gas_used = ?3, updated_at = ?4
             WHERE certificate_id = ?5",
        )
        .bind(&receipt.tx_hash)
        .bind(receipt.block_number)
        .bind(&receipt.gas_used)
        .bind(Utc::now())
        .bind(certificate_id)
        .execute(&self.db)
        .await?;

        Self::expect_updated(result.rows_affected(), certificate_id)
    }

    async fn set_student_hash(&self, certificate_id: &str, student_hash: &str) -> CertResult<()> {
        let result = sqlx::query(
            "UPDATE certificate SET student_hash = ?1, updated_at = ?2 WHERE certificate_id = ?3",
        )
        .bind(student_hash)
        .bind(Utc::now())
        .bind(certificate_id)
        .execute(&self.db)
        .await?;

        Self::expect_updated(result.rows_affected(), certificate_id)
    }

    async fn mark_revoked(&self, certificate_id: &str, reason: &str) -> CertResult<bool> {
        let result = sqlx::query(
            "UPDATE certificate SET status = ?1, revoke_reason = ?2, updated_at = ?3
             WHERE certificate_id = ?4 AND status = ?5",
        )
        .bind(CertificateStatus::Revoked.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(certificate_id)
        .bind(CertificateStatus::Valid.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_revoke_tx(&self, certificate_id: &str, tx_hash: &str) -> CertResult<()> {
        let result = sqlx::query(
            "UPDATE certificate SET ledger_revoke_tx_hash = ?1, updated_at = ?2 WHERE certificate_id = ?3",
        )
        .bind(tx_hash)
        .bind(Utc::now())
        .bind(certificate_id)
        .execute(&self.db)
        .await?;

        Self::expect_updated(result.rows_affected(), certificate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{certificate::Metadata, db};
    use chrono::NaiveDate;

    async fn setup_store() -> SqliteCertificateStore {
        let pool = db::test_pool().await;
        sqlx::query(
            "INSERT INTO account (id, name, email, password_hash, role, approval_status, is_active, created_at)
             VALUES ('issuer-1', 'Issuer', 'issuer@example.com', 'x', 'issuer', 'approved', 1, ?1),
                    ('issuer-2', 'Other', 'other@example.com', 'x', 'issuer', 'approved', 1, ?1)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        SqliteCertificateStore::new(pool)
    }

    fn certificate(id: &str, token: &str, issuer_id: &str) -> Certificate {
        let now = Utc::now();
        Certificate {
            certificate_id: id.to_string(),
            verification_token: token.to_string(),
            recipient_name: "Alice".to_string(),
            recipient_email: None,
            course_name: "Algorithms 101".to_string(),
            issued_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            valid_until: None,
            issuer_id: issuer_id.to_string(),
            metadata: Metadata::default(),
            content_hash: None,
            ledger_tx_hash: None,
            ledger_block_number: None,
            ledger_gas_used: None,
            ledger_revoke_tx_hash: None,
            student_hash: None,
            status: CertificateStatus::Valid,
            revoke_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = setup_store().await;
        let cert = certificate("CERT-0001", "token-1", "issuer-1");
        store.insert(&cert).await.unwrap();

        let by_id = store.find_by_certificate_id("CERT-0001").await.unwrap().unwrap();
        assert_eq!(by_id.verification_token, "token-1");
        assert_eq!(by_id.issued_on, cert.issued_on);

        let by_token = store.find_by_token("token-1").await.unwrap().unwrap();
        assert_eq!(by_token.certificate_id, "CERT-0001");

        assert!(store.find_by_token("nope").await.unwrap().is_none());
        assert!(store
            .find_for_issuer("CERT-0001", "issuer-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_or_token_conflicts() {
        let store = setup_store().await;
        store
            .insert(&certificate("CERT-0001", "token-1", "issuer-1"))
            .await
            .unwrap();

        assert!(matches!(
            store.insert(&certificate("CERT-0001", "token-2", "issuer-1")).await,
            Err(CertError::Conflict(_))
        ));
        assert!(matches!(
            store.insert(&certificate("CERT-0002", "token-1", "issuer-1")).await,
            Err(CertError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_receipt_backfill() {
        let store = setup_store().await;
        store
            .insert(&certificate("CERT-0001", "token-1", "issuer-1"))
            .await
            .unwrap();

        let receipt = LedgerReceipt {
            tx_hash: "0xabc".to_string(),
            block_number: Some(42),
            gas_used: Some("21000".to_string()),
        };
        store.record_ledger_receipt("CERT-0001", &receipt).await.unwrap();

        let cert = store.find_by_certificate_id("CERT-0001").await.unwrap().unwrap();
        assert!(cert.was_issued_on_ledger());
        assert_eq!(cert.ledger_block_number, Some(42));

        assert!(matches!(
            store.record_ledger_receipt("CERT-404", &receipt).await,
            Err(CertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_revoked_is_one_way() {
        let store = setup_store().await;
        store
            .insert(&certificate("CERT-0001", "token-1", "issuer-1"))
            .await
            .unwrap();

        assert!(store.mark_revoked("CERT-0001", "duplicate").await.unwrap());
        assert!(!store.mark_revoked("CERT-0001", "again").await.unwrap());

        let cert = store.find_by_certificate_id("CERT-0001").await.unwrap().unwrap();
        assert_eq!(cert.status, CertificateStatus::Revoked);
        assert_eq!(cert.revoke_reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn test_list_by_issuer_scopes_results() {
        let store = setup_store().await;
        store
            .insert(&certificate("CERT-0001", "token-1", "issuer-1"))
            .await
            .unwrap();
        store
            .insert(&certificate("CERT-0002", "token-2", "issuer-1"))
            .await
            .unwrap();
        store
            .insert(&certificate("CERT-0003", "token-3", "issuer-2"))
            .await
            .unwrap();

        assert_eq!(store.list_by_issuer("issuer-1").await.unwrap().len(), 2);
        assert_eq!(store.list_by_issuer("issuer-2").await.unwrap().len(), 1);
    }
}
