/// Account manager implementation using runtime queries
/// This version uses sqlx runtime query building instead of compile-time macros
/// to avoid needing DATABASE_URL during compilation

use crate::{
    account::{
        approval::{self, ApprovalAction, ApprovalStatus},
        TokenClaims,
    },
    config::ServerConfig,
    db::account::{Account, Role},
    error::{CertError, CertResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Create a new account
    ///
    /// Issuers start in `pending` with `access_requested_at` set; everyone
    /// else starts in `none`.
    pub async fn create_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        organization: Option<String>,
    ) -> CertResult<Account> {
        let email = email.trim().to_lowercase();

        if self.email_exists(&email).await? {
            return Err(CertError::Conflict("Email already in use".to_string()));
        }

        let password_hash = Self::hash_password(password)?;
        let now = Utc::now();
        let (approval_status, access_requested_at) = if role == Role::Issuer {
            (ApprovalStatus::Pending, Some(now))
        } else {
            (ApprovalStatus::None, None)
        };

        let account = Account {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            password_hash,
            role,
            organization,
            approval_status,
            access_requested_at,
            approved_at: None,
            last_login_at: None,
            is_active: true,
            created_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO account (id, name, email, password_hash, role, organization,
                                  approval_status, access_requested_at, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.organization)
        .bind(account.approval_status.as_str())
        .bind(account.access_requested_at)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CertError::Conflict("Email already in use".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        crate::metrics::record_account_creation(account.role.as_str());
        tracing::info!(
            account_id = %account.id,
            role = account.role.as_str(),
            "Account created"
        );

        Ok(account)
    }

    /// Create an admin account after checking the configured admin secret
    pub async fn create_admin_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        organization: Option<String>,
        admin_secret: &str,
    ) -> CertResult<Account> {
        let expected = self
            .config
            .authentication
            .admin_secret
            .as_deref()
            .ok_or_else(|| CertError::Authorization("Admin signup is disabled".to_string()))?;

        if admin_secret != expected {
            return Err(CertError::Authorization("Invalid admin secret key".to_string()));
        }

        self.create_account(name, email, password, Role::Admin, organization)
            .await
    }

    /// Authenticate account and issue a bearer token
    pub async fn login(&self, email: &str, password: &str) -> CertResult<(Account, String)> {
        let account = self
            .get_account_by_email(email)
            .await
            .map_err(|_| CertError::Authentication("Invalid credentials".to_string()))?;

        if !Self::verify_password(password, &account.password_hash)? {
            return Err(CertError::Authentication("Invalid credentials".to_string()));
        }

        if !account.is_active {
            return Err(CertError::Authorization("Account is deactivated".to_string()));
        }

        let now = Utc::now();
        sqlx::query("UPDATE account SET last_login_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(&account.id)
            .execute(&self.db)
            .await?;

        let token = self.issue_token(&account)?;
        let account = Account {
            last_login_at: Some(now),
            ..account
        };

        Ok((account, token))
    }

    /// Generate a signed bearer token for an account
    pub fn issue_token(&self, account: &Account) -> CertResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: account.id.clone(),
            role: account.role,
            email: account.email.clone(),
            iat: now,
            exp: now + self.config.authentication.jwt_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| CertError::Jwt(format!("Failed to generate token: {}", e)))
    }

    /// Validate a bearer token and load the active account behind it
    pub async fn authenticate_token(&self, token: &str) -> CertResult<Account> {
        use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

        let decoding_key =
            DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes());
        let claims = decode::<TokenClaims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                tracing::debug!("Token verification failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        CertError::Authentication("Token has expired".to_string())
                    }
                    _ => CertError::Authentication("Invalid token".to_string()),
                }
            })?
            .claims;

        let account = self
            .get_account(&claims.sub)
            .await
            .map_err(|_| CertError::Authentication("Unknown account".to_string()))?;

        if !account.is_active {
            return Err(CertError::Authorization("Account is deactivated".to_string()));
        }

        Ok(account)
    }

    /// Get account by ID
    pub async fn get_account(&self, id: &str) -> CertResult<Account> {
        let row = sqlx::query(&format!("SELECT {} FROM account WHERE id = ?1", Account::COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| CertError::NotFound("User not found".to_string()))?;

        Account::from_row(&row)
    }

    /// Get account by email (case-insensitive)
    pub async fn get_account_by_email(&self, email: &str) -> CertResult<Account> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM account WHERE email = ?1",
            Account::COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| CertError::NotFound("User not found".to_string()))?;

        Account::from_row(&row)
    }

    /// Check if email exists
    async fn email_exists(&self, email: &str) -> CertResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// List all accounts, oldest first
    pub async fn list_accounts(&self) -> CertResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM account ORDER BY created_at",
            Account::COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Account::from_row).collect()
    }

    /// Change an account's role
    pub async fn update_role(&self, id: &str, role: Role) -> CertResult<Account> {
        let result = sqlx::query("UPDATE account SET role = ?1 WHERE id = ?2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CertError::NotFound("User not found".to_string()));
        }

        self.get_account(id).await
    }

    /// Activate or deactivate an account
    pub async fn set_active(&self, id: &str, is_active: bool) -> CertResult<Account> {
        let result = sqlx::query("UPDATE account SET is_active = ?1 WHERE id = ?2")
            .bind(is_active)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CertError::NotFound("User not found".to_string()));
        }

        self.get_account(id).await
    }

    /// Apply an approval action to `subject_id` on behalf of `actor`
    ///
    /// The update is conditional on the state the transition was computed
    /// from, so two admins deciding the same request cannot both win.
    pub async fn apply_approval(
        &self,
        actor: &Account,
        subject_id: &str,
        action: ApprovalAction,
    ) -> CertResult<Account> {
        let subject = if actor.id == subject_id {
            actor.clone()
        } else {
            self.get_account(subject_id).await?
        };

        let next = approval::transition(actor, &subject, action)?;
        let now = Utc::now();

        let result = match action {
            ApprovalAction::Request => sqlx::query(
                "UPDATE account SET approval_status = ?1, access_requested_at = ?2
                 WHERE id = ?3 AND approval_status = ?4",
            )
            .bind(next.as_str())
            .bind(now)
            .bind(&subject.id)
            .bind(subject.approval_status.as_str()),
            ApprovalAction::Approve => sqlx::query(
                "UPDATE account SET approval_status = ?1, approved_at = ?2
                 WHERE id = ?3 AND approval_status = ?4",
            )
            .bind(next.as_str())
            .bind(now)
            .bind(&subject.id)
            .bind(subject.approval_status.as_str()),
            ApprovalAction::Reject => sqlx::query(
                "UPDATE account SET approval_status = ?1
                 WHERE id = ?2 AND approval_status = ?3",
            )
            .bind(next.as_str())
            .bind(&subject.id)
            .bind(subject.approval_status.as_str()),
        }
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CertError::InvalidTransition(
                "approval status changed concurrently".to_string(),
            ));
        }

        crate::metrics::record_approval_transition(action.as_str());
        tracing::info!(
            actor = %actor.id,
            subject = %subject.id,
            action = action.as_str(),
            from = subject.approval_status.as_str(),
            to = next.as_str(),
            "Approval status changed"
        );

        self.get_account(&subject.id).await
    }

    fn hash_password(password: &str) -> CertResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CertError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify_password(password: &str, hash: &str) -> CertResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CertError::Internal(format!("Stored password hash is invalid: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn create_test_manager() -> AccountManager {
        let db = db::test_pool().await;
        AccountManager::new(db, Arc::new(ServerConfig::for_tests()))
    }

    #[tokio::test]
    async fn test_signup_sets_initial_approval_state() {
        let manager = create_test_manager().await;

        let issuer = manager
            .create_account("Ivy", "ivy@example.com", "password1", Role::Issuer, None)
            .await
            .unwrap();
        assert_eq!(issuer.approval_status, ApprovalStatus::Pending);
        assert!(issuer.access_requested_at.is_some());

        let verifier = manager
            .create_account("Vic", "vic@example.com", "password1", Role::Verifier, None)
            .await
            .unwrap();
        assert_eq!(verifier.approval_status, ApprovalStatus::None);
        assert!(verifier.access_requested_at.is_none());
    }

    #[tokio::test]
    async fn test_email_is_case_insensitive_and_unique() {
        let manager = create_test_manager().await;

        manager
            .create_account("Ann", "Ann@Example.com", "password1", Role::Verifier, None)
            .await
            .unwrap();

        let dup = manager
            .create_account("Ann 2", "ann@example.COM", "password1", Role::Verifier, None)
            .await;
        assert!(matches!(dup, Err(CertError::Conflict(_))));

        let found = manager.get_account_by_email("ANN@example.com").await.unwrap();
        assert_eq!(found.email, "ann@example.com");
    }

    #[tokio::test]
    async fn test_login_and_token_round_trip() {
        let manager = create_test_manager().await;
        let created = manager
            .create_account("Bob", "bob@example.com", "hunter22", Role::Verifier, None)
            .await
            .unwrap();

        assert!(matches!(
            manager.login("bob@example.com", "wrong-password").await,
            Err(CertError::Authentication(_))
        ));

        let (account, token) = manager.login("bob@example.com", "hunter22").await.unwrap();
        assert_eq!(account.id, created.id);
        assert!(account.last_login_at.is_some());

        let authed = manager.authenticate_token(&token).await.unwrap();
        assert_eq!(authed.id, created.id);

        assert!(manager.authenticate_token("not-a-token").await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_account_is_refused() {
        let manager = create_test_manager().await;
        let created = manager
            .create_account("Cy", "cy@example.com", "hunter22", Role::Verifier, None)
            .await
            .unwrap();
        let token = manager.issue_token(&created).unwrap();

        manager.set_active(&created.id, false).await.unwrap();

        assert!(matches!(
            manager.authenticate_token(&token).await,
            Err(CertError::Authorization(_))
        ));
        assert!(matches!(
            manager.login("cy@example.com", "hunter22").await,
            Err(CertError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_signup_requires_secret() {
        let manager = create_test_manager().await;

        let refused = manager
            .create_admin_account("Root", "root@example.com", "password1", None, "guess")
            .await;
        assert!(matches!(refused, Err(CertError::Authorization(_))));

        let admin = manager
            .create_admin_account("Root", "root@example.com", "password1", None, "let-me-in")
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.can_issue());
    }

    #[tokio::test]
    async fn test_approval_lifecycle() {
        let manager = create_test_manager().await;
        let admin = manager
            .create_admin_account("Root", "root@example.com", "password1", None, "let-me-in")
            .await
            .unwrap();
        let issuer = manager
            .create_account("Ivy", "ivy@example.com", "password1", Role::Issuer, None)
            .await
            .unwrap();
        assert!(!issuer.can_issue());

        let rejected = manager
            .apply_approval(&admin, &issuer.id, ApprovalAction::Reject)
            .await
            .unwrap();
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);

        let pending = manager
            .apply_approval(&rejected, &issuer.id, ApprovalAction::Request)
            .await
            .unwrap();
        assert_eq!(pending.approval_status, ApprovalStatus::Pending);

        let approved = manager
            .apply_approval(&admin, &issuer.id, ApprovalAction::Approve)
            .await
            .unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert!(approved.approved_at.is_some());
        assert!(approved.can_issue());

        let rerequested = manager
            .apply_approval(&approved, &issuer.id, ApprovalAction::Request)
            .await
            .unwrap();
        assert_eq!(rerequested.approval_status, ApprovalStatus::Pending);
        assert!(!rerequested.can_issue());
    }

    #[tokio::test]
    async fn test_role_update_and_listing() {
        let manager = create_test_manager().await;
        let created = manager
            .create_account("Dee", "dee@example.com", "password1", Role::Verifier, None)
            .await
            .unwrap();

        let updated = manager.update_role(&created.id, Role::Issuer).await.unwrap();
        assert_eq!(updated.role, Role::Issuer);

        assert!(matches!(
            manager.update_role("missing", Role::Issuer).await,
            Err(CertError::NotFound(_))
        ));

        assert_eq!(manager.list_accounts().await.unwrap().len(), 1);
    }
}
