/// Application context and dependency injection
use crate::{
    account::AccountManager,
    certificate::{CertificateStore, SqliteCertificateStore},
    config::ServerConfig,
    content::{ContentStore, DisabledContentStore, PinataContentStore},
    db,
    error::{CertError, CertResult},
    issuance::IssuanceWorkflow,
    ledger::{DisabledLedger, HttpLedgerClient, LedgerClient},
    mailer::{Mailer, Notifier},
    rate_limit::RateLimiter,
    revocation::RevocationWorkflow,
    verification::TrustComposer,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub certificates: Arc<dyn CertificateStore>,
    // Core workflows
    pub trust: Arc<TrustComposer>,
    pub issuance: Arc<IssuanceWorkflow>,
    pub revocation: Arc<RevocationWorkflow>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CertResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let ledger: Arc<dyn LedgerClient> = match &config.ledger {
            Some(ledger_config) => {
                tracing::info!("Ledger gateway: {}", ledger_config.base_url);
                Arc::new(HttpLedgerClient::new(ledger_config)?)
            }
            None => {
                tracing::warn!("No ledger configured - certificates will not be anchored");
                Arc::new(DisabledLedger)
            }
        };

        let content: Arc<dyn ContentStore> = match &config.content_store {
            Some(content_config) => Arc::new(PinataContentStore::new(content_config.clone())?),
            None => {
                tracing::info!("Content store disabled - certificates will not be pinned");
                Arc::new(DisabledContentStore)
            }
        };

        let mailer = Mailer::new(config.email.clone())?;
        if !mailer.is_configured() {
            tracing::info!("Email disabled - certificate notices will be skipped");
        }
        let notifier: Arc<dyn Notifier> = Arc::new(mailer);

        Ok(Self::with_collaborators(config, db, ledger, content, notifier))
    }

    /// Wire the services around an already-migrated pool and explicit collaborators
    pub fn with_collaborators(
        config: ServerConfig,
        db: SqlitePool,
        ledger: Arc<dyn LedgerClient>,
        content: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let certificates: Arc<dyn CertificateStore> =
            Arc::new(SqliteCertificateStore::new(db.clone()));

        let trust = Arc::new(TrustComposer::new(
            certificates.clone(),
            ledger.clone(),
            config.verification.clone(),
        ));
        let issuance = Arc::new(IssuanceWorkflow::new(
            certificates.clone(),
            ledger.clone(),
            content,
            notifier,
            config.service.public_url.clone(),
        ));
        let revocation = Arc::new(RevocationWorkflow::new(certificates.clone(), ledger));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config,
            db,
            account_manager,
            certificates,
            trust,
            issuance,
            revocation,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> CertResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                CertError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }

    /// Verification link for a token
    pub fn verify_url(&self, token: &str) -> String {
        crate::certificate::verify_url(&self.config.service.public_url, token)
    }
}
