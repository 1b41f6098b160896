/// Configuration management for CertVerify
use crate::error::{CertError, CertResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub ledger: Option<LedgerConfig>,
    pub content_store: Option<ContentStoreConfig>,
    pub verification: VerificationConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL embedded in verification links
    pub public_url: String,
    /// Allowed CORS origin for the web UI
    pub frontend_origin: Option<String>,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    /// Secret gating admin signup; admin signup is disabled when unset
    pub admin_secret: Option<String>,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Ledger gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Content-addressed store (Pinata) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    pub api_url: String,
    pub api_key: String,
    pub secret_api_key: String,
    pub gateway_url: String,
}

/// Verification policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Lenient verification also accepts records with no ledger backing at all
    pub accept_unanchored: bool,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub anonymous_rps: u32,
    pub authenticated_rps: u32,
    pub admin_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anonymous_rps: 10,
            authenticated_rps: 100,
            admin_rps: 1000,
            burst_size: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CertResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CERT_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("CERT_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| CertError::Internal("Invalid port number".to_string()))?;
        let public_url = env::var("CERT_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port))
            .trim_end_matches('/')
            .to_string();
        let frontend_origin = env::var("CERT_FRONTEND_ORIGIN").ok();
        let version = env::var("CERT_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("CERT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("CERT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("certverify.sqlite"));

        let jwt_secret = env::var("CERT_JWT_SECRET")
            .map_err(|_| CertError::Internal("CERT_JWT_SECRET is required".to_string()))?;
        let jwt_ttl_secs = env_or("CERT_JWT_TTL_SECS", 7 * 24 * 3600);
        let admin_secret = env::var("CERT_ADMIN_SECRET").ok().filter(|s| !s.is_empty());

        let email = if let Ok(smtp_url) = env::var("CERT_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("CERT_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let ledger = env::var("CERT_LEDGER_URL").ok().map(|base_url| LedgerConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: env::var("CERT_LEDGER_API_KEY").ok(),
            timeout_secs: env_or("CERT_LEDGER_TIMEOUT_SECS", 30),
        });

        let content_store = match (
            env::var("CERT_PINATA_API_KEY"),
            env::var("CERT_PINATA_SECRET_API_KEY"),
        ) {
            (Ok(api_key), Ok(secret_api_key)) => Some(ContentStoreConfig {
                api_url: env::var("CERT_PINATA_API_URL")
                    .unwrap_or_else(|_| "https://api.pinata.cloud".to_string()),
                api_key,
                secret_api_key,
                gateway_url: env::var("CERT_IPFS_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://gateway.pinata.cloud".to_string()),
            }),
            _ => None,
        };

        let verification = VerificationConfig {
            accept_unanchored: env_or("CERT_ACCEPT_UNANCHORED", false),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_or("CERT_RATE_LIMITS_ENABLED", defaults.enabled),
            anonymous_rps: env_or("CERT_RATE_LIMIT_ANONYMOUS_RPS", defaults.anonymous_rps),
            authenticated_rps: env_or(
                "CERT_RATE_LIMIT_AUTHENTICATED_RPS",
                defaults.authenticated_rps,
            ),
            admin_rps: env_or("CERT_RATE_LIMIT_ADMIN_RPS", defaults.admin_rps),
            burst_size: env_or("CERT_RATE_LIMIT_BURST", defaults.burst_size),
        };

        let log_level = env::var("CERT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                frontend_origin,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                jwt_ttl_secs,
                admin_secret,
            },
            email,
            ledger,
            content_store,
            verification,
            rate_limit,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CertResult<()> {
        if self.service.hostname.is_empty() {
            return Err(CertError::Internal("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(CertError::Internal(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.jwt_ttl_secs <= 0 {
            return Err(CertError::Internal("JWT lifetime must be positive".to_string()));
        }

        Ok(())
    }

    /// Minimal configuration for unit tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 4000,
                public_url: "http://localhost:4000".to_string(),
                frontend_origin: None,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123".to_string(),
                jwt_ttl_secs: 3600,
                admin_secret: Some("let-me-in".to_string()),
            },
            email: None,
            ledger: None,
            content_store: None,
            verification: VerificationConfig::default(),
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = ServerConfig::for_tests();
        assert!(config.validate().is_ok());

        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_hostname() {
        let mut config = ServerConfig::for_tests();
        config.service.hostname.clear();
        assert!(config.validate().is_err());
    }
}
