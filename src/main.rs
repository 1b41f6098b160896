/// CertVerify - certificate issuance and verification service
///
/// Issues certificates, anchors them on an external ledger and a
/// content-addressed store when those are configured, and combines the
/// database record, content hash and ledger attestation into a verdict.

mod account;
mod api;
mod auth;
mod certificate;
mod config;
mod content;
mod context;
mod db;
mod degraded;
mod error;
mod issuance;
mod ledger;
mod mailer;
mod metrics;
mod rate_limit;
mod revocation;
mod server;
mod verification;

use config::ServerConfig;
use context::AppContext;
use error::CertResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> CertResult<()> {
    // Load configuration (also reads .env)
    let config = ServerConfig::from_env()?;

    // Initialize logging; RUST_LOG wins over the configured level
    let default_filter = format!(
        "certverify={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______          __ _    __          _ ____
  / ____/__  _____/ /| |  / /__  _____(_) __/_  __
 / /   / _ \/ ___/ __/ | / / _ \/ ___/ / /_/ / / /
/ /___/  __/ /  / /_ | |/ /  __/ /  / / __/ /_/ /
\____/\___/_/   \__/ |___/\___/_/  /_/_/  \__, /
                                         /____/
        Certificate Verification Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
