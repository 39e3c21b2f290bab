use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::store::PgStoreOptions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Receive GitHub webhooks and serve the recent event feed
    Serve(ServeArgs),
    /// Delete every stored event
    Purge(StoreArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Webhook secret as configured on GitHub
    #[arg(short, long, env = "GITHUB_WEBHOOK_SECRET")]
    pub secret: Option<String>,

    /// Accept deliveries whose signature does not verify, logging each one.
    /// Only for local testing.
    #[arg(long, env = "WEBHOOK_SKIP_SIGNATURE", value_parser = BoolishValueParser::new())]
    pub insecure_skip_signature: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone)]
pub struct StoreArgs {
    /// PostgreSQL connection string; events are kept in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "20")]
    pub max_connections: u32,

    /// Upper bound on pool acquisition and on each database call
    #[arg(long, env = "DATABASE_TIMEOUT_SECS", default_value = "5")]
    pub db_timeout_secs: u64,
}

impl StoreArgs {
    pub fn pg_options(&self) -> Option<PgStoreOptions> {
        self.database_url.as_ref().map(|url| PgStoreOptions {
            database_url: url.clone(),
            max_connections: self.max_connections,
            timeout: Duration::from_secs(self.db_timeout_secs),
        })
    }
}

/// How `/webhook` treats `X-Hub-Signature-256`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureMode {
    /// Reject deliveries that do not verify against the secret.
    Enforce { secret: String },
    /// Accept everything; verification still runs and is logged when a
    /// secret is known.
    Bypass { secret: Option<String> },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "no webhook secret configured; set GITHUB_WEBHOOK_SECRET or pass \
     --insecure-skip-signature to accept unsigned deliveries"
)]
pub struct MissingSecret;

impl ServeArgs {
    /// Verification is required unless explicitly waived.
    pub fn signature_mode(&self) -> Result<SignatureMode, MissingSecret> {
        let secret = self.secret.clone().filter(|s| !s.is_empty());
        match (secret, self.insecure_skip_signature) {
            (secret, true) => Ok(SignatureMode::Bypass { secret }),
            (Some(secret), false) => Ok(SignatureMode::Enforce { secret }),
            (None, false) => Err(MissingSecret),
        }
    }
}
