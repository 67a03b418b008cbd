// Command-line entry point for auth-relay

use anyhow::{bail, Context};
use auth_relay::config::Config;
use auth_relay::core::crypto::{EncryptedCredential, EncryptionService};
use auth_relay::core::errors::CryptoError;
use auth_relay::state::build_token_cache;
use auth_relay::CorrelationId;
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, Secret, SecretString};
use std::num::NonZeroU32;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "auth-relay", version, about = "Encrypted credential tooling and token cache checks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encrypt a credential. Reads the credential, then the passphrase, one per line from stdin
    Seal,
    /// Check that a passphrase opens a sealed credential. Reads the passphrase from stdin
    Open {
        /// Base64 blob produced by `seal`
        #[arg(long)]
        blob: String,
        /// Print the decrypted credential
        #[arg(long)]
        reveal: bool,
    },
    /// Connect to the configured cache and run a set/get/remove round trip
    PingCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging exists
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config).map_err(|e| anyhow::anyhow!(e))?;

    let iterations = NonZeroU32::new(config.pbkdf2_iterations).context("PBKDF2_ITERATIONS must be greater than 0")?;
    let encryption = EncryptionService::with_iterations(iterations);

    match cli.command {
        Command::Seal => seal(&encryption).await,
        Command::Open { blob, reveal } => open(&encryption, &blob, reveal).await,
        Command::PingCache => ping_cache(&config).await,
    }
}

async fn seal(encryption: &EncryptionService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let credential = read_secret_line(&mut lines, "credential").await?;
    let passphrase = read_secret_line(&mut lines, "passphrase").await?;

    let sealed = encryption.encrypt_async(credential, passphrase).await?;
    info!(bytes = sealed.len(), "Credential sealed");
    println!("{}", sealed.to_base64());
    Ok(())
}

async fn open(encryption: &EncryptionService, blob: &str, reveal: bool) -> anyhow::Result<()> {
    let credential = EncryptedCredential::from_base64(blob.trim())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let passphrase = read_secret_line(&mut lines, "passphrase").await?;

    match encryption.decrypt_async(credential, passphrase).await {
        Ok(plaintext) => {
            if reveal {
                println!("{}", plaintext.expose_secret());
            } else {
                println!("ok");
            }
            Ok(())
        }
        Err(CryptoError::AuthenticationTagMismatch) => bail!("Invalid passphrase or tampered credential"),
        Err(e) => Err(e.into()),
    }
}

async fn ping_cache(config: &Config) -> anyhow::Result<()> {
    let cache = build_token_cache(config)
        .await
        .with_context(|| format!("Failed to connect to {} cache", config.cache_backend))?;
    cache.ping().await.context("Cache ping failed")?;

    let key = format!("auth-relay:ping:{}", CorrelationId::generate().short());
    let sample = "pong".to_string();

    cache.set(&key, &sample, config.token_cache_ttl()).await?;
    let read_back: Option<String> = cache.get(&key).await?;
    cache.remove(&key).await?;

    if read_back.as_deref() != Some(sample.as_str()) {
        error!(key = %key, "Cache round trip returned unexpected value");
        bail!("Cache round trip failed for key {}", key);
    }

    info!(backend = %config.cache_backend, "Cache round trip succeeded");
    println!("ok");
    Ok(())
}

async fn read_secret_line(lines: &mut Lines<BufReader<Stdin>>, what: &str) -> anyhow::Result<SecretString> {
    let line = lines
        .next_line()
        .await?
        .with_context(|| format!("Expected {} on stdin", what))?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    if trimmed.is_empty() {
        bail!("Empty {} on stdin", what);
    }
    Ok(Secret::new(trimmed))
}

/// Initialize tracing subscriber
///
/// Logs go to stderr; stdout carries command output only.
fn init_tracing(config: &Config) -> Result<(), String> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    parse_log_level(&config.log_level)?;

    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<tracing::Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        _ => Err(format!("Invalid log level: {}", level)),
    }
}
