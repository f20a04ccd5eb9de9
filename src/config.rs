use dotenvy::dotenv;
use eyre::{eyre, Result};
use secrecy::SecretString;
use std::{env, fmt::Display, str::FromStr, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Config {
    pub stripe: StripeConfig,
    pub server: ServerConfig,
    pub report: ReportConfig,
}

/// Upstream API settings. The secret never appears in `Debug` output.
#[derive(Debug)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Accounts fetched at once. 1 keeps the sequential account loop.
    pub account_concurrency: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_range_days: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            account_concurrency: 1,
            default_page_size: 25,
            max_page_size: 500,
            max_range_days: 366,
        }
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok();

    let secret_key = env::var("STRIPE_SECRET_KEY")
        .or_else(|_| env::var("STRIPE_API_KEY"))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| eyre!("STRIPE_SECRET_KEY is not set"))?;

    let api_base = env::var("STRIPE_API_BASE")
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://api.stripe.com".to_string());

    let stripe = StripeConfig {
        secret_key: SecretString::from(secret_key),
        api_base,
        timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 15)),
        max_retries: env_or("MAX_RETRIES", 3),
        retry_backoff: Duration::from_millis(env_or("RETRY_BACKOFF_MS", 1000)),
    };

    let server = ServerConfig {
        port: env_or("PORT", 8080),
    };

    let defaults = ReportConfig::default();
    let report = ReportConfig {
        account_concurrency: env_or("ACCOUNT_CONCURRENCY", defaults.account_concurrency).max(1),
        default_page_size: env_or("DEFAULT_PAGE_SIZE", defaults.default_page_size).max(1),
        max_page_size: env_or("MAX_PAGE_SIZE", defaults.max_page_size).max(1),
        max_range_days: env_or("MAX_RANGE_DAYS", defaults.max_range_days).max(1),
    };

    let cfg = Config {
        stripe,
        server,
        report,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

/// Reads `key` from the environment, keeping `default` when unset or unparseable.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring {}={:?} ({}); using {}", key, raw, e, default);
                default
            }
        },
        Err(_) => default,
    }
}
