//! Service configuration.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::gateway::GatewayKind;

/// Default public domain used for return URLs and customer emails.
pub const DEFAULT_DOMAIN: &str = "shiroine.my.id";

const TRIPAY_PRODUCTION_URL: &str = "https://tripay.co.id/api";
const TRIPAY_SANDBOX_URL: &str = "https://tripay.co.id/api-sandbox";
const ISKAPAY_URL: &str = "https://wallet.iskapay.com/api";
const PAKASIR_URL: &str = "https://app.pakasir.com";

/// Directories searched, in order, for `<provider>.json` credential files.
const SECRETS_DIRS: [&str; 3] = [".secrets", "backend/.secrets", "../.secrets"];

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:3001").
    pub listen_addr: String,

    /// Database connection settings. `None` runs on the in-memory store.
    pub database: Option<DatabaseConfig>,

    /// Active payment provider.
    pub payment_gateway: GatewayKind,

    /// Public domain (default: "shiroine.my.id").
    pub domain: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Outbound provider call timeout in seconds.
    pub provider_timeout_seconds: u64,

    /// Requests a client may burst before being throttled.
    pub rate_limit_burst: u32,

    /// Seconds to regain one request token.
    pub rate_limit_refill_seconds: u64,

    /// Tripay credentials.
    pub tripay: TripayConfig,

    /// Iskapay credentials.
    pub iskapay: IskapayConfig,

    /// Pakasir credentials.
    pub pakasir: PakasirConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// A full connection URL (`DATABASE_URL`).
    Url(String),

    /// Individual `DB_*` settings.
    Parts {
        /// Host name.
        host: String,
        /// Port.
        port: u16,
        /// User name.
        user: String,
        /// Password.
        password: String,
        /// Database name.
        name: String,
        /// `sslmode` value (`disable`, `require`, ...).
        ssl_mode: String,
    },
}

impl DatabaseConfig {
    /// Connection options for sqlx.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or the ssl mode cannot be parsed.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match self {
            Self::Url(url) => url.parse(),
            Self::Parts {
                host,
                port,
                user,
                password,
                name,
                ssl_mode,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(name)
                .ssl_mode(PgSslMode::from_str(ssl_mode)?)),
        }
    }
}

/// Tripay settings.
#[derive(Debug, Clone, Default)]
pub struct TripayConfig {
    /// API key (Bearer token).
    pub api_key: Option<String>,
    /// Private key for HMAC signatures.
    pub private_key: Option<String>,
    /// Merchant code.
    pub merchant_code: Option<String>,
    /// `production` or `sandbox`.
    pub mode: String,
    /// Base URL override.
    pub api_url: Option<String>,
}

impl TripayConfig {
    /// Base URL for the configured mode.
    #[must_use]
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.api_url {
            return url.trim_end_matches('/').to_string();
        }
        if self.mode == "production" {
            TRIPAY_PRODUCTION_URL.into()
        } else {
            TRIPAY_SANDBOX_URL.into()
        }
    }
}

/// Iskapay settings.
#[derive(Debug, Clone, Default)]
pub struct IskapayConfig {
    /// API key (Bearer token).
    pub api_key: Option<String>,
    /// Base URL override.
    pub api_url: Option<String>,
}

impl IskapayConfig {
    /// Base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.api_url
            .as_deref()
            .unwrap_or(ISKAPAY_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Pakasir settings.
#[derive(Debug, Clone, Default)]
pub struct PakasirConfig {
    /// API key.
    pub api_key: Option<String>,
    /// Project slug.
    pub slug: Option<String>,
    /// Base URL override.
    pub api_url: Option<String>,
}

impl PakasirConfig {
    /// Base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.api_url
            .as_deref()
            .unwrap_or(PAKASIR_URL)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Credentials read from a `.secrets/<provider>.json` file.
///
/// One shape serves every provider; keys a provider has no use for are
/// ignored. A key present in the file replaces the environment value, an
/// absent key leaves it alone.
#[derive(Debug, Deserialize)]
struct ProviderSecrets {
    api_key: Option<String>,
    private_key: Option<String>,
    merchant_code: Option<String>,
    slug: Option<String>,
    mode: Option<String>,
    api_url: Option<String>,
}

impl ProviderSecrets {
    /// Read `<dir>/<provider>.json` from the first directory that has one.
    fn find(dirs: &[&Path], provider: GatewayKind) -> Option<Self> {
        for dir in dirs {
            let path = dir.join(format!("{provider}.json"));
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable secrets file");
                    continue;
                }
            };
            match serde_json::from_str(&contents) {
                Ok(secrets) => {
                    tracing::info!(path = %path.display(), %provider, "Loaded provider secrets from file");
                    return Some(secrets);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Malformed secrets file");
                }
            }
        }

        tracing::debug!(%provider, "No secrets file, using environment variables");
        None
    }

    fn apply_to_tripay(self, tripay: &mut TripayConfig) {
        overlay(&mut tripay.api_key, self.api_key);
        overlay(&mut tripay.private_key, self.private_key);
        overlay(&mut tripay.merchant_code, self.merchant_code);
        overlay(&mut tripay.api_url, self.api_url);
        if let Some(mode) = self.mode.filter(|m| !m.trim().is_empty()) {
            tripay.mode = mode;
        }
    }

    fn apply_to_iskapay(self, iskapay: &mut IskapayConfig) {
        overlay(&mut iskapay.api_key, self.api_key);
        overlay(&mut iskapay.api_url, self.api_url);
    }

    fn apply_to_pakasir(self, pakasir: &mut PakasirConfig) {
        overlay(&mut pakasir.api_key, self.api_key);
        overlay(&mut pakasir.slug, self.slug);
        overlay(&mut pakasir.api_url, self.api_url);
    }
}

fn overlay(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *target = Some(value);
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.apply_secrets(&SECRETS_DIRS.map(Path::new));
        config
    }

    /// Overlay provider credentials from `<dir>/<provider>.json` files.
    ///
    /// Fields set in a file win over the environment; fields the file omits
    /// keep their current value.
    pub fn apply_secrets(&mut self, dirs: &[&Path]) {
        if let Some(secrets) = ProviderSecrets::find(dirs, GatewayKind::Tripay) {
            secrets.apply_to_tripay(&mut self.tripay);
        }
        if let Some(secrets) = ProviderSecrets::find(dirs, GatewayKind::Iskapay) {
            secrets.apply_to_iskapay(&mut self.iskapay);
        }
        if let Some(secrets) = ProviderSecrets::find(dirs, GatewayKind::Pakasir) {
            secrets.apply_to_pakasir(&mut self.pakasir);
        }
    }

    /// Build configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = get("LISTEN_ADDR")
            .or_else(|| get("PORT").map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or_else(|| "0.0.0.0:3001".into());

        let payment_gateway = get("PAYMENT_GATEWAY").map_or(GatewayKind::Tripay, |raw| {
            raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Unknown PAYMENT_GATEWAY, falling back to tripay");
                GatewayKind::Tripay
            })
        });

        let cors_origins = get("FRONTEND_URL")
            .map(|url| vec![url])
            .or_else(|| {
                get("CORS_ORIGINS")
                    .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".into(),
                    "http://127.0.0.1:3000".into(),
                ]
            });

        let database = get("DATABASE_URL").map(DatabaseConfig::Url).or_else(|| {
            get("DB_HOST").map(|host| DatabaseConfig::Parts {
                host,
                port: parse_var(&get, "DB_PORT", 5432),
                user: get("DB_USER").unwrap_or_else(|| "postgres".into()),
                password: get("DB_PASSWORD").unwrap_or_default(),
                name: get("DB_NAME").unwrap_or_else(|| "shiroine".into()),
                ssl_mode: get("DB_SSLMODE").unwrap_or_else(|| "disable".into()),
            })
        });

        Self {
            listen_addr,
            database,
            payment_gateway,
            domain: get("DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.into()),
            cors_origins,
            max_body_bytes: parse_var(&get, "MAX_BODY_BYTES", 1024 * 1024),
            request_timeout_seconds: parse_var(&get, "REQUEST_TIMEOUT_SECONDS", 30),
            provider_timeout_seconds: parse_var(&get, "PROVIDER_TIMEOUT_SECONDS", 30),
            rate_limit_burst: parse_var(&get, "RATE_LIMIT_BURST", 100),
            rate_limit_refill_seconds: parse_var(&get, "RATE_LIMIT_REFILL_SECONDS", 9),
            tripay: TripayConfig {
                api_key: get("TRIPAY_API_KEY"),
                private_key: get("TRIPAY_PRIVATE_KEY"),
                merchant_code: get("TRIPAY_MERCHANT_CODE"),
                mode: get("TRIPAY_MODE").unwrap_or_else(|| "sandbox".into()),
                api_url: get("TRIPAY_API_URL"),
            },
            iskapay: IskapayConfig {
                api_key: get("ISKAPAY_API_KEY"),
                api_url: get("ISKAPAY_API_URL"),
            },
            pakasir: PakasirConfig {
                api_key: get("PAKASIR_API_KEY"),
                slug: get("PAKASIR_SLUG"),
                api_url: get("PAKASIR_API_URL"),
            },
        }
    }

    /// Build configuration from a map, for tests and tools.
    #[must_use]
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
