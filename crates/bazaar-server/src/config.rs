use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BAZAAR_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("Invalid {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("BAZAAR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        Ok(Config {
            host: lookup("BAZAAR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "BAZAAR_PORT", 3000)?,
            db_path: lookup("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into()).into(),
            jwt_secret,
            request_timeout: Duration::from_secs(parse(&lookup, "BAZAAR_REQUEST_TIMEOUT_SECS", 30)?),
            max_upload_bytes: parse(&lookup, "BAZAAR_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr<Err = ParseIntError>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|source| ConfigError::Invalid { name, source }),
        None => Ok(default),
    }
}
