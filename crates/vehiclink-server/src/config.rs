use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use vehiclink_api::otp::CodeSource;

pub const DEFAULT_DEMO_CODE: &str = "123456";

/// Upper bound for `VEHICLINK_OTP_TTL_SECS` (one week).
pub const MAX_OTP_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub otp_ttl: Duration,
    pub otp_source: CodeSource,
    pub otp_cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = get("VEHICLINK_DB_PATH").unwrap_or_else(|| "vehiclink.db".into());
        let host = get("VEHICLINK_HOST").unwrap_or_else(|| "0.0.0.0".into());

        // VEHICLINK_PORT wins over the platform-provided PORT
        let port: u16 = match get("VEHICLINK_PORT").or_else(|| get("PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid port '{}'", raw))?,
            None => 3000,
        };

        let otp_ttl_secs: u64 = parse_or(&get, "VEHICLINK_OTP_TTL_SECS", 600)?;
        if otp_ttl_secs > MAX_OTP_TTL_SECS {
            bail!(
                "VEHICLINK_OTP_TTL_SECS must be at most {}, got {}",
                MAX_OTP_TTL_SECS,
                otp_ttl_secs
            );
        }
        let otp_cleanup_interval_secs: u64 = parse_or(&get, "VEHICLINK_OTP_CLEANUP_SECS", 60)?;
        if otp_cleanup_interval_secs == 0 {
            bail!("VEHICLINK_OTP_CLEANUP_SECS must be greater than zero");
        }

        // Empty means "generate random codes"
        let otp_source = match get("VEHICLINK_OTP_DEMO_CODE") {
            None => CodeSource::Fixed(DEFAULT_DEMO_CODE.to_string()),
            Some(code) if code.trim().is_empty() => CodeSource::Random,
            Some(code) => CodeSource::Fixed(code.trim().to_string()),
        };

        Ok(Self {
            db_path: PathBuf::from(db_path),
            host,
            port,
            otp_ttl: Duration::from_secs(otp_ttl_secs),
            otp_source,
            otp_cleanup_interval_secs,
        })
    }
}

fn parse_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, raw)),
        None => Ok(default),
    }
}
