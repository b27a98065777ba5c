use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};

use oselya_api::throttle::ThrottlePolicy;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_days: i64,
    pub throttle: ThrottlePolicy,
    pub sweep_secs: u64,
    pub staff_usernames: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("OSELYA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("OSELYA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let defaults = ThrottlePolicy::default();
        let throttle = ThrottlePolicy {
            max_attempts_per_ip: parsed(&get, "OSELYA_LOGIN_MAX_ATTEMPTS_PER_IP", defaults.max_attempts_per_ip)?,
            window_secs: parsed(&get, "OSELYA_LOGIN_WINDOW_SECS", defaults.window_secs)?,
            max_failures: parsed(&get, "OSELYA_LOGIN_MAX_FAILURES", defaults.max_failures)?,
            lock_secs: parsed(&get, "OSELYA_LOGIN_LOCK_SECS", defaults.lock_secs)?,
        };

        let staff_usernames = get("OSELYA_STAFF_USERNAMES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            host: get("OSELYA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "OSELYA_PORT", 3000)?,
            db_path: get("OSELYA_DB_PATH").unwrap_or_else(|| "oselya.db".into()).into(),
            jwt_secret,
            session_days: parsed(&get, "OSELYA_SESSION_DAYS", 14)?,
            throttle,
            sweep_secs: parsed(&get, "OSELYA_THROTTLE_SWEEP_SECS", 300)?,
            staff_usernames,
        })
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        _ => Ok(default),
    }
}
