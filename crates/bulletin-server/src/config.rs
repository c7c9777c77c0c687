use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use bulletin_notify::fcm::DEFAULT_ENDPOINT;
use bulletin_notify::retry::RetryPolicy;
use bulletin_notify::scanner::DEFAULT_SCAN_PERIOD;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Service-account key file. Unset means notifications are only logged.
    pub fcm_credentials: Option<PathBuf>,
    pub fcm_endpoint: String,
    pub topic: String,
    pub scan_interval: Duration,
    pub retry: RetryPolicy,
    pub credential_lifetime: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse(&get, "BULLETIN_NOTIFY_MAX_RETRIES", defaults.max_retries)?,
            base_delay: Duration::from_millis(parse(
                &get,
                "BULLETIN_NOTIFY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            deadline: Duration::from_secs(parse(
                &get,
                "BULLETIN_NOTIFY_DEADLINE_SECS",
                defaults.deadline.as_secs(),
            )?),
            ..defaults
        };
        anyhow::ensure!(
            retry.deadline > Duration::ZERO,
            "BULLETIN_NOTIFY_DEADLINE_SECS must be at least 1"
        );

        let scan_secs: u64 = parse(&get, "BULLETIN_SCAN_INTERVAL_SECS", DEFAULT_SCAN_PERIOD.as_secs())?;
        anyhow::ensure!(scan_secs > 0, "BULLETIN_SCAN_INTERVAL_SECS must be at least 1");

        Ok(Self {
            db_path: get("BULLETIN_DB_PATH").unwrap_or_else(|| "bulletin.db".into()).into(),
            host: get("BULLETIN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "BULLETIN_PORT", 3000)?,
            fcm_credentials: get("BULLETIN_FCM_CREDENTIALS").map(PathBuf::from),
            fcm_endpoint: get("BULLETIN_FCM_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.into()),
            topic: get("BULLETIN_NOTIFY_TOPIC").unwrap_or_else(|| "all".into()),
            scan_interval: Duration::from_secs(scan_secs),
            retry,
            credential_lifetime: Duration::from_secs(parse(&get, "BULLETIN_CREDENTIAL_LIFETIME_SECS", 3000)?),
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("bulletin.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.topic, "all");
        assert!(config.fcm_credentials.is_none());
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.retry.deadline, Duration::from_secs(30));
        assert_eq!(config.credential_lifetime, Duration::from_secs(3000));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("BULLETIN_PORT", "8080"),
            ("BULLETIN_FCM_CREDENTIALS", "/etc/bulletin/key.json"),
            ("BULLETIN_NOTIFY_TOPIC", "news"),
            ("BULLETIN_SCAN_INTERVAL_SECS", "5"),
            ("BULLETIN_NOTIFY_MAX_RETRIES", "0"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.fcm_credentials, Some(PathBuf::from("/etc/bulletin/key.json")));
        assert_eq!(config.topic, "news");
        assert_eq!(config.scan_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = load(&[("BULLETIN_FCM_CREDENTIALS", ""), ("BULLETIN_PORT", " ")]).unwrap();
        assert!(config.fcm_credentials.is_none());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let err = load(&[("BULLETIN_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("BULLETIN_PORT"));
        assert!(load(&[("BULLETIN_SCAN_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn test_zero_notify_deadline_is_rejected() {
        let err = load(&[("BULLETIN_NOTIFY_DEADLINE_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("BULLETIN_NOTIFY_DEADLINE_SECS"));
        let config = load(&[("BULLETIN_NOTIFY_DEADLINE_SECS", "1")]).unwrap();
        assert_eq!(config.retry.deadline, Duration::from_secs(1));
    }
}
