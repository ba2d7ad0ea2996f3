use serde::Deserialize;
use std::time::Duration;

use crate::capture::ScanSettings;
use crate::models::scan::ScanMode;
use crate::services::nhtsa;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// HS256 secret tenant bearer tokens are signed with
    pub jwt_secret: String,

    /// NHTSA vPIC API base URL
    #[serde(default = "default_nhtsa_base_url")]
    pub nhtsa_base_url: String,

    #[serde(default = "default_decoder_timeout_secs")]
    pub decoder_timeout_secs: u64,

    /// Cloudflare account ID. OCR scanning is disabled when unset.
    pub cf_account_id: Option<String>,

    /// Cloudflare Workers AI API token
    pub cf_api_token: Option<String>,

    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    #[serde(default = "default_ocr_interval_ms")]
    pub ocr_interval_ms: u64,

    #[serde(default = "default_ocr_start_delay_ms")]
    pub ocr_start_delay_ms: u64,

    #[serde(default = "default_device_acquire_timeout_secs")]
    pub device_acquire_timeout_secs: u64,

    #[serde(default = "default_scan_session_ttl_secs")]
    pub scan_session_ttl_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_nhtsa_base_url() -> String {
    nhtsa::DEFAULT_BASE_URL.to_string()
}

fn default_decoder_timeout_secs() -> u64 {
    10
}

fn default_scan_timeout_secs() -> u64 {
    30
}

fn default_ocr_interval_ms() -> u64 {
    2000
}

fn default_ocr_start_delay_ms() -> u64 {
    3000
}

fn default_device_acquire_timeout_secs() -> u64 {
    20
}

fn default_scan_session_ttl_secs() -> u64 {
    600
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn decoder_timeout(&self) -> Duration {
        Duration::from_secs(self.decoder_timeout_secs)
    }

    pub fn scan_session_ttl(&self) -> Duration {
        Duration::from_secs(self.scan_session_ttl_secs)
    }

    /// Workers AI credentials, when both are configured.
    pub fn workers_ai_credentials(&self) -> Option<(&str, &str)> {
        match (self.cf_account_id.as_deref(), self.cf_api_token.as_deref()) {
            (Some(account), Some(token)) if !account.is_empty() && !token.is_empty() => {
                Some((account, token))
            }
            _ => None,
        }
    }

    /// Default settings for new scan sessions.
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            mode: ScanMode::Auto,
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
            ocr_interval: Duration::from_millis(self.ocr_interval_ms),
            ocr_start_delay: Duration::from_millis(self.ocr_start_delay_ms),
            acquire_timeout: Duration::from_secs(self.device_acquire_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        [
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "secret"),
        ]
        .iter()
        .chain(extra)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = envy::from_iter(vars(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.nhtsa_base_url, "https://vpic.nhtsa.dot.gov/api");
        assert_eq!(config.decoder_timeout(), Duration::from_secs(10));
        assert!(config.workers_ai_credentials().is_none());

        let scan = config.scan_settings();
        assert_eq!(scan.scan_timeout, Duration::from_secs(30));
        assert_eq!(scan.ocr_interval, Duration::from_millis(2000));
        assert_eq!(scan.ocr_start_delay, Duration::from_millis(3000));
        assert_eq!(scan.acquire_timeout, Duration::from_secs(20));
        assert_eq!(config.scan_session_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let config: AppConfig = envy::from_iter(vars(&[
            ("CF_ACCOUNT_ID", "acct"),
            ("CF_API_TOKEN", "token"),
            ("SCAN_TIMEOUT_SECS", "45"),
        ]))
        .unwrap();
        assert_eq!(config.workers_ai_credentials(), Some(("acct", "token")));
        assert_eq!(config.scan_settings().scan_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_jwt_secret_required() {
        let result: Result<AppConfig, _> = envy::from_iter(vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/shop".to_string(),
        )]);
        assert!(result.is_err());
    }
}
