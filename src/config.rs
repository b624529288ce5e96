use {
    crate::domain::error::ReconcileError,
    crate::services::reconciler::RetryPolicy,
    std::{env, str::FromStr, time::Duration},
};

const TEST_BASE_URL: &str = "https://api.externalintegration.payex.com";
const PRODUCTION_BASE_URL: &str = "https://api.payex.com";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub access_token: String,
    pub request_timeout: Duration,
    /// Appended to the client's own user agent.
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub admin_token: String,
    pub gateway: GatewayConfig,
    pub failure_retry: RetryPolicy,
    pub worker_batch_size: i64,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ReconcileError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ReconcileError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ReconcileError::Configuration(format!("{key} must be set")))
        };

        let test_mode: bool = parse_or(&lookup, "SWEDBANK_TEST_MODE", true)?;
        let base_url = lookup("SWEDBANK_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                if test_mode { TEST_BASE_URL } else { PRODUCTION_BASE_URL }.to_string()
            });

        let gateway = GatewayConfig {
            base_url,
            access_token: required("SWEDBANK_ACCESS_TOKEN")?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SWEDBANK_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            user_agent: lookup("SWEDBANK_USER_AGENT").filter(|v| !v.trim().is_empty()),
        };

        let failure_retry = RetryPolicy {
            interval: Duration::from_secs(parse_or(&lookup, "FAILURE_POLL_INTERVAL_SECS", 1)?),
            max_attempts: parse_or(&lookup, "FAILURE_POLL_MAX_ATTEMPTS", 60)?,
        };

        let worker_batch_size: i64 = parse_or(&lookup, "WORKER_BATCH_SIZE", 10)?;
        if worker_batch_size <= 0 {
            return Err(ReconcileError::Configuration(
                "WORKER_BATCH_SIZE must be positive".into(),
            ));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            admin_token: required("ADMIN_TOKEN")?,
            gateway,
            failure_retry,
            worker_batch_size,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ReconcileError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ReconcileError::Configuration(format!("{key}: {e}"))),
    }
}
