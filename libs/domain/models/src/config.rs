use std::time::Duration;

/// Every environment-derived setting the engine's components need,
/// resolved once at startup and passed by value/reference into every
/// component from then on. No component reads the environment itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Coincidence window W, in seconds (`COINCIDENCE_THRESHOLD`).
    pub coincidence_window_seconds: f64,
    /// Age past which a sub-group's anchor causes eviction, in seconds
    /// (`MSG_EXPIRATION`).
    pub message_expiration_seconds: i64,
    /// Heartbeat retention horizon (`HB_DELETE_AFTER`, days).
    pub heartbeat_retention_days: i64,

    pub observation_topic: String,
    pub firedrill_observation_topic: String,
    pub alert_topic: String,
    pub firedrill_alert_topic: String,
    pub connection_test_topic: String,
    /// When set, the runner subscribes/publishes on the `firedrill_*`
    /// topic pair instead of the production one, mirroring the
    /// original's `firedrill_mode` switch (`SNEWS_FIREDRILL_MODE`).
    pub firedrill: bool,

    /// Whether this instance publishes, or only builds identical cache
    /// state and suppresses sends (multi-instance leader/follower gate).
    pub leader: bool,
    /// Identifies this server in outbound alerts (`server_tag`).
    pub server_tag: String,
    /// Shared secret admin commands are authorised against.
    pub admin_shared_secret: Option<String>,

    pub single_detector_imitation_rate_per_week: f64,

    /// Consecutive retryable transport faults tolerated before the
    /// runner treats the connection as fatally wedged (`SNEWS_TRANSPORT_MAX_RETRIES`).
    pub transport_max_retries: u32,
    /// Growth base for the runner's exponential backoff delay.
    pub transport_base_backoff: Duration,

    /// Archive database connection string (`DATABASE_URL`); `None` runs
    /// without archival persistence.
    pub database_url: Option<String>,
    /// Auth token for a remote `libsql://`/`https://` archive database
    /// (`TURSO_AUTH_TOKEN`).
    pub turso_auth_token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coincidence_window_seconds: 10.0,
            message_expiration_seconds: 24 * 3600,
            heartbeat_retention_days: 7,
            observation_topic: "observation-topic".to_string(),
            firedrill_observation_topic: "firedrill-observation-topic".to_string(),
            alert_topic: "alert-topic".to_string(),
            firedrill_alert_topic: "firedrill-alert-topic".to_string(),
            connection_test_topic: "connection-test-topic".to_string(),
            firedrill: false,
            leader: true,
            server_tag: "snews-coincidence-engine".to_string(),
            admin_shared_secret: None,
            single_detector_imitation_rate_per_week: 1.0,
            transport_max_retries: 20,
            transport_base_backoff: Duration::from_millis(1500),
            database_url: None,
            turso_auth_token: None,
        }
    }
}

/// Error produced when a required environment variable is missing or
/// cannot be parsed into the type `EngineConfig` expects.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable '{0}'")]
    Missing(String),
    #[error("environment variable '{name}' could not be parsed: {reason}")]
    Invalid { name: String, reason: String },
}

impl EngineConfig {
    /// Builds a config from the process environment, falling back to
    /// [`EngineConfig::default`] values for anything optional. Callers are
    /// expected to have already loaded a `.env` file (via `dotenvy`)
    /// before calling this.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let coincidence_window_seconds = optional_parse("COINCIDENCE_THRESHOLD", defaults.coincidence_window_seconds)?;
        let message_expiration_seconds = optional_parse("MSG_EXPIRATION", defaults.message_expiration_seconds)?;
        let heartbeat_retention_days = optional_parse("HB_DELETE_AFTER", defaults.heartbeat_retention_days)?;

        Ok(Self {
            coincidence_window_seconds,
            message_expiration_seconds,
            heartbeat_retention_days,
            observation_topic: std::env::var("OBSERVATION_TOPIC").unwrap_or(defaults.observation_topic),
            firedrill_observation_topic: std::env::var("FIREDRILL_OBSERVATION_TOPIC")
                .unwrap_or(defaults.firedrill_observation_topic),
            alert_topic: std::env::var("ALERT_TOPIC").unwrap_or(defaults.alert_topic),
            firedrill_alert_topic: std::env::var("FIREDRILL_ALERT_TOPIC").unwrap_or(defaults.firedrill_alert_topic),
            connection_test_topic: std::env::var("CONNECTION_TEST_TOPIC").unwrap_or(defaults.connection_test_topic),
            firedrill: optional_parse("SNEWS_FIREDRILL_MODE", defaults.firedrill)?,
            leader: optional_parse("SNEWS_LEADER", defaults.leader)?,
            server_tag: std::env::var("SNEWS_SERVER_TAG").unwrap_or(defaults.server_tag),
            admin_shared_secret: std::env::var("SNEWS_ADMIN_SECRET").ok(),
            single_detector_imitation_rate_per_week: optional_parse(
                "SNEWS_IMITATION_RATE_PER_WEEK",
                defaults.single_detector_imitation_rate_per_week,
            )?,
            transport_max_retries: optional_parse("SNEWS_TRANSPORT_MAX_RETRIES", defaults.transport_max_retries)?,
            transport_base_backoff: defaults.transport_base_backoff,
            database_url: std::env::var("DATABASE_URL").ok(),
            turso_auth_token: std::env::var("TURSO_AUTH_TOKEN").ok(),
        })
    }
}

fn optional_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name: var.to_string(), reason: format!("could not parse '{raw}'") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_network_values() {
        let config = EngineConfig::default();
        assert_eq!(config.coincidence_window_seconds, 10.0);
        assert_eq!(config.message_expiration_seconds, 24 * 3600);
        assert_eq!(config.heartbeat_retention_days, 7);
        assert_eq!(config.transport_max_retries, 20);
        assert!(!config.firedrill);
        assert!(config.database_url.is_none());
    }
}
