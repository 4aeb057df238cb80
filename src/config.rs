use reqwest::Url;
use std::env;
use std::str::FromStr;
use tokio::time::Duration;

use crate::errors::ConfigError;
use crate::utils::{normalize_url, parse_duration_string};

pub const DEFAULT_NUM_USERS: usize = 1000;
pub const DEFAULT_DURATION_SECS: u64 = 60;
pub const DEFAULT_REQUESTS_PER_USER: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_THINK_TIME_MIN: Duration = Duration::from_millis(100);
pub const DEFAULT_THINK_TIME_MAX: Duration = Duration::from_millis(2000);

/// Configuration for one load test run. Read-only once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub target_url: String,
    pub num_users: usize,
    pub duration: Duration,
    pub requests_per_user: usize,
    pub request_timeout: Duration,
    pub think_time_min: Duration,
    pub think_time_max: Duration,
    pub skip_tls_verify: bool,
    pub custom_headers: Option<String>,
    pub report_json_path: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            num_users: DEFAULT_NUM_USERS,
            duration: Duration::from_secs(DEFAULT_DURATION_SECS),
            requests_per_user: DEFAULT_REQUESTS_PER_USER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            think_time_min: DEFAULT_THINK_TIME_MIN,
            think_time_max: DEFAULT_THINK_TIME_MAX,
            skip_tls_verify: false,
            custom_headers: None,
            report_json_path: None,
            metrics_port: None,
        }
    }
}

impl RunConfig {
    /// Creates a configuration for `target_url` with every other value defaulted.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// A missing `TARGET_URL` is not an error here: the CLI prompts for it.
    /// Call [`RunConfig::validate`] before starting a run.
    pub fn from_env() -> Result<Self, ConfigError> {
        let target_url = env::var("TARGET_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| normalize_url(&s))
            .unwrap_or_default();

        let num_users = parse_env_number("NUM_USERS", DEFAULT_NUM_USERS)?;
        let requests_per_user = parse_env_number("REQUESTS_PER_USER", DEFAULT_REQUESTS_PER_USER)?;

        let duration = parse_env_duration("TEST_DURATION", DEFAULT_DURATION_SECS.to_string())?;
        let request_timeout = parse_env_duration("REQUEST_TIMEOUT", "30s".to_string())?;

        let think_time_min = Duration::from_millis(parse_env_number(
            "THINK_TIME_MIN_MS",
            DEFAULT_THINK_TIME_MIN.as_millis() as u64,
        )?);
        let think_time_max = Duration::from_millis(parse_env_number(
            "THINK_TIME_MAX_MS",
            DEFAULT_THINK_TIME_MAX.as_millis() as u64,
        )?);

        let skip_tls_verify = env_flag("SKIP_TLS_VERIFY");
        let custom_headers = env::var("CUSTOM_HEADERS").ok().filter(|s| !s.is_empty());
        let report_json_path = env::var("REPORT_JSON_PATH").ok().filter(|s| !s.is_empty());
        let metrics_port = match env::var("METRICS_PORT")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw) => Some(parse_number("METRICS_PORT", &raw)?),
            None => None,
        };

        Ok(RunConfig {
            target_url,
            num_users,
            duration,
            requests_per_user,
            request_timeout,
            think_time_min,
            think_time_max,
            skip_tls_verify,
            custom_headers,
            report_json_path,
            metrics_port,
        })
    }

    /// Checks the preconditions of a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }

        let url = Url::parse(&self.target_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.target_url.clone(),
            message: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl {
                url: self.target_url.clone(),
                message: format!("unsupported scheme '{}', expected http or https", url.scheme()),
            });
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                url: self.target_url.clone(),
                message: "missing host".to_string(),
            });
        }

        if self.num_users == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_users".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.requests_per_user == 0 {
            return Err(ConfigError::InvalidValue {
                field: "requests_per_user".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.think_time_min > self.think_time_max {
            return Err(ConfigError::InvalidValue {
                field: "think_time".to_string(),
                message: format!(
                    "minimum {:?} is greater than maximum {:?}",
                    self.think_time_min, self.think_time_max
                ),
            });
        }

        Ok(())
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        println!("Starting load test...");
        println!("Target URL: {}", self.target_url);
        println!("Number of users: {}", self.num_users);
        println!("Duration: {} seconds", self.duration.as_secs());
        println!("Requests per user: {}", self.requests_per_user);
        println!("Request timeout: {:?}", self.request_timeout);
        println!(
            "Think time: {:?} to {:?}",
            self.think_time_min, self.think_time_max
        );
        if self.skip_tls_verify {
            println!("TLS verification: disabled");
        }
        if let Some(ref headers) = self.custom_headers {
            println!("Custom headers: {}", headers);
        }
        println!("{}", "-".repeat(50));
    }
}

/// Parses a number, naming the field in the error.
pub fn parse_number<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn parse_env_number<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => parse_number(var, &raw),
        _ => Ok(default),
    }
}

fn parse_env_duration(var: &str, default: String) -> Result<Duration, ConfigError> {
    let raw = env::var(var).unwrap_or(default);
    parse_duration_string(&raw).map_err(|message| ConfigError::InvalidDuration {
        field: var.to_string(),
        value: raw,
        message,
    })
}

/// Reads a boolean flag; only "true" (any case) enables it.
pub fn env_flag(var: &str) -> bool {
    env::var(var)
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = RunConfig::new("https://example.com");
        assert_eq!(config.num_users, 1000);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.requests_per_user, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.think_time_min, Duration::from_millis(100));
        assert_eq!(config.think_time_max, Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        assert_eq!(RunConfig::new("  ").validate(), Err(ConfigError::MissingUrl));
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let err = RunConfig::new("example.com/path").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }), "{:?}", err);
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        let err = RunConfig::new("ftp://example.com").validate().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_zero_users() {
        let mut config = RunConfig::new("http://localhost:8080");
        config.num_users = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "num_users"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_requests() {
        let mut config = RunConfig::new("http://localhost:8080");
        config.requests_per_user = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allows_zero_duration() {
        let mut config = RunConfig::new("http://localhost:8080");
        config.duration = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_think_time() {
        let mut config = RunConfig::new("http://localhost:8080");
        config.think_time_min = Duration::from_secs(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_number_error_names_field() {
        let err = parse_number::<usize>("NUM_USERS", "ten").unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotANumber {
                field: "NUM_USERS".to_string(),
                value: "ten".to_string()
            }
        );
    }
}
