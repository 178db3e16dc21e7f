//! Session controller configuration.
//!
//! Configuration is loaded from environment variables. Every value except the
//! local participant name has a default.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default room name used in logs.
pub const DEFAULT_ROOM_NAME: &str = "room";

/// Default secondary grid row budget.
pub const DEFAULT_GRID_ROWS: usize = 2;

/// Default secondary grid column budget.
pub const DEFAULT_GRID_COLS: usize = 2;

/// Default recording pause/resume cooldown in seconds.
pub const DEFAULT_PAUSE_COOLDOWN_SECONDS: u64 = 15;

/// Default pause limit for video recordings.
pub const DEFAULT_VIDEO_PAUSE_LIMIT: u32 = 3;

/// Default pause limit for audio recordings.
pub const DEFAULT_AUDIO_PAUSE_LIMIT: u32 = 3;

/// Default wait between closing a producer and reconnecting its replacement.
pub const DEFAULT_TEARDOWN_DELAY_MS: u64 = 300;

/// Default "still there" liveness ping interval in seconds.
pub const DEFAULT_LIVENESS_INTERVAL_SECONDS: u64 = 60;

/// Default time to wait for a signaling acknowledgment in seconds.
pub const DEFAULT_SIGNALING_TIMEOUT_SECONDS: u64 = 10;

/// Default recording clock tick in milliseconds.
pub const DEFAULT_CLOCK_TICK_MS: u64 = 1000;

/// Session instance ID prefix.
pub const DEFAULT_SESSION_ID_PREFIX: &str = "sc";

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local participant name; owner of the self sentinel track.
    pub member_name: String,

    /// Room identifier used in logs (default: "room").
    pub room_name: String,

    /// Unique identifier for this session instance.
    pub session_id: String,

    /// Secondary grid row budget (default: 2).
    pub grid_rows: usize,

    /// Secondary grid column budget (default: 2).
    pub grid_cols: usize,

    /// Pause/resume cooldown. Seconds are the only unit accepted.
    pub pause_cooldown: Duration,

    /// Pause limit for video recordings (default: 3).
    pub video_pause_limit: u32,

    /// Pause limit for audio recordings (default: 3).
    pub audio_pause_limit: u32,

    /// Wait between producer close and reconnect (default: 300ms).
    pub teardown_delay: Duration,

    /// Liveness ping interval; `None` disables pings.
    pub liveness_interval: Option<Duration>,

    /// Recording clock tick (default: 1000ms).
    pub clock_tick: Duration,

    /// Wait for a signaling acknowledgment before failing the request
    /// (default: 10s).
    pub signaling_timeout: Duration,

    /// Install the Prometheus recorder (default: true).
    pub metrics_enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `SC_MEMBER_NAME` is absent
    /// and [`ConfigError::InvalidValue`] when a numeric value does not parse
    /// or a grid dimension is zero.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let member_name = vars
            .get("SC_MEMBER_NAME")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_MEMBER_NAME".to_string()))?
            .clone();

        let room_name = vars
            .get("SC_ROOM_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string());

        let grid_rows = parse_var(vars, "SC_GRID_ROWS", DEFAULT_GRID_ROWS)?;
        let grid_cols = parse_var(vars, "SC_GRID_COLS", DEFAULT_GRID_COLS)?;
        if grid_rows == 0 || grid_cols == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "grid budget must be at least 1x1, got {grid_rows}x{grid_cols}"
            )));
        }

        let pause_cooldown = Duration::from_secs(parse_var(
            vars,
            "SC_PAUSE_COOLDOWN_SECONDS",
            DEFAULT_PAUSE_COOLDOWN_SECONDS,
        )?);

        let video_pause_limit = parse_var(vars, "SC_VIDEO_PAUSE_LIMIT", DEFAULT_VIDEO_PAUSE_LIMIT)?;
        let audio_pause_limit = parse_var(vars, "SC_AUDIO_PAUSE_LIMIT", DEFAULT_AUDIO_PAUSE_LIMIT)?;

        let teardown_delay = Duration::from_millis(parse_var(
            vars,
            "SC_TEARDOWN_DELAY_MS",
            DEFAULT_TEARDOWN_DELAY_MS,
        )?);

        let liveness_secs = parse_var(
            vars,
            "SC_LIVENESS_INTERVAL_SECONDS",
            DEFAULT_LIVENESS_INTERVAL_SECONDS,
        )?;
        let liveness_interval = (liveness_secs > 0).then(|| Duration::from_secs(liveness_secs));

        let clock_tick_ms = parse_var(vars, "SC_CLOCK_TICK_MS", DEFAULT_CLOCK_TICK_MS)?;
        if clock_tick_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_CLOCK_TICK_MS must be greater than zero".to_string(),
            ));
        }

        let signaling_timeout_secs = parse_var(
            vars,
            "SC_SIGNALING_TIMEOUT_SECONDS",
            DEFAULT_SIGNALING_TIMEOUT_SECONDS,
        )?;
        if signaling_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_SIGNALING_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }

        let metrics_enabled = parse_var(vars, "SC_METRICS_ENABLED", true)?;

        let session_id = vars.get("SC_SESSION_ID").cloned().unwrap_or_else(|| {
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SESSION_ID_PREFIX}-{room_name}-{short_suffix}")
        });

        Ok(Config {
            member_name,
            room_name,
            session_id,
            grid_rows,
            grid_cols,
            pause_cooldown,
            video_pause_limit,
            audio_pause_limit,
            teardown_delay,
            liveness_interval,
            clock_tick: Duration::from_millis(clock_tick_ms),
            signaling_timeout: Duration::from_secs(signaling_timeout_secs),
            metrics_enabled,
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("SC_MEMBER_NAME".to_string(), "alice".to_string())])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.member_name, "alice");
        assert_eq!(config.room_name, DEFAULT_ROOM_NAME);
        assert_eq!(config.grid_rows, DEFAULT_GRID_ROWS);
        assert_eq!(config.grid_cols, DEFAULT_GRID_COLS);
        assert_eq!(
            config.pause_cooldown,
            Duration::from_secs(DEFAULT_PAUSE_COOLDOWN_SECONDS)
        );
        assert_eq!(config.video_pause_limit, DEFAULT_VIDEO_PAUSE_LIMIT);
        assert_eq!(config.audio_pause_limit, DEFAULT_AUDIO_PAUSE_LIMIT);
        assert_eq!(
            config.teardown_delay,
            Duration::from_millis(DEFAULT_TEARDOWN_DELAY_MS)
        );
        assert_eq!(
            config.liveness_interval,
            Some(Duration::from_secs(DEFAULT_LIVENESS_INTERVAL_SECONDS))
        );
        assert_eq!(config.clock_tick, Duration::from_millis(DEFAULT_CLOCK_TICK_MS));
        assert_eq!(
            config.signaling_timeout,
            Duration::from_secs(DEFAULT_SIGNALING_TIMEOUT_SECONDS)
        );
        assert!(config.metrics_enabled);
        // Session ID should be auto-generated
        assert!(config.session_id.starts_with("sc-room-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("SC_ROOM_NAME".to_string(), "standup".to_string());
        vars.insert("SC_GRID_ROWS".to_string(), "3".to_string());
        vars.insert("SC_GRID_COLS".to_string(), "4".to_string());
        vars.insert("SC_PAUSE_COOLDOWN_SECONDS".to_string(), "5".to_string());
        vars.insert("SC_VIDEO_PAUSE_LIMIT".to_string(), "10".to_string());
        vars.insert("SC_AUDIO_PAUSE_LIMIT".to_string(), "1".to_string());
        vars.insert("SC_TEARDOWN_DELAY_MS".to_string(), "500".to_string());
        vars.insert("SC_LIVENESS_INTERVAL_SECONDS".to_string(), "0".to_string());
        vars.insert("SC_SIGNALING_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("SC_METRICS_ENABLED".to_string(), "false".to_string());
        vars.insert("SC_SESSION_ID".to_string(), "sc-fixed".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.room_name, "standup");
        assert_eq!(config.grid_rows, 3);
        assert_eq!(config.grid_cols, 4);
        assert_eq!(config.pause_cooldown, Duration::from_secs(5));
        assert_eq!(config.video_pause_limit, 10);
        assert_eq!(config.audio_pause_limit, 1);
        assert_eq!(config.teardown_delay, Duration::from_millis(500));
        assert_eq!(config.liveness_interval, None);
        assert_eq!(config.signaling_timeout, Duration::from_secs(3));
        assert!(!config.metrics_enabled);
        assert_eq!(config.session_id, "sc-fixed");
    }

    #[test]
    fn test_from_vars_missing_member_name() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SC_MEMBER_NAME"));
    }

    #[test]
    fn test_from_vars_rejects_zero_grid() {
        let mut vars = base_vars();
        vars.insert("SC_GRID_COLS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_from_vars_rejects_zero_signaling_timeout() {
        let mut vars = base_vars();
        vars.insert("SC_SIGNALING_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("SC_SIGNALING_TIMEOUT_SECONDS"))
        );
    }

    #[test]
    fn test_from_vars_rejects_garbage_number() {
        let mut vars = base_vars();
        vars.insert("SC_PAUSE_COOLDOWN_SECONDS".to_string(), "15ms".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("SC_PAUSE_COOLDOWN_SECONDS"))
        );
    }
}
