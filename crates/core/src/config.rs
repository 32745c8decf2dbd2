use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::priority::PriorityTimeoutOverrides;

pub const ENV_HIGH_TIMEOUT: &str = "TICKWORK_HIGH_TIMEOUT_MS";
pub const ENV_NORMAL_TIMEOUT: &str = "TICKWORK_NORMAL_TIMEOUT_MS";
pub const ENV_LOW_TIMEOUT: &str = "TICKWORK_LOW_TIMEOUT_MS";
pub const ENV_FRAME_DURATION: &str = "TICKWORK_FRAME_DURATION_MS";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_ms(key: &str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
    })
    .transpose()
}

/// Runtime tuning for one scheduler instance.
///
/// Every field is optional: absent values leave the scheduler's current
/// setting untouched when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// HIGH/NORMAL/LOW timeouts in milliseconds.
    #[serde(default)]
    pub priority_timeout_params: PriorityTimeoutOverrides,
    /// Per-slice budget for frame-bounded policies.
    #[serde(default)]
    pub frame_duration_ms: Option<u64>,
}

impl SchedulerConfig {
    /// Parse a TOML config file.
    ///
    /// ```toml
    /// frame_duration_ms = 8
    ///
    /// [priority_timeout_params]
    /// high = 100
    /// low = 10000
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from `TICKWORK_*` environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(env_opt)
    }

    /// Layer environment values over this config. Env wins where set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.overlay(env_opt)
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let params = &mut self.priority_timeout_params;
        if let Some(ms) = parse_ms(ENV_HIGH_TIMEOUT, lookup(ENV_HIGH_TIMEOUT))? {
            params.high = Some(ms);
        }
        if let Some(ms) = parse_ms(ENV_NORMAL_TIMEOUT, lookup(ENV_NORMAL_TIMEOUT))? {
            params.normal = Some(ms);
        }
        if let Some(ms) = parse_ms(ENV_LOW_TIMEOUT, lookup(ENV_LOW_TIMEOUT))? {
            params.low = Some(ms);
        }
        if let Some(ms) = parse_ms(ENV_FRAME_DURATION, lookup(ENV_FRAME_DURATION))? {
            self.frame_duration_ms = Some(ms);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject a zero frame duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.frame_duration_ms {
            Some(0) => Err(ConfigError::InvalidFrameDuration(0)),
            _ => Ok(()),
        }
    }

    pub fn frame_duration(&self) -> Option<Duration> {
        self.frame_duration_ms.map(Duration::from_millis)
    }

    pub fn log_summary(&self) {
        let show = |v: Option<u64>| v.map_or_else(|| "(default)".to_string(), |ms| format!("{ms}ms"));
        let params = &self.priority_timeout_params;
        tracing::info!("Scheduler config loaded:");
        tracing::info!(
            "  timeouts:   high={}, normal={}, low={}",
            show(params.high),
            show(params.normal),
            show(params.low)
        );
        tracing::info!("  frame:      duration={}", show(self.frame_duration_ms));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_empty() {
        let c = SchedulerConfig::default();
        assert!(c.priority_timeout_params.is_empty());
        assert_eq!(c.frame_duration_ms, None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_toml_with_missing_fields() {
        let c: SchedulerConfig = toml::from_str(
            r#"
            [priority_timeout_params]
            high = 100
            "#,
        )
        .unwrap();
        assert_eq!(c.priority_timeout_params.high, Some(100));
        assert_eq!(c.priority_timeout_params.normal, None);
        assert_eq!(c.frame_duration_ms, None);
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = std::env::temp_dir().join(format!("tickwork-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        std::fs::write(&good, "frame_duration_ms = 8\n[priority_timeout_params]\nlow = 9000\n").unwrap();
        let c = SchedulerConfig::from_file(&good).unwrap();
        assert_eq!(c.frame_duration(), Some(Duration::from_millis(8)));
        assert_eq!(c.priority_timeout_params.low, Some(9000));

        let zero = dir.join("zero.toml");
        std::fs::write(&zero, "frame_duration_ms = 0\n").unwrap();
        assert!(matches!(
            SchedulerConfig::from_file(&zero),
            Err(ConfigError::InvalidFrameDuration(0))
        ));

        let broken = dir.join("broken.toml");
        std::fs::write(&broken, "frame_duration_ms = \"soon\"\n").unwrap();
        assert!(matches!(SchedulerConfig::from_file(&broken), Err(ConfigError::Parse(_))));

        assert!(matches!(
            SchedulerConfig::from_file(dir.join("missing.toml")),
            Err(ConfigError::Io(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn env_values_override_file_values() {
        let base = SchedulerConfig {
            priority_timeout_params: PriorityTimeoutOverrides {
                high: Some(100),
                normal: Some(900),
                low: None,
            },
            frame_duration_ms: Some(4),
        };
        let c = base
            .overlay(lookup_from(&[(ENV_NORMAL_TIMEOUT, "1200"), (ENV_FRAME_DURATION, "12")]))
            .unwrap();

        assert_eq!(c.priority_timeout_params.high, Some(100));
        assert_eq!(c.priority_timeout_params.normal, Some(1200));
        assert_eq!(c.priority_timeout_params.low, None);
        assert_eq!(c.frame_duration_ms, Some(12));
    }

    #[test]
    fn rejects_non_numeric_env_value() {
        let err = SchedulerConfig::default()
            .overlay(lookup_from(&[(ENV_LOW_TIMEOUT, "later")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, ENV_LOW_TIMEOUT);
                assert_eq!(value, "later");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_frame_duration_from_env() {
        let err = SchedulerConfig::default()
            .overlay(lookup_from(&[(ENV_FRAME_DURATION, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameDuration(0)));
    }
}
