use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::limit::RateLimit;
use crate::types::{ErrorKind, Result};

/// Declarative limiter configuration, e.g. from an application's config
/// file.
///
/// Exactly one of `interval` and `max_concurrent` must be set; durations
/// use human-readable strings (`"100ms"`, `"2s"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Minimum duration between dispatch starts within a group.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    /// Maximum in-flight round trips within a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    /// Period of the idle-group expiry sweep; absent means groups never
    /// expire.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expire_check_interval: Option<Duration>,

    /// Header consulted for request priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_header: Option<String>,
}

impl LimiterConfig {
    /// Build the configured limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`] unless exactly one
    /// strategy is configured, and [`ErrorKind::InvalidPriorityHeader`] if
    /// the configured header is not a valid HTTP header name.
    pub fn build(&self) -> Result<RateLimit> {
        let mut limiter = match (self.interval, self.max_concurrent) {
            (Some(interval), None) => RateLimit::interval(interval),
            (None, Some(limit)) => RateLimit::max_concurrent(limit),
            (Some(_), Some(_)) => {
                return Err(ErrorKind::InvalidLimiterConfig(
                    "`interval` and `max_concurrent` are mutually exclusive".to_owned(),
                ));
            }
            (None, None) => {
                return Err(ErrorKind::InvalidLimiterConfig(
                    "one of `interval` and `max_concurrent` is required".to_owned(),
                ));
            }
        };

        if let Some(every) = self.expire_check_interval {
            limiter = limiter.with_expire_check_interval(every);
        }
        if let Some(name) = &self.priority_header {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|_| ErrorKind::InvalidPriorityHeader(name.clone()))?;
            limiter = limiter.with_priority_header(name);
        }
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_toml() {
        let config: LimiterConfig = toml::from_str(
            r#"
            interval = "100ms"
            expire_check_interval = "2s"
            priority_header = "x-lane"
            "#,
        )
        .unwrap();

        assert_eq!(config.interval, Some(Duration::from_millis(100)));
        assert_eq!(config.expire_check_interval, Some(Duration::from_secs(2)));
        assert_eq!(config.priority_header.as_deref(), Some("x-lane"));
        config.build().unwrap();
    }

    #[test]
    fn round_trips_through_serde() {
        let config = LimiterConfig {
            max_concurrent: Some(8),
            expire_check_interval: Some(Duration::from_millis(250)),
            ..LimiterConfig::default()
        };
        let encoded = toml::to_string(&config).unwrap();
        let decoded: LimiterConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn rejects_zero_or_two_strategies() {
        assert!(matches!(
            LimiterConfig::default().build(),
            Err(ErrorKind::InvalidLimiterConfig(_))
        ));

        let both = LimiterConfig {
            interval: Some(Duration::from_millis(10)),
            max_concurrent: Some(4),
            ..LimiterConfig::default()
        };
        assert!(matches!(
            both.build(),
            Err(ErrorKind::InvalidLimiterConfig(_))
        ));
    }

    #[test]
    fn rejects_invalid_header_names() {
        let config = LimiterConfig {
            max_concurrent: Some(1),
            priority_header: Some("not a header\n".to_owned()),
            ..LimiterConfig::default()
        };
        assert!(matches!(
            config.build(),
            Err(ErrorKind::InvalidPriorityHeader(_))
        ));
    }
}
