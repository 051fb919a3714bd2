//! Courier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout applied when a method does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings shared by every service a courier creates.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Prefix for method topics and subscribe topics.
    pub base_topic: String,

    /// Response timeout for methods without one.
    #[serde(rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Duration,

    /// Compile every method when a service is created.
    pub eager_validation: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            base_topic: String::new(),
            default_timeout: DEFAULT_TIMEOUT,
            eager_validation: false,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CourierConfig =
            serde_json::from_str(r#"{"base_topic":"root/","default_timeout_ms":1500}"#).unwrap();

        assert_eq!(config.base_topic, "root/");
        assert_eq!(config.default_timeout, Duration::from_millis(1500));
        assert!(!config.eager_validation);

        let config: CourierConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CourierConfig::default());
    }
}
