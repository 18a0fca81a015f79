//! Tunables for the filesystem manager.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Configuration for an [`FsManager`](crate::FsManager).
///
/// Deserializes from JSON with every field optional; durations are given in
/// milliseconds.
///
/// # Examples
///
/// ```
/// use graftfs::FsConfig;
///
/// let config: FsConfig = serde_json::from_str(r#"{ "search_limit": 25 }"#).unwrap();
/// assert_eq!(config.search_limit, 25);
/// assert_eq!(config.watch_poll_interval, FsConfig::default().watch_poll_interval);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Interval between snapshots for watchers on adapters without a native
    /// change feed. A zero interval is raised to one millisecond.
    #[serde(deserialize_with = "duration_millis")]
    pub watch_poll_interval: Duration,

    /// Maximum number of results a single search returns.
    pub search_limit: usize,

    /// How long a finished operation stays queryable before its record is
    /// purged.
    #[serde(deserialize_with = "duration_millis")]
    pub operation_retention: Duration,

    /// Buffer capacity of the operation event broadcast channel. Zero is
    /// raised to one.
    pub operation_channel_capacity: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            watch_poll_interval: Duration::from_secs(2),
            search_limit: 100,
            operation_retention: Duration::from_secs(60),
            operation_channel_capacity: 256,
        }
    }
}

fn duration_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}
