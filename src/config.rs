// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Aggregator tuning options, with defaults matching the reference client
//! and an optional JSON override file named by `ENDPOINTS_SERVICE_CONFIG_FILE`.

use std::env;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

/// Name of the environment variable that, if set, points at a JSON file
/// overriding the aggregator defaults below.
pub const CONFIG_ENV_VAR: &str = "ENDPOINTS_SERVICE_CONFIG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    pub num_entries: i64,
    pub flush_interval: Duration,
    pub expiration: Duration,
}

impl CheckOptions {
    pub fn new(num_entries: i64, flush_interval: Duration, expiration: Duration) -> Self {
        let expiration = coerce_expiration(flush_interval, expiration);
        Self {
            num_entries,
            flush_interval,
            expiration,
        }
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self::new(200, Duration::from_millis(500), Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaOptions {
    pub num_entries: i64,
    pub flush_interval: Duration,
    pub expiration: Duration,
}

impl QuotaOptions {
    pub fn new(num_entries: i64, flush_interval: Duration, expiration: Duration) -> Self {
        let expiration = coerce_expiration(flush_interval, expiration);
        Self {
            num_entries,
            flush_interval,
            expiration,
        }
    }
}

impl Default for QuotaOptions {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub num_entries: i64,
    pub flush_interval: Duration,
}

impl ReportOptions {
    pub fn new(num_entries: i64, flush_interval: Duration) -> Self {
        Self {
            num_entries,
            flush_interval,
        }
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::new(200, Duration::from_secs(1))
    }
}

/// `expiration` must outlive `flush_interval` — otherwise an entry could
/// expire before the scheduler ever gets a chance to flush it. If it
/// doesn't, it is coerced to `flush_interval + 1ms`, matching the reference
/// client's cache constructor.
fn coerce_expiration(flush_interval: Duration, expiration: Duration) -> Duration {
    if expiration <= flush_interval {
        flush_interval + Duration::from_millis(1)
    } else {
        expiration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceControlConfig {
    pub check: CheckOptions,
    pub quota: QuotaOptions,
    pub report: ReportOptions,
}

impl Default for ServiceControlConfig {
    fn default() -> Self {
        Self {
            check: CheckOptions::default(),
            quota: QuotaOptions::default(),
            report: ReportOptions::default(),
        }
    }
}

impl ServiceControlConfig {
    /// Loads overrides from the file named by `ENDPOINTS_SERVICE_CONFIG_FILE`,
    /// if set. A missing variable, missing file, or unparseable file all
    /// fall back to defaults with a `tracing::warn!` — a bad config file
    /// never fails the caller.
    pub fn from_env() -> Self {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(&path).unwrap_or_else(|| {
                tracing::warn!(path = %path, "failed to load service control config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn from_file(path: &str) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        let raw: RawConfig = serde_json::from_str(&contents).ok()?;
        Some(raw.into())
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(rename = "checkAggregatorConfig")]
    check_aggregator_config: Option<RawCheckConfig>,
    #[serde(rename = "quotaAggregatorConfig")]
    quota_aggregator_config: Option<RawQuotaConfig>,
    #[serde(rename = "reportAggregatorConfig")]
    report_aggregator_config: Option<RawReportConfig>,
}

#[derive(Debug, Deserialize)]
struct RawCheckConfig {
    #[serde(rename = "cacheEntries")]
    cache_entries: i64,
    #[serde(rename = "flushIntervalMs")]
    flush_interval_ms: u64,
    #[serde(rename = "responseExpirationMs")]
    response_expiration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawQuotaConfig {
    #[serde(rename = "cacheEntries")]
    cache_entries: i64,
    #[serde(rename = "flushIntervalMs")]
    flush_interval_ms: u64,
    #[serde(rename = "expirationMs")]
    expiration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawReportConfig {
    #[serde(rename = "cacheEntries")]
    cache_entries: i64,
    #[serde(rename = "flushIntervalMs")]
    flush_interval_ms: u64,
}

impl From<RawConfig> for ServiceControlConfig {
    fn from(raw: RawConfig) -> Self {
        let check = raw
            .check_aggregator_config
            .map(|c| {
                CheckOptions::new(
                    c.cache_entries,
                    Duration::from_millis(c.flush_interval_ms),
                    Duration::from_millis(c.response_expiration_ms),
                )
            })
            .unwrap_or_default();
        let quota = raw
            .quota_aggregator_config
            .map(|c| {
                QuotaOptions::new(
                    c.cache_entries,
                    Duration::from_millis(c.flush_interval_ms),
                    Duration::from_millis(c.expiration_ms),
                )
            })
            .unwrap_or_default();
        let report = raw
            .report_aggregator_config
            .map(|c| ReportOptions::new(c.cache_entries, Duration::from_millis(c.flush_interval_ms)))
            .unwrap_or_default();
        Self { check, quota, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn check_options_defaults_match_reference_client() {
        let opts = CheckOptions::default();
        assert_eq!(opts.num_entries, 200);
        assert_eq!(opts.flush_interval, Duration::from_millis(500));
        assert_eq!(opts.expiration, Duration::from_secs(1));
    }

    #[test]
    fn expiration_shorter_than_flush_interval_is_coerced() {
        let opts = CheckOptions::new(10, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(opts.expiration, Duration::from_secs(2) + Duration::from_millis(1));
    }

    #[test]
    fn report_options_have_no_expiration_field() {
        let opts = ReportOptions::default();
        assert_eq!(opts.num_entries, 200);
        assert_eq!(opts.flush_interval, Duration::from_secs(1));
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        env::remove_var(CONFIG_ENV_VAR);
        let cfg = ServiceControlConfig::from_env();
        assert_eq!(cfg, ServiceControlConfig::default());
    }

    #[test]
    fn from_file_parses_the_reference_json_shape() {
        let json = r#"{
            "checkAggregatorConfig": {
                "cacheEntries": 100,
                "flushIntervalMs": 2000,
                "responseExpirationMs": 3000
            },
            "quotaAggregatorConfig": {
                "cacheEntries": 200,
                "flushIntervalMs": 2000,
                "expirationMs": 5000
            },
            "reportAggregatorConfig": {
                "cacheEntries": 300,
                "flushIntervalMs": 4000
            }
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let cfg = ServiceControlConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.check.num_entries, 100);
        assert_eq!(cfg.quota.expiration, Duration::from_millis(5000));
        assert_eq!(cfg.report.num_entries, 300);
    }

    #[test]
    fn from_file_returns_none_on_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        assert!(ServiceControlConfig::from_file(file.path().to_str().unwrap()).is_none());
    }
}
