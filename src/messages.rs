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

//! Wire messages for the service-control v1 API.
//!
//! These are plain serde mirrors of the real `google.cloud.servicecontrol`
//! protobuf messages. A production build would replace this module with
//! `prost`-generated bindings against the published `.proto` schema without
//! touching any other module in this crate — nothing here depends on the
//! concrete wire encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A protobuf-style timestamp: seconds and nanoseconds since the Unix epoch.
///
/// Kept in canonical form (`0 <= nanos < 1_000_000_000`) so that derived
/// ordering compares `seconds` first and `nanos` second, matching wall-clock
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanos: 0,
    };

    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }
}

/// Per-operation importance. `High` bypasses every cache: policy decisions
/// for important calls must always be live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    Low,
    High,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Low
    }
}

/// How a metric's successive values should be combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    Gauge,
    Cumulative,
    Delta,
}

impl Default for MetricKind {
    fn default() -> Self {
        MetricKind::Delta
    }
}

/// One logical observation of an API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    pub operation_name: String,
    pub consumer_id: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub importance: Importance,
    pub labels: BTreeMap<String, String>,
    pub metric_value_sets: Vec<MetricValueSet>,
    pub log_entries: Vec<LogEntry>,
}

impl Operation {
    /// A minimal, otherwise-empty operation. Handy as an aggregation seed
    /// and in tests.
    pub fn new(operation_name: impl Into<String>, consumer_id: impl Into<String>) -> Self {
        Self {
            operation_id: String::new(),
            operation_name: operation_name.into(),
            consumer_id: consumer_id.into(),
            start_time: Timestamp::EPOCH,
            end_time: Timestamp::EPOCH,
            importance: Importance::Low,
            labels: BTreeMap::new(),
            metric_value_sets: Vec::new(),
            log_entries: Vec::new(),
        }
    }
}

/// All `MetricValue`s recorded for a single metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValueSet {
    pub metric_name: String,
    pub metric_values: Vec<MetricValue>,
}

/// One value of a metric: a timed sample plus the labels that distinguish
/// it from other samples of the same metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub labels: BTreeMap<String, String>,
    pub value: MetricValueData,
}

impl MetricValue {
    pub fn new(value: MetricValueData) -> Self {
        Self {
            start_time: None,
            end_time: None,
            labels: BTreeMap::new(),
            value,
        }
    }
}

/// The `oneof` value carried by a `MetricValue`. Exactly one variant is ever
/// populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValueData {
    Bool(bool),
    Int64(i64),
    Double(f64),
    Distribution(Distribution),
    String(String),
}

impl MetricValueData {
    /// A short tag identifying the populated variant, used to detect
    /// mismatched merges.
    pub fn variant_tag(&self) -> &'static str {
        match self {
            MetricValueData::Bool(_) => "bool",
            MetricValueData::Int64(_) => "int64",
            MetricValueData::Double(_) => "double",
            MetricValueData::Distribution(_) => "distribution",
            MetricValueData::String(_) => "string",
        }
    }
}

/// A histogram of observed values, with one of three bucketing schemes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: i64,
    pub mean: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub sum_of_squared_deviation: f64,
    pub bucket_counts: Vec<i64>,
    pub bucket_option: BucketOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BucketOption {
    Linear {
        num_finite_buckets: i32,
        width: f64,
        offset: f64,
    },
    Exponential {
        num_finite_buckets: i32,
        growth_factor: f64,
        scale: f64,
    },
    Explicit {
        bounds: Vec<f64>,
    },
}

/// A single entry in an operation's log, in the style of `LogEntry` from the
/// v1 schema. Only the fields this crate's merge logic and tests need are
/// modeled; a production build would carry the full schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub name: String,
    pub timestamp: Option<Timestamp>,
    pub severity: LogSeverity,
    pub payload: LogPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSeverity {
    Default,
    Info,
    Warning,
    Error,
}

impl Default for LogSeverity {
    fn default() -> Self {
        LogSeverity::Default
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogPayload {
    Text(String),
    Struct(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub service_name: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub check_errors: Vec<CheckError>,
}

impl CheckResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_deny(&self) -> bool {
        !self.check_errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckError {
    pub code: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateQuotaRequest {
    pub service_name: String,
    pub operation: Operation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocateQuotaResponse {
    pub allocate_errors: Vec<CheckError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub service_name: String,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub report_errors: Vec<CheckError>,
}

/// Constructs a `Distribution` with exponential buckets:
/// `[0, scale)`, then `num_finite_buckets` buckets growing by
/// `growth_factor`, then an overflow bucket.
pub fn create_exponential(num_finite_buckets: i32, growth_factor: f64, scale: f64) -> Distribution {
    assert!(num_finite_buckets > 0, "number of finite buckets should be > 0");
    assert!(growth_factor > 1.0, "growth factor should be > 1.0");
    assert!(scale > 0.0, "scale should be > 0.0");
    Distribution {
        count: 0,
        mean: 0.0,
        minimum: 0.0,
        maximum: 0.0,
        sum_of_squared_deviation: 0.0,
        bucket_counts: vec![0; (num_finite_buckets + 2) as usize],
        bucket_option: BucketOption::Exponential {
            num_finite_buckets,
            growth_factor,
            scale,
        },
    }
}

/// Constructs a `Distribution` with linear buckets:
/// `(-inf, offset)`, then `num_finite_buckets` buckets of `width`, then an
/// overflow bucket.
pub fn create_linear(num_finite_buckets: i32, width: f64, offset: f64) -> Distribution {
    assert!(num_finite_buckets > 0, "number of finite buckets should be > 0");
    assert!(width > 0.0, "width should be > 0.0");
    Distribution {
        count: 0,
        mean: 0.0,
        minimum: 0.0,
        maximum: 0.0,
        sum_of_squared_deviation: 0.0,
        bucket_counts: vec![0; (num_finite_buckets + 2) as usize],
        bucket_option: BucketOption::Linear {
            num_finite_buckets,
            width,
            offset,
        },
    }
}

/// Constructs a `Distribution` with explicit bucket boundaries. `bounds`
/// need not be pre-sorted; duplicates are rejected.
pub fn create_explicit(bounds: impl IntoIterator<Item = f64>) -> Distribution {
    let mut safe_bounds: Vec<f64> = bounds.into_iter().collect();
    safe_bounds.sort_by(|a, b| a.partial_cmp(b).expect("bound is not NaN"));
    for w in safe_bounds.windows(2) {
        assert!(w[0] != w[1], "duplicate bound detected in explicit bucket bounds");
    }
    let len = safe_bounds.len();
    Distribution {
        count: 0,
        mean: 0.0,
        minimum: 0.0,
        maximum: 0.0,
        sum_of_squared_deviation: 0.0,
        bucket_counts: vec![0; len + 1],
        bucket_option: BucketOption::Explicit { bounds: safe_bounds },
    }
}
