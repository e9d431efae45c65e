// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Client-side aggregation for a remote service-control API.
//!
//! Batches and deduplicates Check, AllocateQuota and Report calls in
//! memory so a caller sitting in front of a high-volume API surface
//! doesn't make one control-plane round trip per request. Three
//! independent caches (`check_aggregator`, `quota_aggregator`,
//! `report_aggregator`) each merge same-identity operations together; a
//! background `scheduler` periodically drains them through a pluggable
//! `transport::Transport`. The `client` module wraps all of it behind one
//! façade.
//!
//! This crate never performs the control-plane round trip itself — it
//! aggregates in front of whatever `Transport` the caller plugs in.

pub mod cache;
pub mod check_aggregator;
pub mod client;
pub mod clock;
pub mod config;
pub mod distribution;
pub mod error;
pub mod messages;
pub mod metric_value;
pub mod money;
pub mod operation;
pub mod quota_aggregator;
pub mod report_aggregator;
pub mod scheduler;
pub mod signing;
pub mod transport;

pub use cache::{BoundedCache, Eviction};
pub use check_aggregator::{CheckAggregator, CheckDecision};
pub use client::{Client, ClientEvent, ClientState};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::{CheckOptions, QuotaOptions, ReportOptions, ServiceControlConfig, CONFIG_ENV_VAR};
pub use error::{ControlError, Result};
pub use messages::{
    create_explicit, create_exponential, create_linear, AllocateQuotaRequest, AllocateQuotaResponse,
    BucketOption, CheckError, CheckRequest, CheckResponse, Distribution, Importance, LogEntry, LogPayload,
    LogSeverity, MetricKind, MetricValue, MetricValueData, MetricValueSet, Operation, ReportRequest,
    ReportResponse, Timestamp,
};
pub use money::Money;
pub use operation::OperationAggregator;
pub use quota_aggregator::{QuotaAggregator, QuotaDecision};
pub use report_aggregator::{ReportAggregator, ReportDecision, MAX_OPERATION_COUNT};
pub use scheduler::Scheduler;
pub use signing::{sign_check, sign_report};
pub use transport::{NoopTransport, Transport};
