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

//! Buffers and merges Report operations sharing an identity into a running
//! total, batching them into bounded-size `ReportRequest`s on flush.

use std::sync::Arc;

use crate::cache::{BoundedCache, Eviction};
use crate::clock::Clock;
use crate::config::ReportOptions;
use crate::error::{ControlError, Result};
use crate::messages::{Importance, Operation, ReportRequest};
use crate::operation::OperationAggregator;
use crate::signing::sign_report;

/// The largest number of operations one flushed `ReportRequest` may carry.
pub const MAX_OPERATION_COUNT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDecision {
    /// The call was folded into the running buffer; no immediate send is
    /// required.
    Buffered,
    /// At least one operation in the call was not `Low` importance, so the
    /// caller should flush immediately rather than wait for the next
    /// scheduled interval.
    SendNow,
}

pub struct ReportAggregator {
    service_name: String,
    cache: BoundedCache<String, Operation>,
    op_aggregator: OperationAggregator,
}

impl ReportAggregator {
    pub fn new(service_name: impl Into<String>, options: ReportOptions, clock: Arc<dyn Clock>) -> Self {
        // `ReportOptions` carries no separate expiration: an entry's TTL is
        // its own flush interval, so it settles up exactly when it would
        // otherwise have been due for a scheduled flush.
        let eviction = if options.flush_interval.is_zero() {
            Eviction::Lru
        } else {
            Eviction::Ttl(options.flush_interval)
        };
        let num_entries = options.num_entries.max(0) as usize;
        Self {
            service_name: service_name.into(),
            cache: BoundedCache::new(num_entries, eviction, clock),
            op_aggregator: OperationAggregator::default(),
        }
    }

    /// Folds every operation in `req` into the running buffer, keyed by
    /// `(consumer_id, operation_name, labels)`.
    ///
    /// Returns `SendNow` if any operation carries importance other than
    /// `Low` — such calls should reach the control plane without waiting
    /// for the next scheduled flush.
    pub fn report(&self, req: &ReportRequest) -> Result<ReportDecision> {
        validate(req)?;
        let mut send_now = false;
        for op in &req.operations {
            if op.importance != Importance::Low {
                send_now = true;
            }
            let key = sign_report(op);
            let mut merge_result: Result<()> = Ok(());
            let hit = self.cache.update_in_place(&key, |existing| {
                merge_result = self.op_aggregator.merge(existing, op.clone());
            });
            if hit {
                merge_result?;
            } else {
                self.cache.insert(key, op.clone());
            }
        }
        Ok(if send_now {
            ReportDecision::SendNow
        } else {
            ReportDecision::Buffered
        })
    }

    /// Drains every entry whose TTL (one flush interval) has elapsed into
    /// one or more `ReportRequest`s, each holding at most
    /// [`MAX_OPERATION_COUNT`] operations. An entry that hasn't aged out yet
    /// stays buffered for the next flush.
    pub fn flush(&self) -> Vec<ReportRequest> {
        self.cache.expire_now();
        let operations = self.cache.drain_out_queue();
        batch(&self.service_name, operations)
    }

    /// Drops every buffered operation, still-resident or already expired
    /// into the out-queue, and returns all of them as `ReportRequest`s —
    /// a best-effort settle-up for callers that are shutting down and can't
    /// wait for the normal flush cadence.
    pub fn clear(&self) -> Vec<ReportRequest> {
        let operations = self.cache.drain_all();
        batch(&self.service_name, operations)
    }
}

fn batch(service_name: &str, operations: Vec<Operation>) -> Vec<ReportRequest> {
    operations
        .chunks(MAX_OPERATION_COUNT)
        .map(|chunk| ReportRequest {
            service_name: service_name.to_string(),
            operations: chunk.to_vec(),
        })
        .collect()
}

fn validate(req: &ReportRequest) -> Result<()> {
    if req.service_name.is_empty() {
        return Err(ControlError::Validation("service_name must not be empty".to_string()));
    }
    if req.operations.is_empty() {
        return Err(ControlError::Validation("operations must not be empty".to_string()));
    }
    for op in &req.operations {
        if op.operation_name.is_empty() {
            return Err(ControlError::Validation("operation_name must not be empty".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::messages::{MetricValue, MetricValueData, MetricValueSet};

    fn req(consumer: &str, importance: Importance) -> ReportRequest {
        let mut op = Operation::new("library.googleapis.com/Read", consumer);
        op.importance = importance;
        ReportRequest {
            service_name: "example.googleapis.com".into(),
            operations: vec![op],
        }
    }

    #[test]
    fn low_importance_calls_are_buffered() {
        let agg = ReportAggregator::new(
            "example.googleapis.com",
            ReportOptions::default(),
            Arc::new(TestClock::new()),
        );
        let decision = agg.report(&req("project:1", Importance::Low)).unwrap();
        assert_eq!(decision, ReportDecision::Buffered);
    }

    #[test]
    fn any_non_low_operation_triggers_send_now() {
        let agg = ReportAggregator::new(
            "example.googleapis.com",
            ReportOptions::default(),
            Arc::new(TestClock::new()),
        );
        let decision = agg.report(&req("project:1", Importance::High)).unwrap();
        assert_eq!(decision, ReportDecision::SendNow);
    }

    #[test]
    fn repeated_calls_with_the_same_identity_merge_into_one_operation() {
        let clock = Arc::new(TestClock::new());
        let agg = ReportAggregator::new("example.googleapis.com", ReportOptions::default(), clock.clone());
        let mut r = req("project:1", Importance::Low);
        r.operations[0].metric_value_sets.push(MetricValueSet {
            metric_name: "serviceruntime.googleapis.com/api/request_count".into(),
            metric_values: vec![MetricValue::new(MetricValueData::Int64(1))],
        });
        agg.report(&r).unwrap();
        agg.report(&r).unwrap();

        clock.advance(ReportOptions::default().flush_interval);
        let flushed = agg.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].operations.len(), 1);
        let merged_value = &flushed[0].operations[0].metric_value_sets[0].metric_values[0];
        assert_eq!(merged_value.value, MetricValueData::Int64(2));
    }

    #[test]
    fn flush_does_not_yield_entries_still_within_the_flush_interval() {
        let clock = Arc::new(TestClock::new());
        let agg = ReportAggregator::new("example.googleapis.com", ReportOptions::default(), clock);
        agg.report(&req("project:1", Importance::Low)).unwrap();
        assert!(agg.flush().is_empty());
    }

    #[test]
    fn flush_batches_at_max_operation_count() {
        let clock = Arc::new(TestClock::new());
        let interval = std::time::Duration::from_secs(1);
        let agg = ReportAggregator::new("example.googleapis.com", ReportOptions::new(10_000, interval), clock.clone());
        for i in 0..(MAX_OPERATION_COUNT + 10) {
            agg.report(&req(&format!("project:{i}"), Importance::Low)).unwrap();
        }
        clock.advance(interval);
        let flushed = agg.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].operations.len(), MAX_OPERATION_COUNT);
        assert_eq!(flushed[1].operations.len(), 10);
    }

    #[test]
    fn flush_empties_the_buffer() {
        let clock = Arc::new(TestClock::new());
        let agg = ReportAggregator::new("example.googleapis.com", ReportOptions::default(), clock.clone());
        agg.report(&req("project:1", Importance::Low)).unwrap();
        clock.advance(ReportOptions::default().flush_interval);
        assert_eq!(agg.flush().len(), 1);
        assert!(agg.flush().is_empty());
    }

    #[test]
    fn clear_returns_every_resident_operation_even_before_its_flush_interval() {
        let agg = ReportAggregator::new(
            "example.googleapis.com",
            ReportOptions::default(),
            Arc::new(TestClock::new()),
        );
        agg.report(&req("project:1", Importance::Low)).unwrap();
        agg.report(&req("project:2", Importance::Low)).unwrap();

        let cleared = agg.clear();
        let total: usize = cleared.iter().map(|r| r.operations.len()).sum();
        assert_eq!(total, 2);
        assert!(agg.flush().is_empty());
    }

    #[test]
    fn merging_a_repeated_identity_preserves_its_original_position_and_ttl() {
        let clock = Arc::new(TestClock::new());
        let agg = ReportAggregator::new("example.googleapis.com", ReportOptions::default(), clock.clone());

        agg.report(&req("project:A", Importance::Low)).unwrap();
        agg.report(&req("project:B", Importance::Low)).unwrap();
        agg.report(&req("project:C", Importance::Low)).unwrap();
        // Re-reporting A merges it in place rather than re-inserting it, so
        // it must neither reset its TTL nor move to the back of eviction
        // order.
        agg.report(&req("project:A", Importance::Low)).unwrap();

        clock.advance(ReportOptions::default().flush_interval);
        let flushed = agg.flush();
        let consumers: Vec<&str> = flushed
            .iter()
            .flat_map(|r| r.operations.iter())
            .map(|op| op.consumer_id.as_str())
            .collect();
        assert_eq!(consumers, vec!["project:A", "project:B", "project:C"]);
    }
}
