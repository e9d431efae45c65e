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

//! Deterministic fingerprints used to bucket operations in the Check and
//! Report caches.
//!
//! Two operations that only differ in fields the aggregator will merge away
//! (timestamps, log entries, metric *values*) must hash identically. Two
//! that differ in anything the cache keys on must not.

use crate::messages::Operation;

const SEP: u8 = 0x00;

/// Fingerprint used as the Check cache key.
///
/// Covers `operation_name`, `consumer_id`, the sorted label pairs, and, for
/// each metric-value-set (sorted by metric name so that insertion order
/// never affects the signature), the metric name plus each value's sorted
/// labels — never the value itself, since two Check calls that only differ
/// in observed metric values should still hit the same cache entry.
pub fn sign_check(op: &Operation) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(op.operation_name.as_bytes());
    hasher.update(&[SEP]);
    hasher.update(op.consumer_id.as_bytes());
    hasher.update(&[SEP]);
    hash_sorted_labels(&mut hasher, &op.labels);

    let mut sets: Vec<&crate::messages::MetricValueSet> = op.metric_value_sets.iter().collect();
    sets.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
    for set in sets {
        hasher.update(&[SEP]);
        hasher.update(set.metric_name.as_bytes());
        for value in &set.metric_values {
            hasher.update(&[SEP]);
            hash_sorted_labels(&mut hasher, &value.labels);
        }
    }

    hex::encode(hasher.finalize().as_bytes())
}

/// Fingerprint used as the Report cache key.
///
/// Covers `consumer_id`, `operation_name`, and the sorted label pairs only —
/// no metric-value-sets at all, since Report's job is to merge every
/// operation sharing this identity into one running total.
pub fn sign_report(op: &Operation) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(op.consumer_id.as_bytes());
    hasher.update(&[SEP]);
    hasher.update(op.operation_name.as_bytes());
    hasher.update(&[SEP]);
    hash_sorted_labels(&mut hasher, &op.labels);
    hex::encode(hasher.finalize().as_bytes())
}

fn hash_sorted_labels(hasher: &mut blake3::Hasher, labels: &std::collections::BTreeMap<String, String>) {
    // BTreeMap already iterates in key order.
    for (k, v) in labels {
        hasher.update(k.as_bytes());
        hasher.update(&[SEP]);
        hasher.update(v.as_bytes());
        hasher.update(&[SEP]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MetricValue, MetricValueData, MetricValueSet, Operation};

    fn op_with_labels(labels: &[(&str, &str)]) -> Operation {
        let mut op = Operation::new("library.googleapis.com/Read", "project:1");
        for (k, v) in labels {
            op.labels.insert(k.to_string(), v.to_string());
        }
        op
    }

    #[test]
    fn check_signature_ignores_label_insertion_order() {
        let a = op_with_labels(&[("/protocol", "http"), ("/status", "200")]);
        let b = op_with_labels(&[("/status", "200"), ("/protocol", "http")]);
        assert_eq!(sign_check(&a), sign_check(&b));
    }

    #[test]
    fn check_signature_differs_on_different_labels() {
        let a = op_with_labels(&[("/status", "200")]);
        let b = op_with_labels(&[("/status", "500")]);
        assert_ne!(sign_check(&a), sign_check(&b));
    }

    #[test]
    fn check_signature_ignores_metric_value_but_not_metric_name() {
        let mut a = op_with_labels(&[]);
        a.metric_value_sets.push(MetricValueSet {
            metric_name: "serviceruntime.googleapis.com/api/request_count".into(),
            metric_values: vec![MetricValue::new(MetricValueData::Int64(1))],
        });
        let mut b = a.clone();
        b.metric_value_sets[0].metric_values[0].value = MetricValueData::Int64(42);
        assert_eq!(sign_check(&a), sign_check(&b));

        let mut c = a.clone();
        c.metric_value_sets[0].metric_name = "serviceruntime.googleapis.com/api/error_count".into();
        assert_ne!(sign_check(&a), sign_check(&c));
    }

    #[test]
    fn check_signature_ignores_metric_set_order() {
        let mut a = op_with_labels(&[]);
        a.metric_value_sets.push(MetricValueSet {
            metric_name: "b".into(),
            metric_values: vec![],
        });
        a.metric_value_sets.push(MetricValueSet {
            metric_name: "a".into(),
            metric_values: vec![],
        });
        let mut b = op_with_labels(&[]);
        b.metric_value_sets.push(MetricValueSet {
            metric_name: "a".into(),
            metric_values: vec![],
        });
        b.metric_value_sets.push(MetricValueSet {
            metric_name: "b".into(),
            metric_values: vec![],
        });
        assert_eq!(sign_check(&a), sign_check(&b));
    }

    #[test]
    fn report_signature_ignores_metric_value_sets_entirely() {
        let mut a = op_with_labels(&[("/status", "200")]);
        let mut b = a.clone();
        b.metric_value_sets.push(MetricValueSet {
            metric_name: "anything".into(),
            metric_values: vec![MetricValue::new(MetricValueData::Int64(7))],
        });
        assert_eq!(sign_report(&a), sign_report(&b));

        a.operation_name = "other.method".into();
        assert_ne!(sign_report(&a), sign_report(&b));
    }

    #[test]
    fn check_and_report_signatures_are_independent_namespaces() {
        let op = op_with_labels(&[("/status", "200")]);
        assert_ne!(sign_check(&op), sign_report(&op));
    }
}
