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

//! Combining two `Operation`s that share the same identity (Check) or are
//! destined for the same running total (Report).

use std::collections::HashMap;

use crate::error::Result;
use crate::messages::{MetricKind, MetricValueSet, Operation};
use crate::metric_value;

/// Merges operations sharing an identity into a running aggregate.
///
/// Needs a metric-name → `MetricKind` map to know how to combine individual
/// metric values; metrics absent from the map fall back to `MetricKind`'s
/// default (`Delta`), matching a plain numeric/distribution accumulator for
/// anything the caller hasn't described.
#[derive(Debug, Clone, Default)]
pub struct OperationAggregator {
    kinds: HashMap<String, MetricKind>,
}

impl OperationAggregator {
    pub fn new(kinds: HashMap<String, MetricKind>) -> Self {
        Self { kinds }
    }

    fn kind_of(&self, metric_name: &str) -> MetricKind {
        self.kinds.get(metric_name).copied().unwrap_or_default()
    }

    /// Merges `latest` into `prior` in place:
    /// - `start_time` becomes the earlier of the two, `end_time` the later
    /// - `log_entries` from `latest` are appended after `prior`'s, preserving
    ///   the order each arrived in
    /// - `metric_value_sets` are merged by `metric_name`; within a matching
    ///   set, values are matched by label-map equality and merged per their
    ///   `MetricKind`, otherwise appended as a new value in the set
    pub fn merge(&self, prior: &mut Operation, latest: Operation) -> Result<()> {
        if latest.start_time < prior.start_time {
            prior.start_time = latest.start_time;
        }
        if latest.end_time > prior.end_time {
            prior.end_time = latest.end_time;
        }
        prior.log_entries.extend(latest.log_entries);

        for incoming_set in latest.metric_value_sets {
            self.merge_metric_value_set(prior, incoming_set)?;
        }
        Ok(())
    }

    fn merge_metric_value_set(&self, prior: &mut Operation, incoming: MetricValueSet) -> Result<()> {
        let kind = self.kind_of(&incoming.metric_name);
        match prior
            .metric_value_sets
            .iter_mut()
            .find(|s| s.metric_name == incoming.metric_name)
        {
            Some(existing) => {
                for incoming_value in incoming.metric_values {
                    match existing
                        .metric_values
                        .iter()
                        .position(|v| v.labels == incoming_value.labels)
                    {
                        Some(idx) => {
                            let prior_value = existing.metric_values.remove(idx);
                            let merged = metric_value::merge(kind, prior_value, incoming_value)?;
                            existing.metric_values.insert(idx, merged);
                        }
                        None => existing.metric_values.push(incoming_value),
                    }
                }
            }
            None => prior.metric_value_sets.push(incoming),
        }
        Ok(())
    }
}
