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

//! Merging two `MetricValue`s of the same metric, according to `MetricKind`.

use crate::distribution;
use crate::error::{ControlError, Result};
use crate::messages::{MetricKind, MetricValue, MetricValueData};

/// Merges `latest` into `prior`, returning the combined value.
///
/// - `Gauge`/`Cumulative`: the value with the later `end_time` wins; a tie
///   favors `prior` (the value already in the cache survives).
/// - `Delta`: numeric values are summed, distributions are merged
///   bucket-for-bucket, and timestamps widen to the union interval. `Bool`
///   and `String` deltas cannot be combined and are a caller error.
pub fn merge(kind: MetricKind, prior: MetricValue, latest: MetricValue) -> Result<MetricValue> {
    if prior.value.variant_tag() != latest.value.variant_tag() {
        return Err(ControlError::IncompatibleMerge(format!(
            "cannot merge metric values of kind {} and {}",
            prior.value.variant_tag(),
            latest.value.variant_tag()
        )));
    }
    match kind {
        MetricKind::Gauge | MetricKind::Cumulative => Ok(merge_latest_wins(prior, latest)),
        MetricKind::Delta => merge_delta(prior, latest),
    }
}

fn merge_latest_wins(prior: MetricValue, latest: MetricValue) -> MetricValue {
    match (prior.end_time, latest.end_time) {
        (Some(p), Some(l)) if l > p => latest,
        (None, Some(_)) => latest,
        _ => prior,
    }
}

fn merge_delta(mut prior: MetricValue, latest: MetricValue) -> Result<MetricValue> {
    prior.start_time = merge_timestamp(prior.start_time, latest.start_time, true);
    prior.end_time = merge_timestamp(prior.end_time, latest.end_time, false);

    prior.value = match (prior.value, latest.value) {
        (MetricValueData::Int64(a), MetricValueData::Int64(b)) => MetricValueData::Int64(a + b),
        (MetricValueData::Double(a), MetricValueData::Double(b)) => MetricValueData::Double(a + b),
        (MetricValueData::Distribution(mut a), MetricValueData::Distribution(b)) => {
            distribution::merge(&mut a, &b)?;
            MetricValueData::Distribution(a)
        }
        (a, b) => {
            return Err(ControlError::IncompatibleMerge(format!(
                "cannot merge delta metric values of kind {} and {}",
                a.variant_tag(),
                b.variant_tag()
            )))
        }
    };
    Ok(prior)
}

fn merge_timestamp(
    a: Option<crate::messages::Timestamp>,
    b: Option<crate::messages::Timestamp>,
    want_min: bool,
) -> Option<crate::messages::Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if want_min { a.min(b) } else { a.max(b) }),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Timestamp;

    fn ts(v: MetricValueData, start: i64, end: i64) -> MetricValue {
        MetricValue {
            start_time: Some(Timestamp::new(start, 0)),
            end_time: Some(Timestamp::new(end, 0)),
            labels: Default::default(),
            value: v,
        }
    }

    #[test]
    fn gauge_prefers_later_end_time() {
        let prior = ts(MetricValueData::Int64(1), 0, 10);
        let latest = ts(MetricValueData::Int64(2), 5, 20);
        let merged = merge(MetricKind::Gauge, prior, latest).unwrap();
        assert_eq!(merged.value, MetricValueData::Int64(2));
    }

    #[test]
    fn gauge_tie_favors_prior() {
        let prior = ts(MetricValueData::Int64(1), 0, 10);
        let latest = ts(MetricValueData::Int64(2), 0, 10);
        let merged = merge(MetricKind::Gauge, prior, latest).unwrap();
        assert_eq!(merged.value, MetricValueData::Int64(1));
    }

    #[test]
    fn gauge_rejects_mismatched_value_variants() {
        let prior = ts(MetricValueData::Int64(1), 0, 10);
        let latest = ts(MetricValueData::Double(2.0), 5, 20);
        assert!(merge(MetricKind::Gauge, prior, latest).is_err());
    }

    #[test]
    fn cumulative_rejects_mismatched_value_variants() {
        let prior = ts(MetricValueData::Bool(true), 0, 10);
        let latest = ts(MetricValueData::String("x".into()), 5, 20);
        assert!(merge(MetricKind::Cumulative, prior, latest).is_err());
    }

    #[test]
    fn delta_sums_int64_and_widens_timestamps() {
        let prior = ts(MetricValueData::Int64(3), 0, 10);
        let latest = ts(MetricValueData::Int64(4), 5, 20);
        let merged = merge(MetricKind::Delta, prior, latest).unwrap();
        assert_eq!(merged.value, MetricValueData::Int64(7));
        assert_eq!(merged.start_time, Some(Timestamp::new(0, 0)));
        assert_eq!(merged.end_time, Some(Timestamp::new(20, 0)));
    }

    #[test]
    fn delta_rejects_bool_values() {
        let prior = ts(MetricValueData::Bool(true), 0, 10);
        let latest = ts(MetricValueData::Bool(false), 0, 10);
        assert!(merge(MetricKind::Delta, prior, latest).is_err());
    }

    #[test]
    fn delta_merges_distributions() {
        let mut d1 = crate::messages::create_linear(4, 1.0, 0.0);
        distribution::add_sample(&mut d1, 0.5);
        let mut d2 = crate::messages::create_linear(4, 1.0, 0.0);
        distribution::add_sample(&mut d2, 1.5);

        let prior = ts(MetricValueData::Distribution(d1), 0, 10);
        let latest = ts(MetricValueData::Distribution(d2), 5, 20);
        let merged = merge(MetricKind::Delta, prior, latest).unwrap();
        match merged.value {
            MetricValueData::Distribution(d) => assert_eq!(d.count, 2),
            _ => panic!("expected distribution"),
        }
    }
}
