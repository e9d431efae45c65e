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

//! Online statistics and merging for `Distribution`.

use crate::error::{ControlError, Result};
use crate::messages::{BucketOption, Distribution};

const EPSILON: f64 = 1e-5;

/// Folds one more observation into `dist` using Welford's online
/// mean/variance recurrence, and bumps the bucket its value falls into.
pub fn add_sample(dist: &mut Distribution, sample: f64) {
    if dist.count == 0 {
        dist.minimum = sample;
        dist.maximum = sample;
    } else {
        dist.minimum = dist.minimum.min(sample);
        dist.maximum = dist.maximum.max(sample);
    }

    dist.count += 1;
    let dev = sample - dist.mean;
    dist.mean += dev / dist.count as f64;
    dist.sum_of_squared_deviation += dev * (sample - dist.mean);

    let index = bucket_index(&dist.bucket_option, sample);
    dist.bucket_counts[index] += 1;
}

fn bucket_index(opt: &BucketOption, sample: f64) -> usize {
    match opt {
        BucketOption::Exponential {
            num_finite_buckets,
            growth_factor,
            scale,
        } => {
            if sample <= *scale {
                0
            } else {
                let raw = 1 + (sample / scale).log(*growth_factor).floor() as i64;
                raw.min((*num_finite_buckets + 1) as i64).max(0) as usize
            }
        }
        BucketOption::Linear {
            num_finite_buckets,
            width,
            offset,
        } => {
            if sample < *offset {
                0
            } else {
                let raw = ((sample - offset) / width).floor() as i64 + 1;
                raw.min((*num_finite_buckets + 1) as i64).max(0) as usize
            }
        }
        BucketOption::Explicit { bounds } => {
            // bisect_right: first index whose bound is > sample.
            match bounds.binary_search_by(|b| b.partial_cmp(&sample).unwrap()) {
                Ok(mut i) => {
                    // binary_search can land on any matching index; advance
                    // past all equal bounds to match bisect_right.
                    while i < bounds.len() && bounds[i] <= sample {
                        i += 1;
                    }
                    i
                }
                Err(i) => i,
            }
        }
    }
}

/// Merges `from` into `into` in place, combining counts, running statistics
/// and bucket counts. Fails if the two distributions don't share the same
/// bucketing scheme.
pub fn merge(into: &mut Distribution, from: &Distribution) -> Result<()> {
    if !bucket_options_nearly_equal(&into.bucket_option, &from.bucket_option) {
        return Err(ControlError::IncompatibleMerge(
            "distributions have different bucket options".to_string(),
        ));
    }
    if into.bucket_counts.len() != from.bucket_counts.len() {
        return Err(ControlError::IncompatibleMerge(
            "distributions have different bucket counts length".to_string(),
        ));
    }

    if from.count == 0 {
        return Ok(());
    }
    if into.count == 0 {
        into.count = from.count;
        into.mean = from.mean;
        into.minimum = from.minimum;
        into.maximum = from.maximum;
        into.sum_of_squared_deviation = from.sum_of_squared_deviation;
    } else {
        let total = into.count + from.count;
        let delta = from.mean - into.mean;
        let new_mean = into.mean + delta * (from.count as f64 / total as f64);
        into.sum_of_squared_deviation += from.sum_of_squared_deviation
            + delta * delta * (into.count as f64 * from.count as f64 / total as f64);
        into.mean = new_mean;
        into.count = total;
        into.minimum = into.minimum.min(from.minimum);
        into.maximum = into.maximum.max(from.maximum);
    }

    for (a, b) in into.bucket_counts.iter_mut().zip(from.bucket_counts.iter()) {
        *a += b;
    }
    Ok(())
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn bucket_options_nearly_equal(a: &BucketOption, b: &BucketOption) -> bool {
    match (a, b) {
        (
            BucketOption::Linear {
                num_finite_buckets: n1,
                width: w1,
                offset: o1,
            },
            BucketOption::Linear {
                num_finite_buckets: n2,
                width: w2,
                offset: o2,
            },
        ) => n1 == n2 && nearly_equal(*w1, *w2) && nearly_equal(*o1, *o2),
        (
            BucketOption::Exponential {
                num_finite_buckets: n1,
                growth_factor: g1,
                scale: s1,
            },
            BucketOption::Exponential {
                num_finite_buckets: n2,
                growth_factor: g2,
                scale: s2,
            },
        ) => n1 == n2 && nearly_equal(*g1, *g2) && nearly_equal(*s1, *s2),
        (BucketOption::Explicit { bounds: b1 }, BucketOption::Explicit { bounds: b2 }) => {
            b1.len() == b2.len() && b1.iter().zip(b2.iter()).all(|(x, y)| nearly_equal(*x, *y))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{create_explicit, create_exponential, create_linear};

    #[test]
    fn add_sample_tracks_min_max_count() {
        let mut d = create_linear(4, 1.0, 0.0);
        add_sample(&mut d, 0.5);
        add_sample(&mut d, 3.5);
        add_sample(&mut d, -1.0);
        assert_eq!(d.count, 3);
        assert_eq!(d.minimum, -1.0);
        assert_eq!(d.maximum, 3.5);
    }

    #[test]
    fn add_sample_welford_mean_matches_simple_average() {
        let mut d = create_linear(10, 1.0, 0.0);
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        for s in samples {
            add_sample(&mut d, s);
        }
        assert!((d.mean - 3.0).abs() < 1e-9);
    }

    #[test]
    fn linear_bucket_index_handles_underflow_and_overflow() {
        let mut d = create_linear(2, 1.0, 0.0);
        add_sample(&mut d, -5.0); // underflow -> bucket 0
        add_sample(&mut d, 0.5); // bucket 1
        add_sample(&mut d, 1.5); // bucket 2
        add_sample(&mut d, 50.0); // overflow -> last bucket
        assert_eq!(d.bucket_counts, vec![1, 1, 1, 1]);
    }

    #[test]
    fn exponential_bucket_index_treats_scale_as_inclusive_floor() {
        let mut d = create_exponential(3, 2.0, 1.0);
        add_sample(&mut d, 1.0); // == scale -> bucket 0
        add_sample(&mut d, 1.5); // > scale -> bucket 1
        add_sample(&mut d, 1000.0); // overflow -> last bucket
        assert_eq!(d.bucket_counts, vec![1, 1, 0, 0, 1]);
    }

    #[test]
    fn explicit_bucket_index_uses_bisect_right_semantics() {
        let mut d = create_explicit(vec![1.0, 2.0, 3.0]);
        add_sample(&mut d, 1.0); // bisect_right(1.0) == 1
        add_sample(&mut d, 2.5);
        add_sample(&mut d, 10.0);
        assert_eq!(d.bucket_counts, vec![0, 1, 1, 1]);
    }

    #[test]
    fn merge_combines_counts_and_buckets() {
        let mut a = create_linear(4, 1.0, 0.0);
        add_sample(&mut a, 0.5);
        add_sample(&mut a, 1.5);

        let mut b = create_linear(4, 1.0, 0.0);
        add_sample(&mut b, 0.5);

        merge(&mut a, &b).unwrap();
        assert_eq!(a.count, 3);
        assert_eq!(a.bucket_counts.iter().sum::<i64>(), 3);
    }

    #[test]
    fn merge_rejects_mismatched_bucket_options() {
        let mut a = create_linear(4, 1.0, 0.0);
        add_sample(&mut a, 0.5);
        let mut b = create_linear(5, 1.0, 0.0);
        add_sample(&mut b, 0.5);
        assert!(merge(&mut a, &b).is_err());
    }

    #[test]
    fn merge_into_empty_copies_statistics() {
        let mut a = create_linear(4, 1.0, 0.0);
        let mut b = create_linear(4, 1.0, 0.0);
        add_sample(&mut b, 2.5);
        merge(&mut a, &b).unwrap();
        assert_eq!(a.count, 1);
        assert!((a.mean - 2.5).abs() < 1e-9);
    }
}
