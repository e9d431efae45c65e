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

//! Caches AllocateQuota responses. Structurally the same machine as
//! [`crate::check_aggregator::CheckAggregator`] — quota allocation caching
//! follows the Check design rather than inventing a second one.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{BoundedCache, Eviction};
use crate::clock::Clock;
use crate::config::QuotaOptions;
use crate::error::{ControlError, Result};
use crate::messages::{AllocateQuotaRequest, AllocateQuotaResponse, Importance, Operation};
use crate::operation::OperationAggregator;
use crate::signing::sign_check;

#[derive(Debug, Clone)]
pub enum QuotaDecision {
    Cached(AllocateQuotaResponse),
    SendNow,
}

struct CachedQuotaItem {
    last_check_time: Option<Instant>,
    /// Unused placeholder kept for parity with the reference client, which
    /// never finished wiring per-entry quota scaling into caching.
    #[allow(dead_code)]
    quota_scale: i64,
    is_flushing: bool,
    response: AllocateQuotaResponse,
    /// Operations merged in since the last refresh was sent, replayed as an
    /// `AllocateQuotaRequest` once this entry's TTL finally expires it out of
    /// the cache. `None` until the first cache hit for this signature.
    pending: Option<Operation>,
}

/// Caches and merges AllocateQuota calls. Structurally the same machine as
/// [`crate::check_aggregator::CheckAggregator`].
pub struct QuotaAggregator {
    service_name: String,
    cache: BoundedCache<String, CachedQuotaItem>,
    options: QuotaOptions,
    clock: Arc<dyn Clock>,
    op_aggregator: OperationAggregator,
}

impl QuotaAggregator {
    pub fn new(service_name: impl Into<String>, options: QuotaOptions, clock: Arc<dyn Clock>) -> Self {
        let eviction = if options.flush_interval.is_zero() {
            Eviction::Lru
        } else {
            Eviction::Ttl(options.expiration)
        };
        let num_entries = options.num_entries.max(0) as usize;
        Self {
            service_name: service_name.into(),
            cache: BoundedCache::new(num_entries, eviction, clock.clone()),
            options,
            clock,
            op_aggregator: OperationAggregator::default(),
        }
    }

    /// Decides whether `req` can be served from cache. A signature not yet
    /// in the cache returns `SendNow` without creating an entry; entries are
    /// only created by [`QuotaAggregator::add_response`].
    pub fn allocate_quota(&self, req: &AllocateQuotaRequest) -> Result<QuotaDecision> {
        validate(&self.service_name, req)?;
        if req.operation.importance == Importance::High || self.cache.is_disabled() {
            return Ok(QuotaDecision::SendNow);
        }

        let key = sign_check(&req.operation);
        let mut decision = None;
        let hit = self.cache.update_in_place(&key, |item| {
            decision = Some(self.handle_cached_response(item, req));
        });
        Ok(if hit { decision.expect("set when hit is true") } else { QuotaDecision::SendNow })
    }

    pub fn add_response(&self, req: &AllocateQuotaRequest, response: AllocateQuotaResponse) {
        let key = sign_check(&req.operation);
        let now = self.clock.now();
        match self.cache.get(&key) {
            None => {
                self.cache.insert(
                    key,
                    CachedQuotaItem {
                        last_check_time: Some(now),
                        quota_scale: 0,
                        is_flushing: false,
                        response,
                        pending: None,
                    },
                );
            }
            Some(mut item) => {
                item.last_check_time = Some(now);
                item.response = response;
                item.is_flushing = false;
                self.cache.insert(key, item);
            }
        }
    }

    /// Returns an `AllocateQuotaRequest` for every entry whose TTL
    /// (`expiration`) has elapsed and which still carries merged-in
    /// observations.
    pub fn flush(&self) -> Vec<AllocateQuotaRequest> {
        self.cache.expire_now();
        self.cache
            .drain_out_queue()
            .into_iter()
            .filter_map(|item| {
                item.pending.map(|operation| AllocateQuotaRequest {
                    service_name: self.service_name.clone(),
                    operation,
                })
            })
            .collect()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn handle_cached_response(&self, item: &mut CachedQuotaItem, req: &AllocateQuotaRequest) -> QuotaDecision {
        if !item.response.allocate_errors.is_empty() {
            if self.is_current(item) {
                return QuotaDecision::Cached(item.response.clone());
            }
            item.last_check_time = Some(self.clock.now());
            return QuotaDecision::SendNow;
        }

        match &mut item.pending {
            Some(acc) => {
                if let Err(err) = self.op_aggregator.merge(acc, req.operation.clone()) {
                    tracing::warn!(error = %err, "dropping unmergeable quota operation");
                }
            }
            None => item.pending = Some(req.operation.clone()),
        }

        if self.is_current(item) {
            return QuotaDecision::Cached(item.response.clone());
        }
        if item.is_flushing {
            tracing::warn!("last refresh request did not complete");
        }
        item.is_flushing = true;
        item.last_check_time = Some(self.clock.now());
        QuotaDecision::SendNow
    }

    fn is_current(&self, item: &CachedQuotaItem) -> bool {
        match item.last_check_time {
            None => false,
            Some(t) => self.clock.now().saturating_duration_since(t) < self.options.flush_interval,
        }
    }
}

fn validate(service_name: &str, req: &AllocateQuotaRequest) -> Result<()> {
    if req.service_name.is_empty() {
        return Err(ControlError::Validation("service_name must not be empty".to_string()));
    }
    if req.service_name != service_name {
        return Err(ControlError::Validation(format!(
            "service_name {} does not match {}",
            req.service_name, service_name
        )));
    }
    if req.operation.operation_name.is_empty() {
        return Err(ControlError::Validation("operation_name must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::messages::Operation;

    fn req(consumer: &str) -> AllocateQuotaRequest {
        AllocateQuotaRequest {
            service_name: "example.googleapis.com".into(),
            operation: Operation::new("library.googleapis.com/Read", consumer),
        }
    }

    fn aggregator(options: QuotaOptions, clock: Arc<dyn crate::clock::Clock>) -> QuotaAggregator {
        QuotaAggregator::new("example.googleapis.com", options, clock)
    }

    #[test]
    fn first_allocation_for_an_identity_always_sends_now() {
        let agg = aggregator(QuotaOptions::default(), Arc::new(TestClock::new()));
        assert!(matches!(agg.allocate_quota(&req("project:1")).unwrap(), QuotaDecision::SendNow));
    }

    #[test]
    fn a_miss_does_not_create_a_cache_entry() {
        let agg = aggregator(QuotaOptions::default(), Arc::new(TestClock::new()));
        agg.allocate_quota(&req("project:1")).unwrap();
        assert_eq!(agg.flush().len(), 0);
    }

    #[test]
    fn cached_allow_is_served_within_expiration() {
        let agg = aggregator(QuotaOptions::default(), Arc::new(TestClock::new()));
        let r = req("project:1");
        agg.allocate_quota(&r).unwrap();
        agg.add_response(&r, AllocateQuotaResponse::default());
        assert!(matches!(
            agg.allocate_quota(&r).unwrap(),
            QuotaDecision::Cached(_)
        ));
    }

    #[test]
    fn rejects_requests_for_a_different_service() {
        let agg = aggregator(QuotaOptions::default(), Arc::new(TestClock::new()));
        let mut r = req("project:1");
        r.service_name = "other.googleapis.com".into();
        assert!(agg.allocate_quota(&r).is_err());
    }
}
