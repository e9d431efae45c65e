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

//! Caches Check responses keyed by operation identity, so repeated calls to
//! the same (consumer, operation, labels) don't each round-trip the
//! control plane.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{BoundedCache, Eviction};
use crate::clock::Clock;
use crate::config::CheckOptions;
use crate::error::{ControlError, Result};
use crate::messages::{CheckRequest, CheckResponse, Importance, Operation};
use crate::operation::OperationAggregator;
use crate::signing::sign_check;

/// What a caller should do with a Check call.
#[derive(Debug, Clone)]
pub enum CheckDecision {
    /// Serve this cached response without contacting the control plane.
    Cached(CheckResponse),
    /// No usable cache entry; the caller must perform the real Check call
    /// and report the result back via [`CheckAggregator::add_response`].
    SendNow,
}

struct CachedCheckItem {
    last_check_time: Option<Instant>,
    /// Unused placeholder kept for parity with the reference client, which
    /// never finished wiring per-entry quota scaling into Check caching.
    #[allow(dead_code)]
    quota_scale: i64,
    is_flushing: bool,
    response: CheckResponse,
    /// Operations merged in since the last refresh was sent, replayed as a
    /// `CheckRequest` once this entry's TTL finally expires it out of the
    /// cache. `None` until the first cache hit for this signature.
    pending: Option<Operation>,
}

/// Caches and merges Check calls, deciding per-call whether a cached
/// response is still usable or a fresh control-plane call is required.
pub struct CheckAggregator {
    service_name: String,
    cache: BoundedCache<String, CachedCheckItem>,
    options: CheckOptions,
    clock: Arc<dyn Clock>,
    op_aggregator: OperationAggregator,
}

impl CheckAggregator {
    pub fn new(service_name: impl Into<String>, options: CheckOptions, clock: Arc<dyn Clock>) -> Self {
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

    /// Decides whether `req` can be served from cache.
    ///
    /// `High`-importance operations and operations on a disabled cache
    /// always return [`CheckDecision::SendNow`]; a signature not yet in the
    /// cache also returns `SendNow` without creating an entry — entries are
    /// only created by [`CheckAggregator::add_response`], once a real
    /// response exists to cache.
    pub fn check(&self, req: &CheckRequest) -> Result<CheckDecision> {
        validate(&self.service_name, req)?;
        if req.operation.importance == Importance::High || self.cache.is_disabled() {
            return Ok(CheckDecision::SendNow);
        }

        let key = sign_check(&req.operation);
        let mut decision = None;
        let hit = self.cache.update_in_place(&key, |item| {
            decision = Some(self.handle_cached_response(item, req));
        });
        Ok(if hit { decision.expect("set when hit is true") } else { CheckDecision::SendNow })
    }

    /// Records a real Check response for the signature of `req`, so
    /// subsequent calls with the same identity can be served from cache.
    pub fn add_response(&self, req: &CheckRequest, response: CheckResponse) {
        let key = sign_check(&req.operation);
        let now = self.clock.now();
        match self.cache.get(&key) {
            None => {
                self.cache.insert(
                    key,
                    CachedCheckItem {
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

    /// Returns a `CheckRequest` for every entry whose TTL (`expiration`)
    /// has elapsed and which still carries merged-in observations, so they
    /// are not lost when the entry falls out of the cache. Entries with no
    /// pending observations are silently dropped — they had nothing left to
    /// settle up.
    pub fn flush(&self) -> Vec<CheckRequest> {
        self.cache.expire_now();
        self.cache
            .drain_out_queue()
            .into_iter()
            .filter_map(|item| {
                item.pending.map(|operation| CheckRequest {
                    service_name: self.service_name.clone(),
                    operation,
                })
            })
            .collect()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Handles a cache hit: a denied response is never trusted to still
    /// hold (policy can change faster than an allow decision matters), so
    /// it always triggers a refresh once `flush_interval` elapses; an
    /// allowed response merges `req`'s operation into the pending
    /// settle-up request and is itself refreshed on the same cadence.
    fn handle_cached_response(&self, item: &mut CachedCheckItem, req: &CheckRequest) -> CheckDecision {
        if item.response.is_deny() {
            if self.is_current(item) {
                return CheckDecision::Cached(item.response.clone());
            }
            item.last_check_time = Some(self.clock.now());
            return CheckDecision::SendNow;
        }

        match &mut item.pending {
            Some(acc) => {
                if let Err(err) = self.op_aggregator.merge(acc, req.operation.clone()) {
                    tracing::warn!(error = %err, "dropping unmergeable check operation");
                }
            }
            None => item.pending = Some(req.operation.clone()),
        }

        if self.is_current(item) {
            return CheckDecision::Cached(item.response.clone());
        }
        if item.is_flushing {
            tracing::warn!("last refresh request did not complete");
        }
        item.is_flushing = true;
        item.last_check_time = Some(self.clock.now());
        CheckDecision::SendNow
    }

    fn is_current(&self, item: &CachedCheckItem) -> bool {
        match item.last_check_time {
            None => false,
            Some(t) => self.clock.now().saturating_duration_since(t) < self.options.flush_interval,
        }
    }
}

fn validate(service_name: &str, req: &CheckRequest) -> Result<()> {
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
