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

//! Periodically flushes the three aggregators to a [`Transport`].
//!
//! Ships two ways to drive a flush: a background `tokio` task for normal
//! operation, and a synchronous [`Scheduler::pump`] for callers that want
//! to drive flushing themselves (tests, or an embedder with its own event
//! loop) without spinning up a Tokio runtime task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::check_aggregator::CheckAggregator;
use crate::quota_aggregator::QuotaAggregator;
use crate::report_aggregator::ReportAggregator;
use crate::transport::Transport;

pub struct Scheduler {
    check: Arc<CheckAggregator>,
    quota: Arc<QuotaAggregator>,
    report: Arc<ReportAggregator>,
    transport: Arc<dyn Transport>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        check: Arc<CheckAggregator>,
        quota: Arc<QuotaAggregator>,
        report: Arc<ReportAggregator>,
        transport: Arc<dyn Transport>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            check,
            quota,
            report,
            transport,
            interval,
            task: Mutex::new(None),
        })
    }

    /// Drains and dispatches everything currently due on all three
    /// aggregators exactly once. I/O happens outside any cache lock: each
    /// aggregator's `flush()` call returns owned requests before this
    /// method ever touches the transport.
    pub async fn pump(&self) {
        for req in self.check.flush() {
            match self.transport.check(req.clone()).await {
                Ok(resp) => self.check.add_response(&req, resp),
                Err(err) => tracing::warn!(error = %err, "check flush failed"),
            }
        }

        for req in self.quota.flush() {
            match self.transport.allocate_quota(req.clone()).await {
                Ok(resp) => self.quota.add_response(&req, resp),
                Err(err) => tracing::warn!(error = %err, "quota flush failed"),
            }
        }

        for req in self.report.flush() {
            if let Err(err) = self.transport.report(req).await {
                tracing::warn!(error = %err, "report flush failed");
            }
        }
    }

    /// Starts a background task that calls `pump` every `interval` until
    /// `stop` is called. Starting an already-started scheduler is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }
        let scheduler = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(scheduler.interval).await;
                scheduler.pump().await;
            }
        }));
    }

    /// Whether the background flush task is currently running.
    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Stops the background task, if running, then drains every operation
    /// still buffered in the report aggregator and delivers it best-effort
    /// through the transport. Check and Quota caches are simply abandoned —
    /// unlike Report, neither one accumulates data that is lost if it isn't
    /// sent before shutdown. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        for req in self.report.clear() {
            if let Err(err) = self.transport.report(req).await {
                tracing::warn!(error = %err, "best-effort report flush on shutdown failed");
            }
        }
    }
}
