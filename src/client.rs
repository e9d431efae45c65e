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

//! The façade most callers use: one `Client` wrapping the three aggregators
//! and the background scheduler behind `check`/`allocate_quota`/`report`.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::check_aggregator::{CheckAggregator, CheckDecision};
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceControlConfig;
use crate::error::{ControlError, Result};
use crate::messages::{
    AllocateQuotaRequest, AllocateQuotaResponse, CheckRequest, CheckResponse, ReportRequest, ReportResponse,
};
use crate::quota_aggregator::{QuotaAggregator, QuotaDecision};
use crate::report_aggregator::ReportAggregator;
use crate::scheduler::Scheduler;
use crate::transport::Transport;

/// The client's lifecycle. A brand-new client is `Init`; the first call to
/// `check`/`allocate_quota`/`report`/`start` moves it to `Running`; `stop`
/// moves it to `Stopped`, from which it never recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Call,
    Start,
    Stop,
}

#[derive(Debug, Error)]
pub enum InvalidTransition {
    #[error("client has been stopped and cannot be used again")]
    Stopped,
}

impl ClientState {
    pub fn transition(self, event: ClientEvent) -> std::result::Result<ClientState, InvalidTransition> {
        use ClientEvent::*;
        use ClientState::*;
        match (self, event) {
            (Stopped, _) => Err(InvalidTransition::Stopped),
            (_, Stop) => Ok(Stopped),
            (Init, Call) | (Init, Start) => Ok(Running),
            (Running, Call) | (Running, Start) => Ok(Running),
        }
    }
}

/// The aggregating client. Cheap to clone (everything it owns is behind an
/// `Arc`); typically constructed once per service and shared.
pub struct Client {
    state: RwLock<ClientState>,
    check: Arc<CheckAggregator>,
    quota: Arc<QuotaAggregator>,
    report: Arc<ReportAggregator>,
    scheduler: Arc<Scheduler>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(service_name: impl Into<String>, config: ServiceControlConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(service_name, config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service_name: impl Into<String>,
        config: ServiceControlConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let service_name = service_name.into();
        let check = Arc::new(CheckAggregator::new(service_name.clone(), config.check, clock.clone()));
        let quota = Arc::new(QuotaAggregator::new(service_name.clone(), config.quota, clock.clone()));
        let report = Arc::new(ReportAggregator::new(service_name, config.report, clock));
        let scheduler = Scheduler::new(
            check.clone(),
            quota.clone(),
            report.clone(),
            transport.clone(),
            config.report.flush_interval,
        );
        Self {
            state: RwLock::new(ClientState::Init),
            check,
            quota,
            report,
            scheduler,
            transport,
        }
    }

    /// Starts the background flush scheduler. Calling `check`/
    /// `allocate_quota`/`report` before `start` implicitly starts it too;
    /// call this explicitly if you want the scheduler running before the
    /// first real traffic arrives.
    pub async fn start(&self) -> Result<()> {
        self.advance(ClientEvent::Start).await?;
        self.scheduler.start().await;
        Ok(())
    }

    /// Stops the background flush scheduler. The client cannot be
    /// restarted afterward; every subsequent call returns
    /// [`ControlError::ClientStopped`].
    pub async fn stop(&self) -> Result<()> {
        self.advance(ClientEvent::Stop).await?;
        self.scheduler.stop().await;
        Ok(())
    }

    pub async fn check(&self, req: CheckRequest) -> Result<CheckResponse> {
        self.advance(ClientEvent::Call).await?;
        match self.check.check(&req)? {
            CheckDecision::Cached(resp) => Ok(resp),
            CheckDecision::SendNow => {
                let resp = self.transport.check(req.clone()).await?;
                self.check.add_response(&req, resp.clone());
                Ok(resp)
            }
        }
    }

    pub async fn allocate_quota(&self, req: AllocateQuotaRequest) -> Result<AllocateQuotaResponse> {
        self.advance(ClientEvent::Call).await?;
        match self.quota.allocate_quota(&req)? {
            QuotaDecision::Cached(resp) => Ok(resp),
            QuotaDecision::SendNow => {
                let resp = self.transport.allocate_quota(req.clone()).await?;
                self.quota.add_response(&req, resp.clone());
                Ok(resp)
            }
        }
    }

    pub async fn report(&self, req: ReportRequest) -> Result<ReportResponse> {
        self.advance(ClientEvent::Call).await?;
        match self.report.report(&req)? {
            crate::report_aggregator::ReportDecision::Buffered => Ok(ReportResponse::default()),
            crate::report_aggregator::ReportDecision::SendNow => {
                let flushed = self.report.flush();
                let mut last = ReportResponse::default();
                for batch in flushed {
                    last = self.transport.report(batch).await?;
                }
                Ok(last)
            }
        }
    }

    /// Advances the client's state machine. The very first call that isn't
    /// `Stop` moves `Init` to `Running`; when that transition happens here
    /// rather than through an explicit `start()`, this also starts the
    /// background scheduler, so `check`/`allocate_quota`/`report` calls made
    /// without ever calling `start()` still get flushed on schedule.
    async fn advance(&self, event: ClientEvent) -> Result<()> {
        let (previous, next) = {
            let mut state = self.state.write().await;
            let previous = *state;
            let next = state.transition(event).map_err(|_| ControlError::ClientStopped)?;
            *state = next;
            (previous, next)
        };
        if previous == ClientState::Init && next == ClientState::Running && event != ClientEvent::Start {
            self.scheduler.start().await;
        }
        Ok(())
    }
}
