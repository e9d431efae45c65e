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

//! The pluggable boundary between this crate and the actual control-plane
//! round trip. Nothing in `check_aggregator`/`quota_aggregator`/
//! `report_aggregator`/`scheduler` performs I/O directly; they all go
//! through a `Transport`.

#[cfg(feature = "http-transport")]
pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::{
    AllocateQuotaRequest, AllocateQuotaResponse, CheckRequest, CheckResponse, ReportRequest, ReportResponse,
};

/// Performs the three control-plane calls this crate aggregates in front
/// of. Implementations are responsible for their own retries, timeouts and
/// auth — this crate's aggregation logic never retries on their behalf.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn check(&self, req: CheckRequest) -> Result<CheckResponse>;
    async fn allocate_quota(&self, req: AllocateQuotaRequest) -> Result<AllocateQuotaResponse>;
    async fn report(&self, req: ReportRequest) -> Result<ReportResponse>;
}

/// A `Transport` that always succeeds with an empty response, useful for
/// tests and as a stand-in before a real transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn check(&self, _req: CheckRequest) -> Result<CheckResponse> {
        Ok(CheckResponse::ok())
    }

    async fn allocate_quota(&self, _req: AllocateQuotaRequest) -> Result<AllocateQuotaResponse> {
        Ok(AllocateQuotaResponse::default())
    }

    async fn report(&self, _req: ReportRequest) -> Result<ReportResponse> {
        Ok(ReportResponse::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Operation;

    #[tokio::test]
    async fn noop_transport_always_allows() {
        let transport = NoopTransport;
        let resp = transport
            .check(CheckRequest {
                service_name: "example.googleapis.com".into(),
                operation: Operation::new("library.googleapis.com/Read", "project:1"),
            })
            .await
            .unwrap();
        assert!(!resp.is_deny());
    }
}
