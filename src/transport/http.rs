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

//! A reference `Transport` that speaks JSON over HTTP. One concrete worked
//! example, not a dependency of the aggregation engine itself — only built
//! when the `http-transport` feature is enabled.

use async_trait::async_trait;
use reqwest::Client;

use super::Transport;
use crate::error::{ControlError, Result};
use crate::messages::{
    AllocateQuotaRequest, AllocateQuotaResponse, CheckRequest, CheckResponse, ReportRequest, ReportResponse,
};

/// Posts each request as JSON to `{base_url}/check`, `{base_url}/quota` and
/// `{base_url}/report` respectively, and expects a JSON response body of
/// the matching response type.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn post_json<Req: serde::Serialize + Sync, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let resp = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        resp.json::<Resp>()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn check(&self, req: CheckRequest) -> Result<CheckResponse> {
        self.post_json("check", &req).await
    }

    async fn allocate_quota(&self, req: AllocateQuotaRequest) -> Result<AllocateQuotaResponse> {
        self.post_json("quota", &req).await
    }

    async fn report(&self, req: ReportRequest) -> Result<ReportResponse> {
        self.post_json("report", &req).await
    }
}
