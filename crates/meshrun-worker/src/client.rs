//! HTTP client for the coordinator's worker protocol.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use meshrun_core::protocol::{
    ClaimRequest, ClaimResponse, ClaimedJob, ErrorResponse, ReportAck, ReportRequest,
    UploadResponse,
};
use meshrun_core::{TaskId, Transition, WorkerId, IMAGE_TO_3D_TASK_TYPE};
use meshrun_engine::{ReportError, StatusReporter};

use crate::error::ClientError;

/// Client for `/tasks` endpoints, bound to one worker identity.
pub struct CoordinatorClient {
    inner: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    worker_id: WorkerId,
}

impl CoordinatorClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        worker_id: WorkerId,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            worker_id,
        })
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");
        let request = self.inner.post(url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Ask for the next job. `None` when nothing is claimable.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>, ClientError> {
        let body = ClaimRequest {
            worker_id: self.worker_id.clone(),
            task_type: IMAGE_TO_3D_TASK_TYPE.to_string(),
        };
        let response = self.post("/tasks/claim").json(&body).send().await?;
        let claim: ClaimResponse = parse(response).await?;
        Ok(claim.into_job())
    }

    /// Report a transition of a claimed task.
    pub async fn report(
        &self,
        task_id: &TaskId,
        transition: &Transition,
    ) -> Result<ReportAck, ClientError> {
        let body = ReportRequest::new(self.worker_id.clone(), transition);
        let response = self
            .post(&format!("/tasks/{task_id}"))
            .json(&body)
            .send()
            .await?;
        parse(response).await
    }

    /// Upload an artifact file and return the URL the coordinator serves it at.
    pub async fn upload(&self, task_id: &TaskId, path: &Path) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task_id.to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("taskId", task_id.to_string())
            .text("workerId", self.worker_id.to_string())
            .part("file", part);

        let response = self
            .post(&format!("/tasks/{task_id}/assets"))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = parse(response).await?;

        info!(task_id = %task_id, bytes = size, url = %uploaded.url, "Artifact uploaded");
        Ok(uploaded.url)
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl StatusReporter for CoordinatorClient {
    async fn report(&self, task_id: &TaskId, transition: Transition) -> Result<(), ReportError> {
        match CoordinatorClient::report(self, task_id, &transition).await {
            Ok(_) => Ok(()),
            Err(e @ ClientError::Api { .. }) => Err(ReportError::Rejected(e.to_string())),
            Err(e) => Err(ReportError::Transport(e.to_string())),
        }
    }
}
