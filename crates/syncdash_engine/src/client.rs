use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use syncdash_core::{
    ActiveTasks, Instance, InstanceId, ProductSyncStats, QueueStats, SummaryWindow, TaskStatus,
    TaskSubmission, TaskSummary,
};
use syncdash_logging::sync_debug;

use crate::wire::{
    error_detail, ActiveTasksWire, InstanceWire, LoginWire, ProductSyncStatsWire, QueueStatsWire,
    SubmissionWire, TaskInfoWire, TaskSummaryWire,
};
use crate::{ApiError, ApiErrorKind};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    /// Bearer token sent with every request except login.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_response_bytes: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_response_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Remote sync backend. Everything the dashboard knows about tasks and
/// instances comes through here.
#[async_trait::async_trait]
pub trait SyncApi: Send + Sync {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError>;

    async fn cancel_task(&self, task_id: &str) -> Result<(), ApiError>;

    async fn list_instances(&self) -> Result<Vec<Instance>, ApiError>;

    /// `Ok(None)` when the backend has no active instance.
    async fn active_instance(&self) -> Result<Option<Instance>, ApiError>;

    async fn activate_instance(&self, id: InstanceId) -> Result<Instance, ApiError>;

    /// Posts `payload` to a sync endpoint such as `/api/v1/sync/products`.
    async fn submit_sync(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskSubmission, ApiError>;

    async fn active_tasks(&self) -> Result<ActiveTasks, ApiError>;

    async fn queue_stats(&self) -> Result<QueueStats, ApiError>;

    async fn task_summary(&self, window: SummaryWindow) -> Result<TaskSummary, ApiError>;

    async fn product_sync_stats(&self) -> Result<ProductSyncStats, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSyncApi {
    settings: ClientSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestSyncApi {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| ApiError::new(ApiErrorKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::new(
                ApiErrorKind::InvalidUrl,
                format!("{} cannot be used as a base url", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(ApiErrorKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Exchanges credentials for an access token (OAuth2 password form).
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", username)
            .append_pair("password", password)
            .finish();
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form);
        let body = self.execute(request).await?;
        let login: LoginWire = decode(&body)?;
        Ok(login.access_token)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::new(ApiErrorKind::InvalidUrl, "base url has no path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url).header(ACCEPT, "application/json");
        match self.settings.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let body = self.execute(self.request(Method::GET, url)).await?;
        decode(&body)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let max_bytes = self.settings.max_response_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ApiError::new(
                    ApiErrorKind::TooLarge { max_bytes },
                    format!("{content_len} bytes announced"),
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ApiError::new(
                    ApiErrorKind::TooLarge { max_bytes },
                    "response body exceeded limit",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl SyncApi for ReqwestSyncApi {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let wire: TaskInfoWire = self.get(&["api", "v1", "sync", "tasks", task_id]).await?;
        wire.into_status()
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "v1", "sync", "tasks", task_id, "cancel"])?;
        self.execute(self.request(Method::DELETE, url)).await?;
        sync_debug!("Cancel accepted for task {}", task_id);
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>, ApiError> {
        let wire: Vec<InstanceWire> = self.get(&["api", "v1", "instances"]).await?;
        Ok(wire.into_iter().map(Instance::from).collect())
    }

    async fn active_instance(&self) -> Result<Option<Instance>, ApiError> {
        match self
            .get::<Option<InstanceWire>>(&["api", "v1", "instances", "active"])
            .await
        {
            Ok(wire) => Ok(wire.map(Instance::from)),
            Err(err) if err.kind == ApiErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn activate_instance(&self, id: InstanceId) -> Result<Instance, ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "v1", "instances", id.as_str(), "activate"])?;
        let body = self.execute(self.request(Method::PATCH, url)).await?;
        let wire: InstanceWire = decode(&body)?;
        Ok(wire.into())
    }

    async fn submit_sync(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> Result<TaskSubmission, ApiError> {
        let segments: Vec<&str> = endpoint
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            return Err(ApiError::new(ApiErrorKind::InvalidUrl, "empty sync endpoint"));
        }
        let url = self.endpoint(&segments)?;
        let body = serde_json::to_vec(payload)
            .map_err(|err| ApiError::new(ApiErrorKind::Decode, err.to_string()))?;
        let request = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.execute(request).await?;
        let wire: SubmissionWire = decode(&response)?;
        Ok(wire.into())
    }

    async fn active_tasks(&self) -> Result<ActiveTasks, ApiError> {
        let wire: ActiveTasksWire = self
            .get(&["api", "v1", "sync", "tasks", "active", "all"])
            .await?;
        Ok(wire.into())
    }

    async fn queue_stats(&self) -> Result<QueueStats, ApiError> {
        let wire: QueueStatsWire = self.get(&["api", "v1", "sync", "queues", "stats"]).await?;
        Ok(wire.into())
    }

    async fn task_summary(&self, window: SummaryWindow) -> Result<TaskSummary, ApiError> {
        let mut url = self.endpoint(&["api", "v1", "sync", "tasks", "summary", "stats"])?;
        url.query_pairs_mut()
            .append_pair("hours", &window.hours().to_string());
        let body = self.execute(self.request(Method::GET, url)).await?;
        let wire: TaskSummaryWire = decode(&body)?;
        Ok(wire.into())
    }

    async fn product_sync_stats(&self) -> Result<ProductSyncStats, ApiError> {
        let wire: ProductSyncStatsWire = self
            .get(&["api", "v1", "sync-management", "statistics"])
            .await?;
        Ok(wire.into())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::new(ApiErrorKind::Decode, err.to_string()))
}

fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let message = error_detail(body).unwrap_or_else(|| status.to_string());
    let kind = match status {
        StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
        StatusCode::UNAUTHORIZED => ApiErrorKind::Unauthorized,
        other => ApiErrorKind::HttpStatus(other.as_u16()),
    };
    ApiError::new(kind, message)
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(ApiErrorKind::Timeout, err.to_string());
    }
    ApiError::new(ApiErrorKind::Network, err.to_string())
}
