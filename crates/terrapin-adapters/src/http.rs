//! [`Backend`] over the backend's JSON HTTP API.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use terrapin_proto::{
    Backend, BackendError, BackendResult, ConfigurationVersion, CreateRunInput, Job,
    JobLogEvent, JobLogStream, JobLogSubscription, JobLogs, Run, Workspace,
};
use tracing::{debug, trace};
use url::Url;

use crate::ndjson::{LineDecoder, parse_line};

/// User agent sent with every request.
static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const API_PREFIX: &str = "v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum HttpBackendError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("API token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP client for one backend endpoint.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    /// Applied to every request except log subscriptions.
    request_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct CreateConfigurationVersionBody {
    speculative: bool,
}

#[derive(Serialize)]
struct ApplyBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Serialize)]
struct CancelBody {
    force: bool,
}

impl HttpBackend {
    /// Creates a client for `endpoint`, authenticating with `token` when given.
    pub fn new(endpoint: &str, token: Option<&str>) -> Result<Self, HttpBackendError> {
        let base = Url::parse(endpoint).map_err(|e| HttpBackendError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(HttpBackendError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "expected an http or https URL".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HttpBackendError::InvalidToken)?;
            authorization.set_sensitive(true);
            headers.insert(AUTHORIZATION, authorization);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(APP_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base,
            request_timeout: None,
        })
    }

    /// Bounds each request/response exchange. Log subscriptions stay open.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Builds `<endpoint>/v1/<segments...>`; each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(API_PREFIX).extend(segments);
        }
        url
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &Url,
        what: &str,
    ) -> BackendResult<Response> {
        trace!(url = %url, "Sending request");
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> BackendResult<T> {
        let request = self.bounded(self.client.get(url.clone()));
        let response = self.send(request, &url, what).await?;
        decode(response, &url).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B, what: &str) -> BackendResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.bounded(self.client.post(url.clone()).json(body));
        let response = self.send(request, &url, what).await?;
        decode(response, &url).await
    }
}

fn transport_error(url: &Url, err: &reqwest::Error) -> BackendError {
    BackendError::Transport {
        endpoint: url.to_string(),
        message: err.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> BackendResult<T> {
    response.json().await.map_err(|e| {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            transport_error(url, &e)
        }
    })
}

async fn check_status(response: Response, what: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, what))
}

/// Maps a non-success response to a [`BackendError`].
fn status_error(status: StatusCode, body: &str, what: &str) -> BackendError {
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.trim().to_string()
    };
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Turns a streaming NDJSON body into log events.
fn event_stream(
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
) -> BoxStream<'static, BackendResult<JobLogEvent>> {
    struct State {
        body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
        decoder: LineDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = State {
        body,
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((parse_line(&line), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(&chunk)),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(BackendError::Subscription(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_workspace(&self, workspace_path: &str) -> BackendResult<Workspace> {
        let url = self.url(&["workspaces", workspace_path]);
        self.get_json(url, &format!("workspace {workspace_path}"))
            .await
    }

    async fn create_configuration_version(
        &self,
        workspace_path: &str,
        speculative: bool,
    ) -> BackendResult<ConfigurationVersion> {
        let url = self.url(&["workspaces", workspace_path, "configuration-versions"]);
        self.post_json(
            url,
            &CreateConfigurationVersionBody { speculative },
            &format!("workspace {workspace_path}"),
        )
        .await
    }

    async fn upload_configuration_version(
        &self,
        configuration_version_id: &str,
        workspace_path: &str,
        archive: Vec<u8>,
    ) -> BackendResult<()> {
        let url = self.url(&["configuration-versions", configuration_version_id, "upload"]);
        debug!(
            configuration_version = configuration_version_id,
            workspace = workspace_path,
            bytes = archive.len(),
            "Uploading configuration archive"
        );
        let request = self.bounded(
            self.client
                .put(url.clone())
                .header(CONTENT_TYPE, "application/gzip")
                .body(archive),
        );
        self.send(
            request,
            &url,
            &format!("configuration version {configuration_version_id}"),
        )
        .await?;
        Ok(())
    }

    async fn get_configuration_version(
        &self,
        configuration_version_id: &str,
    ) -> BackendResult<ConfigurationVersion> {
        let url = self.url(&["configuration-versions", configuration_version_id]);
        self.get_json(url, &format!("configuration version {configuration_version_id}"))
            .await
    }

    async fn create_run(&self, input: &CreateRunInput) -> BackendResult<Run> {
        let url = self.url(&["runs"]);
        self.post_json(url, input, &format!("workspace {}", input.workspace_path))
            .await
    }

    async fn get_run(&self, run_id: &str) -> BackendResult<Run> {
        let url = self.url(&["runs", run_id]);
        self.get_json(url, &format!("run {run_id}")).await
    }

    async fn apply_run(&self, run_id: &str, comment: Option<&str>) -> BackendResult<Run> {
        let url = self.url(&["runs", run_id, "apply"]);
        self.post_json(url, &ApplyBody { comment }, &format!("run {run_id}"))
            .await
    }

    async fn cancel_run(&self, run_id: &str, force: bool) -> BackendResult<Run> {
        let url = self.url(&["runs", run_id, "cancel"]);
        self.post_json(url, &CancelBody { force }, &format!("run {run_id}"))
            .await
    }

    async fn get_job(&self, job_id: &str) -> BackendResult<Job> {
        let url = self.url(&["jobs", job_id]);
        self.get_json(url, &format!("job {job_id}")).await
    }

    async fn read_job_logs(
        &self,
        job_id: &str,
        offset: u64,
        limit: u64,
    ) -> BackendResult<JobLogs> {
        let mut url = self.url(&["jobs", job_id, "logs"]);
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_json(url, &format!("job {job_id}")).await
    }

    async fn subscribe_job_logs(
        &self,
        subscription: &JobLogSubscription,
    ) -> BackendResult<JobLogStream> {
        let mut url = self.url(&["jobs", &subscription.job_id, "logs", "events"]);
        url.query_pairs_mut()
            .append_pair("run_id", &subscription.run_id)
            .append_pair("workspace_path", &subscription.workspace_path)
            .append_pair("last_seen_size", &subscription.last_seen_size.to_string());

        let response = self
            .send(
                self.client.get(url.clone()),
                &url,
                &format!("job {}", subscription.job_id),
            )
            .await?;
        debug!(
            job_id = %subscription.job_id,
            run_id = %subscription.run_id,
            "Subscribed to job logs"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(event_stream(body))
    }
}
