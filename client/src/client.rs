use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::retry::{self, RetryConfig, RetryOutcome};
use crate::{
    ApiError, ClientConfig, Deferred, ImmediateResolution, Method, PolledResolution, Transport,
    TransportError, TransportFut,
};

// TCP keepalive and pool sizing follow httpx defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("API token is not a valid header value")]
    InvalidToken,
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// `reqwest` implementation of [`Transport`].
///
/// Each `call` performs the fixed-delay retries of [`retry::send_with_retry`]
/// and classifies what is left: exhausted retryable failures become
/// [`TransportError::Transient`] after one more retry delay, other error statuses
/// [`TransportError::Fatal`], and unretryable connection failures
/// [`TransportError::Other`].
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Option<Url>,
    poll_interval: Duration,
    retry: RetryConfig,
}

/// Error body shape PNCP endpoints use for failed requests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    #[serde(rename = "ErrorCode")]
    code: Option<u64>,
    #[serde(rename = "ErrorMessage")]
    message: Option<String>,
}

fn base_client_builder(config: &ClientConfig) -> Result<reqwest::ClientBuilder, ClientBuildError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(token) = config.api_token.as_deref() {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientBuildError::InvalidToken)?;
        value.set_sensitive(true);
        default_headers.insert(AUTHORIZATION, value);
    }

    Ok(reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .https_only(!config.allow_insecure_http)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers))
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientBuildError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|source| ClientBuildError::InvalidBaseUrl {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()?;
        let http = base_client_builder(config)?.build()?;

        Ok(Self {
            http,
            base_url,
            poll_interval: config.poll_interval(),
            retry: config.retry(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Absolute URLs pass through; relative ones are joined to the base URL.
    pub fn resolve_url(&self, url: &str) -> Result<Url, TransportError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        resolved.map_err(|err| anyhow::anyhow!("invalid request URL {url:?}: {err}").into())
    }

    /// `GET url`, returning the body as an immediate result.
    pub async fn get(&self, url: &str) -> Result<ImmediateResolution, TransportError> {
        self.call(Method::GET, url, &[], "").await
    }

    /// Start an operation that may complete asynchronously.
    ///
    /// `202 Accepted` with a `{"resourceURL": ...}` body yields a polled
    /// result bound to this client; any other success yields the body.
    pub async fn submit(
        self: &Arc<Self>,
        method: Method,
        url: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<Deferred<Self>, TransportError> {
        let response = self.execute(method, url, body, content_type).await?;
        let status = response.status();
        let bytes = read_body(response).await?;

        if status != StatusCode::ACCEPTED {
            return Ok(Deferred::Immediate(ImmediateResolution::new(bytes)));
        }

        let polled: PolledResolution<Self> = serde_json::from_slice(&bytes).map_err(|err| {
            TransportError::Other(anyhow::anyhow!("malformed 202 Accepted body: {err}"))
        })?;
        tracing::debug!(
            url,
            resource_url = polled.resource_url(),
            "Operation accepted; result will be polled"
        );
        Ok(Deferred::Polled(polled.bind(Arc::clone(self))))
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<Response, TransportError> {
        let url = self.resolve_url(url)?;
        let build_request = || {
            let mut request = self.http.request(method.clone(), url.clone());
            if !body.is_empty() {
                request = request.body(body.to_vec());
            }
            if !content_type.is_empty() {
                request = request.header(CONTENT_TYPE, content_type);
            }
            request
        };

        match retry::send_with_retry(build_request, &self.retry).await {
            RetryOutcome::Success(response) => Ok(response),
            RetryOutcome::HttpError(response) => {
                let pause = retry::should_retry(response.status(), response.headers())
                    .then(|| retry::retry_delay(&self.retry, Some(response.headers())));
                let err = classify_error_response(response).await;
                if let Some(pause) = pause {
                    pace_transient(&err, pause).await;
                }
                Err(err)
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                let err = TransportError::Transient(ApiError::transient(
                    0,
                    format!("request failed after {attempts} attempts: {source}"),
                ));
                pace_transient(&err, retry::retry_delay(&self.retry, None)).await;
                Err(err)
            }
            RetryOutcome::NonRetryable(e) => Err(TransportError::Other(
                anyhow::Error::new(e).context(format!("{method} {url} failed")),
            )),
        }
    }
}

impl Transport for Client {
    fn call<'a>(
        &'a self,
        method: Method,
        url: &'a str,
        body: &'a [u8],
        content_type: &'a str,
    ) -> TransportFut<'a> {
        Box::pin(async move {
            let response = self.execute(method, url, body, content_type).await?;
            Ok(ImmediateResolution::new(read_body(response).await?))
        })
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// A `Transient` error is re-issued by the caller without its own wait, so the
/// retry delay is spent here once the hard retries are used up.
async fn pace_transient(err: &TransportError, pause: Duration) {
    tracing::debug!(
        error = %err,
        delay_ms = pause.as_millis(),
        "Retries exhausted; pausing before reporting transient error"
    );
    tokio::time::sleep(pause).await;
}

async fn read_body(response: Response) -> Result<Vec<u8>, TransportError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| anyhow::Error::new(e).context("failed to read response body"))?;
    Ok(bytes.to_vec())
}

/// Turn a non-2xx response into an [`ApiError`].
///
/// Code and message come from the PNCP error body when there is one, else from
/// the status line and a capped excerpt of the body.
async fn classify_error_response(response: Response) -> TransportError {
    let status = response.status();
    let retriable = retry::should_retry(status, response.headers());
    let text = read_capped_error_body(response).await;
    let parsed: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let eref = parsed.code.unwrap_or_else(|| u64::from(status.as_u16()));
    let message = parsed
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}: {}", text.trim()));

    ApiError::new(eref, message, retriable).into()
}

async fn read_capped_error_body(response: Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::{Client, ClientBuildError};
    use crate::{ClientConfig, TransportError};

    #[test]
    fn rejects_invalid_base_url() {
        let config = ClientConfig::default().with_base_url("not a url");
        let err = Client::new(&config).unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn rejects_token_with_control_characters() {
        let config = ClientConfig::default().with_api_token("line\nbreak");
        let err = Client::new(&config).unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidToken));
    }

    #[test]
    fn joins_relative_urls_to_base() {
        let config = ClientConfig::default().with_base_url("https://api.example.net/v1/");
        let client = Client::new(&config).unwrap();

        assert_eq!(
            client.resolve_url("tasks/7").unwrap().as_str(),
            "https://api.example.net/v1/tasks/7"
        );
        assert_eq!(
            client.resolve_url("https://other.example.net/t/1").unwrap().as_str(),
            "https://other.example.net/t/1"
        );
    }

    #[test]
    fn relative_url_without_base_is_unclassified_error() {
        let client = Client::new(&ClientConfig::default()).unwrap();
        let err = client.resolve_url("tasks/7").unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[test]
    fn poll_interval_comes_from_config() {
        use crate::Transport;
        use std::time::Duration;

        let config = ClientConfig::default().with_poll_interval(Duration::from_millis(40));
        let client = Client::new(&config).unwrap();
        assert_eq!(client.poll_interval(), Duration::from_millis(40));
    }
}
