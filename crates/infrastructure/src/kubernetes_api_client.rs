//! Minimal authenticated client for the Kubernetes REST API.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use slotgate_core::{AppError, AppResult};

/// Connection settings for [`KubernetesApiClient`].
#[derive(Debug, Clone)]
pub struct KubernetesApiConfig {
    /// API server base URL, e.g. `https://10.0.0.1:443`.
    pub server: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
    /// Disables TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Shared HTTP plumbing for the Kubernetes adapters.
#[derive(Clone)]
pub struct KubernetesApiClient {
    http_client: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl KubernetesApiClient {
    /// Builds a client from connection settings.
    pub fn new(config: KubernetesApiConfig) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if let Some(ca_pem) = config.ca_pem.as_deref() {
            let certificate = reqwest::Certificate::from_pem(ca_pem).map_err(|error| {
                AppError::Validation(format!("invalid kubernetes CA bundle: {error}"))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http_client = builder.build().map_err(|error| {
            AppError::Internal(format!("failed to build kubernetes http client: {error}"))
        })?;

        Ok(Self::with_http_client(http_client, config.server, config.token))
    }

    /// Wraps an existing HTTP client.
    #[must_use]
    pub fn with_http_client(
        http_client: reqwest::Client,
        server: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            http_client,
            server: server.into().trim_end_matches('/').to_owned(),
            token,
        }
    }

    /// Starts a request against an API path beginning with `/`.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, format!("{}{path}", self.server))
            .header("Accept", "application/json");

        match self.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request, mapping transport failures to `Unavailable`.
    pub(crate) async fn send(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> AppResult<Response> {
        builder.send().await.map_err(|error| {
            AppError::Unavailable(format!("{operation}: kubernetes api transport error: {error}"))
        })
    }

    /// Sends a GET and decodes a successful JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation: &str,
    ) -> AppResult<T> {
        let response = self
            .send(self.request(Method::GET, path).query(query), operation)
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, operation).await);
        }

        decode_json(response, operation).await
    }
}

/// Decodes a JSON response body.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
    operation: &str,
) -> AppResult<T> {
    response.json::<T>().await.map_err(|error| {
        AppError::Internal(format!("{operation}: invalid kubernetes api response: {error}"))
    })
}

/// Converts a non-success response into an error, reading the body for context.
pub(crate) async fn error_from_response(response: Response, operation: &str) -> AppError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());

    status_error(status, operation, body.as_str())
}

/// Maps an HTTP status to an error category.
pub(crate) fn status_error(status: StatusCode, operation: &str, body: &str) -> AppError {
    let message = format!("{operation}: kubernetes api returned {status}: {body}");

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AppError::Unavailable(message);
    }

    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::Validation(message)
        }
        _ => AppError::Internal(message),
    }
}
