// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport for the Proxmox VE JSON API.
//!
//! Provides [`ProxmoxClient`] which handles URL construction, API token
//! authentication, envelope decoding, and transient error retry.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vmportal_config::model::ProxmoxConfig;
use vmportal_core::{LoginTicket, PortalError};

use crate::types::ApiEnvelope;

/// Whether a request may be repeated after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Idempotent reads.
    Transient,
    /// Writes (tickets, power actions, deletion) surface the first failure.
    Never,
}

/// A prepared API request.
#[derive(Debug)]
pub struct ApiRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub form: Option<Vec<(&'a str, &'a str)>>,
    pub login: Option<&'a LoginTicket>,
    pub retry: RetryPolicy,
}

impl<'a> ApiRequest<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::GET,
            path,
            form: None,
            login: None,
            retry: RetryPolicy::Transient,
        }
    }

    pub fn post(path: &'a str) -> Self {
        Self {
            method: Method::POST,
            retry: RetryPolicy::Never,
            ..Self::get(path)
        }
    }

    pub fn delete(path: &'a str) -> Self {
        Self {
            method: Method::DELETE,
            retry: RetryPolicy::Never,
            ..Self::get(path)
        }
    }

    pub fn form(mut self, fields: Vec<(&'a str, &'a str)>) -> Self {
        self.form = Some(fields);
        self
    }

    /// Authenticate with a login ticket (cookie plus CSRF header) in addition to the API token.
    pub fn with_login(mut self, login: &'a LoginTicket) -> Self {
        self.login = Some(login);
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = RetryPolicy::Never;
        self
    }
}

/// Failure of one API call, keeping the HTTP status for not-found mapping.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: Option<StatusCode>,
    pub body: String,
    pub error: PortalError,
}

/// HTTP client for Proxmox VE API communication.
#[derive(Debug, Clone)]
pub struct ProxmoxClient {
    client: reqwest::Client,
    api_root: String,
    max_retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl ProxmoxClient {
    /// Creates a client from the hypervisor configuration.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, PortalError> {
        let mut headers = HeaderMap::new();
        if let (Some(id), Some(secret)) = (&config.token_id, &config.token_secret) {
            let mut value = HeaderValue::from_str(&format!("PVEAPIToken={id}={secret}"))
                .map_err(|e| PortalError::Config(format!("invalid API token header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = vmportal_security::build_hypervisor_client(
            Duration::from_secs(config.timeout_secs),
            config.accept_invalid_certs,
            headers,
        )?;

        Ok(Self {
            client,
            api_root: api_root(&config.base_url),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.api_root = api_root(url);
        self.retry_backoff = Duration::from_millis(10);
        self
    }

    /// Sends a request and decodes the `data` payload.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest<'_>) -> Result<T, ApiFailure> {
        let body = self.send(&request).await?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| ApiFailure {
            status: None,
            body: body.clone(),
            error: PortalError::Upstream {
                message: format!("malformed response from {}: {e}", request.path),
                source: Some(Box::new(e)),
            },
        })?;
        Ok(envelope.data)
    }

    /// Sends a request whose payload is irrelevant (task ids, null).
    pub async fn call_unit(&self, request: ApiRequest<'_>) -> Result<(), ApiFailure> {
        self.send(&request).await.map(|_| ())
    }

    async fn send(&self, request: &ApiRequest<'_>) -> Result<String, ApiFailure> {
        let url = format!("{}{}", self.api_root, request.path);
        let attempts = match request.retry {
            RetryPolicy::Transient => self.max_retries,
            RetryPolicy::Never => 0,
        };

        let mut last_failure = None;

        for attempt in 0..=attempts {
            if attempt > 0 {
                warn!(attempt, path = request.path, "retrying hypervisor request after transient error");
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }

            let mut builder = self.client.request(request.method.clone(), &url);
            if let Some(fields) = &request.form {
                builder = builder
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encode_form(fields));
            }
            if let Some(login) = request.login {
                builder = builder
                    .header(COOKIE, format!("PVEAuthCookie={}", login.ticket))
                    .header("CSRFPreventionToken", login.csrf_token.as_str());
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    let failure = ApiFailure {
                        status: None,
                        body: String::new(),
                        error: if e.is_timeout() {
                            PortalError::Timeout {
                                duration: self.timeout,
                            }
                        } else {
                            PortalError::Upstream {
                                message: format!("HTTP request to {} failed: {e}", request.path),
                                source: Some(Box::new(e)),
                            }
                        },
                    };
                    if transient && attempt < attempts {
                        last_failure = Some(failure);
                        continue;
                    }
                    vmportal_prometheus::record_hypervisor_request(request.method.as_str(), false);
                    return Err(failure);
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, path = request.path, "hypervisor response received");

            let body = response.text().await.map_err(|e| ApiFailure {
                status: Some(status),
                body: String::new(),
                error: PortalError::Upstream {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                },
            })?;

            if status.is_success() {
                vmportal_prometheus::record_hypervisor_request(request.method.as_str(), true);
                return Ok(body);
            }

            let failure = ApiFailure {
                status: Some(status),
                error: PortalError::upstream(format!(
                    "hypervisor returned {status} for {}: {}",
                    request.path,
                    summarize(&body)
                )),
                body,
            };

            if is_transient_error(status) && attempt < attempts {
                warn!(status = %status, path = request.path, "transient error, will retry");
                last_failure = Some(failure);
                continue;
            }

            vmportal_prometheus::record_hypervisor_request(request.method.as_str(), false);
            return Err(failure);
        }

        vmportal_prometheus::record_hypervisor_request(request.method.as_str(), false);
        Err(last_failure.unwrap_or_else(|| ApiFailure {
            status: None,
            body: String::new(),
            error: PortalError::upstream(format!(
                "request to {} failed after retries",
                request.path
            )),
        }))
    }
}

/// `https://host:8006/` becomes `https://host:8006/api2/json/`.
fn api_root(base_url: &str) -> String {
    format!("{}/api2/json/", base_url.trim_end_matches('/'))
}

fn encode_form(fields: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish()
}

/// Proxmox error bodies can be large HTML pages; keep messages readable.
fn summarize(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(300) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}
