use reqwest::{header::AUTHORIZATION, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("proxy returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Reply from a proxied call, successful or not.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReply {
    pub request_id: i64,
    pub status: u16,
    #[serde(default)]
    pub data: Option<Value>,
    /// Set when forwarding failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Filters for `GET /audit/requests`. Dates are RFC 3339.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestList {
    pub total_records: u64,
    pub page: u32,
    pub page_size: u32,
    pub data: Vec<AuditRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub request_id: i64,
    pub ip_address: String,
    pub timestamp: String,
    pub endpoint: String,
    pub http_method: String,
    pub headers: String,
    pub payload: Option<String>,
    pub response: Option<AuditResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub response_id: i64,
    pub response_status: u16,
    pub response_payload: String,
    pub response_time: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReply {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub deleted_request_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct HoneypotClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HoneypotClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` on audit calls.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Send a call through the proxy. `path` is relative to `/api`.
    ///
    /// Forwarding failures come back as `Ok` with `error` set; only replies
    /// without a request id (capture failures) are errors.
    pub async fn proxy(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ProxyReply, ClientError> {
        let mut req = self
            .client
            .request(method, format!("{}/api{}", self.base_url, path));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        serde_json::from_str::<ProxyReply>(&text).map_err(|_| ClientError::Status {
            status: status.as_u16(),
            body: text,
        })
    }

    pub async fn list_requests(&self, filter: &RequestFilter) -> Result<RequestList, ClientError> {
        let resp = self
            .authorized(self.client.get(format!("{}/audit/requests", self.base_url)))
            .query(filter)
            .send()
            .await?;
        decode(resp, false).await
    }

    /// Delete a captured request and its response. A missing id yields
    /// `success == false` rather than an error.
    pub async fn delete_request(&self, id: i64) -> Result<DeleteReply, ClientError> {
        let resp = self
            .authorized(
                self.client
                    .delete(format!("{}/audit/requests/{}", self.base_url, id)),
            )
            .send()
            .await?;
        decode(resp, true).await
    }

    /// Healthy and unhealthy reports are both returned as `Ok`.
    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        decode(resp, true).await
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(AUTHORIZATION, format!("Bearer {key}")),
            None => req,
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response, accept_errors: bool) -> Result<T, ClientError> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() && !accept_errors {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    match serde_json::from_str::<T>(&text) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Err(ClientError::Status {
            status: status.as_u16(),
            body: text,
        }),
        Err(e) => Err(e.into()),
    }
}
