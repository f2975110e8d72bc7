//! Transport abstraction and the HTTP implementation
//!
//! Everything above this module (executor, queue, processor, client) speaks
//! to the network exclusively through the [`Transport`] trait, so tests swap
//! in a scripted transport and never open a socket.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Method {
    #[default]
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "HEAD")]
    Head,
}

impl Method {
    /// Canonical uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as handed to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetRequest {
    /// Target URL
    pub url: String,

    /// HTTP method
    #[serde(default)]
    pub method: Method,

    /// Extra headers beyond what the transport adds itself
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// JSON body, when the method carries one
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl NetRequest {
    /// A GET request for the given URL
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// A POST request with a JSON body
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: HashMap::new(),
            body: Some(body),
        }
    }

    /// Set the method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate the request before submission
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url)
            .map_err(|e| NetError::invalid(format!("invalid url {}: {}", self.url, e)))?;
        Ok(())
    }
}

/// A successful response from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetResponse {
    /// HTTP status code (always 2xx; other codes surface as errors)
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Raw response body
    #[serde(default)]
    pub body: Vec<u8>,
}

impl NetResponse {
    /// An empty 200 response
    pub fn ok() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// A response with a JSON body
    pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body: value.to_string().into_bytes(),
        }
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| NetError::invalid(format!("malformed response body: {}", e)))
    }

    /// The body as UTF-8 text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| NetError::invalid(format!("response body is not utf-8: {}", e)))
    }
}

/// Executes requests against some backend
///
/// The contract: `Ok` carries a 2xx response; every other outcome, including
/// non-2xx statuses, is a [`NetError`] so retry classification sees a single
/// error taxonomy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request once, with no retries
    async fn send(&self, request: &NetRequest) -> Result<NetResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &NetRequest) -> Result<NetResponse> {
        (**self).send(request).await
    }
}

/// Transport backed by `reqwest`
///
/// Timeouts are left to the retry layer, which bounds each attempt itself;
/// the underlying client runs without one so the two deadlines cannot fight.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| NetError::config(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn method(&self, method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        }
    }

    fn map_send_error(error: reqwest::Error) -> NetError {
        if error.is_timeout() {
            NetError::timeout(0)
        } else if error.is_connect() {
            NetError::connection(error.to_string())
        } else if error.is_builder() || error.is_request() {
            NetError::invalid(error.to_string())
        } else {
            NetError::connection(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &NetRequest) -> Result<NetResponse> {
        request.validate()?;

        let mut builder = self
            .client
            .request(self.method(request.method), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(Self::map_send_error)?;
        let status = response.status();

        if !status.is_success() {
            return Err(NetError::http(status.as_u16(), request.url.clone()));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| NetError::connection(format!("failed to read body: {}", e)))?;

        Ok(NetResponse {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}

/// Scripted transport for tests
///
/// Outcomes are served in the order they were pushed; once the script runs
/// out every further send fails with a connection error. Sent requests are
/// recorded for assertion.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<std::collections::VecDeque<Result<NetResponse>>>,
    sent: Mutex<Vec<NetRequest>>,
}

impl MockTransport {
    /// An empty mock; every send fails until outcomes are pushed
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome
    pub fn push(&self, outcome: Result<NetResponse>) {
        self.script
            .lock()
            .expect("mock script poisoned")
            .push_back(outcome);
    }

    /// Queue `n` copies of the same outcome
    pub fn push_many(&self, n: usize, outcome: Result<NetResponse>) {
        for _ in 0..n {
            self.push(outcome.clone());
        }
    }

    /// Requests sent so far, in order
    pub fn sent(&self) -> Vec<NetRequest> {
        self.sent.lock().expect("mock log poisoned").clone()
    }

    /// Number of sends so far
    pub fn send_count(&self) -> usize {
        self.sent.lock().expect("mock log poisoned").len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &NetRequest) -> Result<NetResponse> {
        self.sent
            .lock()
            .expect("mock log poisoned")
            .push(request.clone());
        self.script
            .lock()
            .expect("mock script poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(NetError::connection("mock script exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let request = NetRequest::post(
            "https://api.aula.example/messages",
            serde_json::json!({"text": "hello"}),
        )
        .with_header("authorization", "Bearer t");

        assert_eq!(request.method, Method::Post);
        assert!(request.body.is_some());
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer t")
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let request = NetRequest::get("not a url");
        assert!(matches!(
            request.validate(),
            Err(NetError::Invalid { .. })
        ));
    }

    #[test]
    fn response_json_roundtrip() {
        let response =
            NetResponse::json_body(200, &serde_json::json!({"id": 7, "name": "math"}));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn malformed_body_is_invalid() {
        let response = NetResponse {
            status: 200,
            headers: HashMap::new(),
            body: b"not json".to_vec(),
        };
        let result: Result<serde_json::Value> = response.json();
        assert!(matches!(result, Err(NetError::Invalid { .. })));
    }

    #[tokio::test]
    async fn mock_serves_script_in_order() {
        let mock = MockTransport::new();
        mock.push(Err(NetError::http(500, "http://x/")));
        mock.push(Ok(NetResponse::ok()));

        let request = NetRequest::get("http://x/");
        assert_eq!(
            mock.send(&request).await,
            Err(NetError::http(500, "http://x/"))
        );
        assert!(mock.send(&request).await.is_ok());
        // Script exhausted
        assert!(matches!(
            mock.send(&request).await,
            Err(NetError::Connection { .. })
        ));
        assert_eq!(mock.send_count(), 3);
    }

    #[test]
    fn method_serde_names() {
        assert_eq!(serde_json::to_string(&Method::Delete).unwrap(), "\"DELETE\"");
        let parsed: Method = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(parsed, Method::Post);
    }
}
