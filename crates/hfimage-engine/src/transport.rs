use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hfimage_contracts::request::BearerToken;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;

use crate::config::EngineConfig;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub bearer_token: BearerToken,
    pub query: Vec<(String, String)>,
    /// Serialized JSON; sent with `Content-Type: application/json`.
    pub json_body: Option<Vec<u8>>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>, bearer_token: BearerToken) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer_token,
            query: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, bearer_token: BearerToken, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer_token,
            query: Vec::new(),
            json_body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Box<dyn ResponseBody>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Incrementally readable response body. Dropping it aborts the read.
#[async_trait]
pub trait ResponseBody: Send {
    /// Next chunk in arrival order, `None` once the body is exhausted.
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    async fn collect(self: Box<Self>) -> Result<Bytes, TransportError> {
        let mut body = self;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    async fn text(self: Box<Self>) -> Result<String, TransportError> {
        let bytes = self.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        let mut builder =
            HttpClient::builder().user_agent(concat!("hfimage/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        }
        .bearer_auth(request.bearer_token.expose());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.json_body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            content_length: response.content_length(),
            body: Box::new(ReqwestBody(response)),
        })
    }
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl ResponseBody for ReqwestBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.0.chunk().await?)
    }

    async fn collect(self: Box<Self>) -> Result<Bytes, TransportError> {
        Ok(self.0.bytes().await?)
    }

    async fn text(self: Box<Self>) -> Result<String, TransportError> {
        Ok(self.0.text().await?)
    }
}
