use crate::request::{Body, HttpRequest};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub elapsed_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub fn build_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    // Per-call deadlines are enforced in `execute`; this only bounds the TCP connect.
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build http client")
}

/// Send `req` and read the whole body, aborting once `timeout` elapses.
pub async fn execute(
    client: &reqwest::Client,
    req: &HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse, TransportError> {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let request_id = &request_id[..7];
    let started = Instant::now();

    log::debug!("[{request_id}] {} {} starting", req.method, req.url);

    let outcome = tokio::time::timeout(timeout, send(client, req)).await;
    let elapsed_ms = ms(started.elapsed());

    match outcome {
        Ok(Ok(mut resp)) => {
            resp.elapsed_ms = elapsed_ms;
            log::info!(
                "[{request_id}] {} {} -> {} {} ({elapsed_ms}ms, {} bytes)",
                req.method,
                req.url,
                resp.status,
                resp.status_text,
                resp.body.len()
            );
            Ok(resp)
        }
        Ok(Err(e)) => {
            log::warn!("[{request_id}] {} {} failed ({elapsed_ms}ms): {e}", req.method, req.url);
            Err(e)
        }
        Err(_) => {
            log::warn!(
                "[{request_id}] {} {} timed out after {}ms",
                req.method,
                req.url,
                ms(timeout)
            );
            Err(TransportError::Timeout {
                after_ms: ms(timeout),
            })
        }
    }
}

async fn send(client: &reqwest::Client, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut headers = HeaderMap::new();
    for (k, v) in &req.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("invalid header name: {k}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|_| TransportError::InvalidRequest(format!("invalid header value for {k}")))?;
        headers.insert(name, value);
    }

    let method = Method::from_bytes(req.method.as_bytes())
        .map_err(|_| TransportError::InvalidRequest(format!("unsupported method: {}", req.method)))?;

    let builder = client.request(method, &req.url).headers(headers);
    let builder = match &req.body {
        Body::Empty => builder,
        Body::MultipartFormData { bytes, .. } => builder.body(bytes.clone()),
    };

    let resp = builder.send().await.map_err(classify)?;

    let status = resp.status();
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let headers = resp
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = resp.bytes().await.map_err(classify)?.to_vec();

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text,
        headers,
        body,
        elapsed_ms: 0,
    })
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout { after_ms: 0 };
    }

    // Include the source chain; reqwest's top-level message is often just "error sending request".
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    TransportError::Network(msg)
}

pub fn ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: Vec<(&str, &str)>) -> HttpResponse {
        HttpResponse {
            status: 200,
            status_text: "OK".into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: b"hi".to_vec(),
            elapsed_ms: 3,
        }
    }

    #[test]
    fn content_type_lookup_is_case_insensitive() {
        let resp = response(vec![("Content-Type", "audio/wav")]);
        assert_eq!(resp.content_type(), Some("audio/wav"));
        assert!(resp.is_success());
        assert_eq!(resp.body_text(), "hi");
    }

    #[test]
    fn missing_content_type_is_none() {
        assert_eq!(response(vec![]).content_type(), None);
    }

    #[test]
    fn ms_saturates() {
        assert_eq!(ms(Duration::from_millis(1500)), 1500);
        assert_eq!(ms(Duration::MAX), u64::MAX);
    }
}
