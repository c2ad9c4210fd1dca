use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, Uri};
use hyper_tls::HttpsConnector;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>>;

pub fn build_client() -> HttpsClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, Body>(https)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RequestError,
    Timeout,
}

impl Failure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Failure::RequestError => "REQUEST_ERROR",
            Failure::Timeout => "TIMEOUT",
        }
    }
}

/// What one GET produced. `status` is 0 when no response arrived.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub url: String,
    pub status: u16,
    pub body_len: usize,
    pub duration: Duration,
    pub failure: Option<(Failure, String)>,
}

impl RequestOutcome {
    fn failed(url: &Url, duration: Duration, failure: Failure, message: String) -> Self {
        Self {
            url: url.to_string(),
            status: 0,
            body_len: 0,
            duration,
            failure: Some((failure, message)),
        }
    }

    /// Key of this outcome in the status breakdown.
    pub fn status_key(&self) -> String {
        match &self.failure {
            Some((failure, _)) => failure.as_str().to_string(),
            None => self.status.to_string(),
        }
    }
}

/// Issues one GET and reads the whole body, bounded by `max_duration`.
/// Never fails: transport problems come back as an outcome with status 0.
pub async fn send_get(
    client: &HttpsClient,
    url: &Url,
    headers: Option<&HashMap<String, String>>,
    max_duration: Duration,
) -> RequestOutcome {
    let uri: Uri = match url.as_str().parse() {
        Ok(uri) => uri,
        Err(e) => {
            return RequestOutcome::failed(url, Duration::ZERO, Failure::RequestError, format!("{}", e))
        }
    };

    let mut req_builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(headers) = headers {
        for (name, value) in headers {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }
    }

    let request = match req_builder.body(Body::empty()) {
        Ok(request) => request,
        Err(e) => {
            return RequestOutcome::failed(url, Duration::ZERO, Failure::RequestError, e.to_string())
        }
    };

    let start = Instant::now();
    let result = timeout(max_duration, async {
        let response = client.request(request).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;
        Ok::<_, hyper::Error>((status, body.len()))
    })
    .await;
    let duration = start.elapsed();

    match result {
        Ok(Ok((status, body_len))) => RequestOutcome {
            url: url.to_string(),
            status: status.as_u16(),
            body_len,
            duration,
            failure: None,
        },
        Ok(Err(e)) => {
            RequestOutcome::failed(url, duration, Failure::RequestError, describe_error(&e).to_string())
        }
        Err(_) => RequestOutcome::failed(url, duration, Failure::Timeout, "Timeout".to_string()),
    }
}

fn describe_error(e: &hyper::Error) -> &'static str {
    if e.is_connect() {
        "Connection refused or host unreachable"
    } else if e.is_timeout() {
        "Timeout"
    } else if e.is_closed() || e.is_incomplete_message() {
        "Connection closed unexpectedly"
    } else {
        "Unknown network error"
    }
}
