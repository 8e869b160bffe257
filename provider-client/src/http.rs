//! reqwest implementation of the outbound HTTP port.

use std::sync::Arc;

use tokio::sync::Semaphore;

use provider_types::{
    HttpMethod, HttpRequest, HttpResponse, ProviderError, TransportFailure, UpstreamHttp,
};

use crate::config::HttpConfig;

/// Pooled HTTP client shared by every upstream call.
///
/// reqwest bounds idle connections per host; the semaphore bounds how many
/// requests are in flight at once.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl ReqwestHttp {
    pub fn new(config: &HttpConfig) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_keepalive);
        if let Some(connect) = config.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        if let Some(read) = config.read_timeout {
            builder = builder.read_timeout(read);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }
}

#[async_trait::async_trait]
impl UpstreamHttp for ReqwestHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TransportFailure::Other(e.to_string()))?;

        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.method == HttpMethod::Post {
            builder = builder.body(request.body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
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
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Other(err.to_string())
    }
}
