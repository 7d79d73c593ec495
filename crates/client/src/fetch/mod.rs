//! Network access for the engine.
//!
//! ### Network seam
//! - Strategies talk to the network only through the [`Network`] trait, so
//!   the engine can run against the real origin or a scripted stand-in.
//!
//! ### reqwest client
//! - Any HTTP status is a successful fetch; strategies decide what to store.
//! - Transport failures map to `NETWORK_ERROR`, timeouts to `FETCH_TIMEOUT`.
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, header};

use medcache_core::{AppConfig, Error, Request, Response, ResponseSource};

pub use self::url::{UrlError, canonicalize, is_same_origin, resolve};

/// Anything that can turn a request into a response over the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request.
    ///
    /// Returns `Ok` for every HTTP status; `Err` only when no response was
    /// received at all.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "medcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "medcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }
        Ok(())
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method, e)))?;

        let response = self
            .http
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|e| map_reqwest_error(request.url.as_str(), e))?;

        let status = response.status();

        if let Some(len) = response.content_length() {
            self.check_size(len as usize)?;
        }

        let headers = collect_headers(response.headers());

        let bytes: Bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(request.url.as_str(), e))?;

        self.check_size(bytes.len())?;

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(Response { status: status.as_u16(), headers, body: bytes.to_vec(), source: ResponseSource::Network })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "medcache/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "praxis/2".into(), max_bytes: 1024, timeout_ms: 750, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "praxis/2");
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_collect_headers_lowercase() {
        let mut map = header::HeaderMap::new();
        map.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let headers = collect_headers(&map);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("application/json"));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        assert!(client.check_size(10).is_ok());
        assert!(matches!(client.check_size(6 * 1024 * 1024), Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_failure() {
        let config = FetchConfig { timeout: Duration::from_millis(500), ..Default::default() };
        let client = FetchClient::new(config).unwrap();
        let request = Request::get(::url::Url::parse("http://127.0.0.1:9/").unwrap());

        let err = client.fetch(&request).await.unwrap_err();
        assert!(err.is_network_failure());
    }

    mod against_server {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::*;

        fn request_to(server: &MockServer, route: &str) -> Request {
            Request::get(::url::Url::parse(&server.uri()).unwrap().join(route).unwrap())
        }

        #[tokio::test]
        async fn test_non_success_status_is_a_response() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/faq"))
                .respond_with(ResponseTemplate::new(404).set_body_string("no such faq"))
                .mount(&server)
                .await;

            let client = FetchClient::new(FetchConfig::default()).unwrap();
            let response = client.fetch(&request_to(&server, "/api/faq")).await.unwrap();

            assert_eq!(response.status, 404);
            assert_eq!(response.text(), "no such faq");
            assert_eq!(response.source, ResponseSource::Network);
            assert!(!response.is_ok());
        }

        #[tokio::test]
        async fn test_headers_collected_lowercase() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/emergency"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Content-Type", "text/html; charset=utf-8")
                        .insert_header("X-Praxis-Site", "Mitte")
                        .set_body_string("<h1>Notfall</h1>"),
                )
                .mount(&server)
                .await;

            let client = FetchClient::new(FetchConfig::default()).unwrap();
            let response = client.fetch(&request_to(&server, "/emergency")).await.unwrap();

            assert_eq!(response.status, 200);
            assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
            assert_eq!(response.headers.get("x-praxis-site").map(String::as_str), Some("Mitte"));
            assert!(response.headers.keys().all(|name| name == &name.to_ascii_lowercase()));
            assert_eq!(response.text(), "<h1>Notfall</h1>");
        }

        #[tokio::test]
        async fn test_oversized_body_is_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/uploads/scan.png"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
                .mount(&server)
                .await;

            let config = FetchConfig { max_bytes: 1024, ..Default::default() };
            let client = FetchClient::new(config).unwrap();
            let err = client.fetch(&request_to(&server, "/uploads/scan.png")).await.unwrap_err();

            assert!(matches!(err, Error::FetchTooLarge(_)));
            assert!(err.is_network_failure());
        }
    }
}
