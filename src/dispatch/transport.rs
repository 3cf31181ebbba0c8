//! HTTP transport
//!
//! The dispatcher only talks to the `Transport` trait, so tests can swap in an
//! instrumented implementation without a network.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use super::endpoints::Endpoint;
use crate::error::{ProbeError, TransportError};
use crate::probe::{BodySnapshot, HttpSnapshot, Placement, ProbeSpec, TransportErrorKind};

/// Sends one attempt of a probe
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        spec: &ProbeSpec,
        endpoint: Option<&Endpoint>,
    ) -> Result<HttpSnapshot, TransportError>;
}

/// Client-level settings shared by every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            follow_redirects: false,
            max_body_bytes: 64 * 1024,
            user_agent: format!("nexus-probe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// reqwest-backed transport with one client per egress endpoint
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: HashMap<String, reqwest::Client>,
    max_body_bytes: usize,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig, endpoints: &[Endpoint]) -> Result<Self, ProbeError> {
        let direct = Self::builder(config)
            .build()
            .map_err(|e| ProbeError::TransportInit(e.to_string()))?;

        let mut proxied = HashMap::new();
        for endpoint in endpoints {
            let proxy = reqwest::Proxy::all(&endpoint.url).map_err(|e| {
                ProbeError::TransportInit(format!("proxy {}: {}", endpoint.url, e))
            })?;
            let client = Self::builder(config)
                .proxy(proxy)
                .build()
                .map_err(|e| ProbeError::TransportInit(format!("proxy {}: {}", endpoint.url, e)))?;
            proxied.insert(endpoint.url.clone(), client);
        }

        Ok(Self {
            direct,
            proxied,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn builder(config: &TransportConfig) -> reqwest::ClientBuilder {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(redirect)
            .user_agent(&config.user_agent)
    }

    fn client_for(&self, endpoint: Option<&Endpoint>) -> Result<&reqwest::Client, TransportError> {
        match endpoint {
            None => Ok(&self.direct),
            Some(endpoint) => self.proxied.get(&endpoint.url).ok_or_else(|| {
                TransportError::new(
                    TransportErrorKind::Request,
                    format!("no client configured for endpoint {}", endpoint.url),
                )
            }),
        }
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        spec: &ProbeSpec,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = reqwest::Method::from_str(&spec.method).map_err(|e| {
            TransportError::new(TransportErrorKind::Request, format!("invalid method: {}", e))
        })?;

        let mut builder = client.request(method, &spec.url);

        let mut headers = HeaderMap::new();
        for (key, value) in &spec.headers {
            if let (Ok(name), Ok(val)) = (HeaderName::from_str(key), HeaderValue::from_str(value)) {
                headers.insert(name, val);
            } else {
                tracing::debug!(header = %key, "Skipping invalid header");
            }
        }
        builder = builder.headers(headers);

        builder = match spec.placement {
            Placement::Query => builder.query(&spec.fields),
            Placement::FormBody => builder.form(&spec.fields),
            Placement::JsonBody => {
                let body: serde_json::Map<String, serde_json::Value> = spec
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                builder.json(&body)
            }
        };

        Ok(builder)
    }

    /// Read the body up to the cap, dropping the rest
    async fn read_body(&self, mut response: reqwest::Response) -> Result<BodySnapshot, TransportError> {
        let mut bytes = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes.saturating_sub(bytes.len());
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(BodySnapshot::from_bytes(bytes, truncated))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        spec: &ProbeSpec,
        endpoint: Option<&Endpoint>,
    ) -> Result<HttpSnapshot, TransportError> {
        let client = self.client_for(endpoint)?;
        let response = self.build_request(client, spec)?.send().await?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = self.read_body(response).await?;

        Ok(HttpSnapshot {
            status,
            headers,
            body,
        })
    }
}

/// Flatten response headers; repeated names are joined with ", "
fn collect_headers(map: &HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in map {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(key.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ModuleKind;
    use wiremock::matchers::{body_json, body_string, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(server: &MockServer, method: &str, placement: Placement) -> ProbeSpec {
        ProbeSpec {
            id: 0,
            module: ModuleKind::Fuzz,
            method: method.into(),
            url: format!("{}/api", server.uri()),
            injection_point: Some("q".into()),
            payload: Some("a b".into()),
            fields: vec![("q".into(), "a b".into())],
            placement,
            headers: BTreeMap::from([("X-Probe".to_string(), "1".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_query_placement() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("q", "a b"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-trace", "abc").set_body_string("hello"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&TransportConfig::default(), &[]).unwrap();
        let snapshot = transport.send(&spec(&server, "GET", Placement::Query), None).await.unwrap();

        assert_eq!(snapshot.status, 200);
        assert_eq!(snapshot.headers.get("x-trace").map(String::as_str), Some("abc"));
        assert_eq!(snapshot.body.text.as_deref(), Some("hello"));
        assert!(!snapshot.body.truncated);
    }

    #[tokio::test]
    async fn test_json_and_form_placement() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({"q": "a b"})))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(body_string("q=a+b"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(&TransportConfig::default(), &[]).unwrap();
        let json = transport.send(&spec(&server, "POST", Placement::JsonBody), None).await.unwrap();
        let form = transport.send(&spec(&server, "PUT", Placement::FormBody), None).await.unwrap();

        assert_eq!(json.status, 201);
        assert_eq!(form.status, 202);
    }

    #[tokio::test]
    async fn test_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1000)))
            .mount(&server)
            .await;

        let config = TransportConfig {
            max_body_bytes: 100,
            ..TransportConfig::default()
        };
        let transport = ReqwestTransport::new(&config, &[]).unwrap();
        let snapshot = transport.send(&spec(&server, "GET", Placement::Query), None).await.unwrap();

        assert_eq!(snapshot.body.size, 100);
        assert!(snapshot.body.truncated);
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let transport = ReqwestTransport::new(&TransportConfig::default(), &[]).unwrap();
        let mut probe = ProbeSpec {
            id: 0,
            module: ModuleKind::RateLimit,
            method: "GET".into(),
            url: "http://127.0.0.1:1/".into(),
            injection_point: None,
            payload: None,
            fields: Vec::new(),
            placement: Placement::Query,
            headers: BTreeMap::new(),
        };
        let err = transport.send(&probe, None).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connect);

        probe.method = "BAD METHOD".into();
        let err = transport.send(&probe, None).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Request);
    }

    #[test]
    fn test_unknown_endpoint_is_rejected() {
        let transport = ReqwestTransport::new(&TransportConfig::default(), &[]).unwrap();
        let endpoint = Endpoint::parse("http://proxy.local:8080").unwrap();
        assert!(transport.client_for(Some(&endpoint)).is_err());
        assert!(transport.client_for(None).is_ok());
    }
}
