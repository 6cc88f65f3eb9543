//! HTTP client for the identity API.
//!
//! One pooled [`reqwest::Client`] is shared by every lookup the process
//! makes, so TLS sessions and keep-alive connections are reused.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Map, Value};

use comprobante_core::config::{IdentityApiConfig, MAX_CALL_TIMEOUT};
use comprobante_core::{DocumentKind, Enrichment};

use crate::traits::{EnrichError, IdentityLookup};

/// Looks up DNI/RUC numbers via `POST {base_url}/api/{dni|ruc}`.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpIdentityClient {
    /// Build a client with a fixed bearer token.
    ///
    /// `timeout` is capped at [`MAX_CALL_TIMEOUT`] so a slow registry cannot
    /// stall a consumer for longer than that per message.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, EnrichError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| EnrichError::Config(format!("invalid token: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let timeout = timeout.min(MAX_CALL_TIMEOUT);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// Construct from config-level settings. A missing token is a config error.
    pub fn from_config(config: &IdentityApiConfig) -> Result<Self, EnrichError> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| EnrichError::Config("SUNAT_TOKEN is not set".to_string()))?;
        Self::new(&config.base_url, token, config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, kind: DocumentKind) -> String {
        format!("{}/api/{}", self.base_url, kind.lookup_endpoint())
    }
}

#[async_trait::async_trait]
impl IdentityLookup for HttpIdentityClient {
    async fn lookup(&self, kind: DocumentKind, number: &str) -> Enrichment {
        let url = self.endpoint(kind);
        let mut body = Map::new();
        body.insert(kind.identity_field().to_string(), Value::String(number.to_string()));

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%kind, url = %url, error = %e, timeout = e.is_timeout(), "identity lookup failed");
                return Enrichment::failure(kind.unreachable_message());
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(%kind, url = %url, %status, "identity API returned non-200 status");
            return Enrichment::failure(format!("HTTP {}", status.as_u16()));
        }

        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "identity API body is not JSON");
                return Enrichment::failure(kind.unreachable_message());
            }
        };

        match payload.get("data") {
            Some(Value::Object(data)) => {
                tracing::debug!(%kind, fields = data.len(), "identity lookup succeeded");
                Enrichment::Success { data: data.clone() }
            }
            _ => {
                tracing::warn!(%kind, "identity API response has no data object");
                Enrichment::failure("respuesta inválida")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> HttpIdentityClient {
        HttpIdentityClient::new(&server.base_url(), "tok-123", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn dni_lookup_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/dni")
                    .header("authorization", "Bearer tok-123")
                    .header("content-type", "application/json")
                    .json_body(json!({"dni": "72257140"}));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"success": true, "data": {"nombres": "ANA", "numero": "72257140"}}));
            })
            .await;

        let result = client(&server).lookup(DocumentKind::Boleta, "72257140").await;

        mock.assert_async().await;
        match result {
            Enrichment::Success { data } => assert_eq!(data["nombres"], "ANA"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ruc_lookup_hits_ruc_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/ruc")
                    .json_body(json!({"ruc": "20123456789"}));
                then.status(200)
                    .json_body(json!({"data": {"nombre_o_razon_social": "ACME SAC"}}));
            })
            .await;

        let result = client(&server).lookup(DocumentKind::Factura, "20123456789").await;

        mock.assert_async().await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn http_500_maps_to_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/dni");
                then.status(500);
            })
            .await;

        let result = client(&server).lookup(DocumentKind::Boleta, "72257140").await;
        assert_eq!(result, Enrichment::failure("HTTP 500"));
    }

    #[tokio::test]
    async fn missing_data_object_is_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/dni");
                then.status(200).json_body(json!({"success": false, "message": "no encontrado"}));
            })
            .await;

        let result = client(&server).lookup(DocumentKind::Boleta, "00000000").await;
        assert_eq!(result, Enrichment::failure("respuesta inválida"));
    }

    #[tokio::test]
    async fn timeout_maps_to_unreachable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/ruc");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({"data": {}}));
            })
            .await;

        let client =
            HttpIdentityClient::new(&server.base_url(), "tok", Duration::from_millis(50)).unwrap();
        let result = client.lookup(DocumentKind::Factura, "20123456789").await;
        assert_eq!(result, Enrichment::failure("Error de conexión con SUNAT"));
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_failure() {
        let client =
            HttpIdentityClient::new("http://127.0.0.1:1", "tok", Duration::from_millis(200)).unwrap();
        let result = client.lookup(DocumentKind::Boleta, "72257140").await;
        assert_eq!(result, Enrichment::failure("Error de conexión con API DNI"));
    }

    #[test]
    fn timeout_is_capped() {
        let client =
            HttpIdentityClient::new("https://apiperu.dev/", "tok", Duration::from_secs(60)).unwrap();
        assert_eq!(client.timeout(), MAX_CALL_TIMEOUT);
        assert_eq!(client.endpoint(DocumentKind::Boleta), "https://apiperu.dev/api/dni");
    }

    #[test]
    fn from_config_requires_token() {
        let config = IdentityApiConfig {
            base_url: "https://apiperu.dev".into(),
            token: None,
            timeout_secs: 6,
        };
        let err = HttpIdentityClient::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("SUNAT_TOKEN"));
    }
}
