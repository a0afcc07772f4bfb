//! PostgREST table access.

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::geometry::PairOrder;
use crate::models::Record;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid service url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Where to read rows from. Mirrors the viewer's connection form.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub service_url: String,
    pub api_key: String,
    pub table: String,
    pub geom_field: String,
    pub pair_order: PairOrder,
}

/// Partial override sent with a load request; unset fields keep the
/// configured value.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SourceOverrides {
    pub service_url: Option<String>,
    pub api_key: Option<String>,
    pub table: Option<String>,
    pub geom_field: Option<String>,
    pub pair_order: Option<PairOrder>,
}

impl SourceConfig {
    pub fn with_overrides(&self, overrides: SourceOverrides) -> Self {
        Self {
            service_url: overrides.service_url.unwrap_or_else(|| self.service_url.clone()),
            api_key: overrides.api_key.unwrap_or_else(|| self.api_key.clone()),
            table: overrides.table.unwrap_or_else(|| self.table.clone()),
            geom_field: overrides.geom_field.unwrap_or_else(|| self.geom_field.clone()),
            pair_order: overrides.pair_order.unwrap_or(self.pair_order),
        }
    }

    /// Trims every field and checks the three required ones are present.
    pub fn validate(&self) -> Result<TableQuery, ConfigError> {
        let service_url = self.service_url.trim();
        let api_key = self.api_key.trim();
        let table = self.table.trim();

        let missing: Vec<&'static str> = [
            ("service_url", service_url),
            ("api_key", api_key),
            ("table", table),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let base = Url::parse(service_url.trim_end_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", service_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(service_url.to_string()));
        }

        Ok(TableQuery {
            base,
            api_key: api_key.to_string(),
            table: table.to_string(),
            geom_field: self.geom_field.trim().to_string(),
            pair_order: self.pair_order,
        })
    }
}

/// A validated [`SourceConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub base: Url,
    pub api_key: String,
    pub table: String,
    pub geom_field: String,
    pub pair_order: PairOrder,
}

impl TableQuery {
    /// `{base}/rest/v1/{table}?select=*[,{geom_field}]`
    pub fn url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["rest", "v1", self.table.as_str()]);
        }
        let select = if self.geom_field.is_empty() {
            "*".to_string()
        } else {
            format!("*,{}", self.geom_field)
        };
        url.query_pairs_mut().clear().append_pair("select", &select);
        url
    }
}

pub trait RecordSource: Send + Sync {
    fn fetch(&self, query: &TableQuery) -> impl Future<Output = Result<Vec<Record>, FetchError>> + Send;
}

#[derive(Clone)]
pub struct PostgrestSource {
    client: Client,
}

impl PostgrestSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl RecordSource for PostgrestSource {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Record>, FetchError> {
        let url = query.url();
        debug!("fetching rows from {}", url);

        let resp = self
            .client
            .get(url)
            .header("apikey", &query.api_key)
            .bearer_auth(&query.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Error HTTP {}", status.as_u16()));
            warn!("table {} returned {}: {}", query.table, status, message);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        match body {
            serde_json::Value::Array(rows) => Ok(rows.into_iter().map(Record::from).collect()),
            other => Err(FetchError::Decode(format!("expected a JSON array, got {}", kind_of(&other)))),
        }
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    fn config(url: &str) -> SourceConfig {
        SourceConfig {
            service_url: url.to_string(),
            api_key: "secret".to_string(),
            table: "camaras".to_string(),
            geom_field: "geom".to_string(),
            pair_order: PairOrder::Heuristic,
        }
    }

    #[test]
    fn missing_settings_are_all_reported() {
        let cfg = SourceConfig {
            service_url: "  ".to_string(),
            table: "camaras".to_string(),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Missing(vec!["service_url", "api_key"]))
        );
    }

    #[test]
    fn query_url_includes_geometry_column() {
        let query = config(" https://abc.supabase.co/ ").validate().unwrap();
        assert_eq!(
            query.url().as_str(),
            "https://abc.supabase.co/rest/v1/camaras?select=*%2Cgeom"
        );

        let mut cfg = config("https://abc.supabase.co");
        cfg.geom_field = String::new();
        assert_eq!(
            cfg.validate().unwrap().url().as_str(),
            "https://abc.supabase.co/rest/v1/camaras?select=*"
        );
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let base = config("https://abc.supabase.co");
        let merged = base.with_overrides(SourceOverrides {
            table: Some("puntos".to_string()),
            pair_order: Some(PairOrder::LatLng),
            ..Default::default()
        });
        assert_eq!(merged.table, "puntos");
        assert_eq!(merged.pair_order, PairOrder::LatLng);
        assert_eq!(merged.api_key, "secret");
    }

    #[test]
    fn relative_url_is_rejected() {
        assert!(matches!(
            config("abc.supabase.co").validate(),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    async fn table(Path(table): Path<String>, headers: HeaderMap) -> axum::response::Response {
        let key = headers.get("apikey").and_then(|v| v.to_str().ok());
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if key != Some("secret") || auth != Some("Bearer secret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid API key"}))).into_response();
        }
        match table.as_str() {
            "camaras" => Json(json!([
                {"id": 1, "geom": {"type": "Point", "coordinates": [-68.1, -16.5]}},
                {"id": 2, "geom": "POINT(-68.2 -16.4)"}
            ]))
            .into_response(),
            "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response(),
            _ => Json(json!({"rows": []})).into_response(),
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/rest/v1/{table}", get(table));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetches_rows_with_key_headers() {
        let base = serve().await;
        let source = PostgrestSource::new(Client::new());
        let rows = source.fetch(&config(&base).validate().unwrap()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let base = serve().await;
        let source = PostgrestSource::new(Client::new());
        let mut cfg = config(&base);
        cfg.api_key = "wrong".to_string();

        match source.fetch(&cfg.validate().unwrap()).await {
            Err(FetchError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn non_json_error_falls_back_to_status() {
        let base = serve().await;
        let source = PostgrestSource::new(Client::new());
        let mut cfg = config(&base);
        cfg.table = "broken".to_string();

        let err = source.fetch(&cfg.validate().unwrap()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500: Error HTTP 500");
    }

    #[tokio::test]
    async fn non_array_body_is_a_decode_error() {
        let base = serve().await;
        let source = PostgrestSource::new(Client::new());
        let mut cfg = config(&base);
        cfg.table = "other".to_string();

        assert!(matches!(
            source.fetch(&cfg.validate().unwrap()).await,
            Err(FetchError::Decode(_))
        ));
    }
}
