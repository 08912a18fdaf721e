//! InfluxDB 1.x HTTP query client

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use http::{header, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::application::collect::TimeSeriesSource;
use crate::application::window::TimeWindow;
use crate::config::InfluxSettings;
use crate::domain::Point;
use crate::error::{Error, Result};
use crate::infrastructure::log_messages::errors;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Client for the `/query` endpoint, returning epoch-millisecond timestamps
pub struct InfluxClient {
    base_url: String,
    database: String,
    authorization: Option<String>,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl InfluxClient {
    pub fn new(base_url: String, settings: &InfluxSettings) -> Self {
        let authorization = (!settings.username.is_empty()).then(|| {
            let credentials = format!("{}:{}", settings.username, settings.password);
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(credentials)
            )
        });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            database: settings.database_name.clone(),
            authorization,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_uri(&self, measurement: &str, window: &TimeWindow) -> String {
        let statement = select_statement(measurement, window);
        format!(
            "{}/query?db={}&epoch=ms&q={}",
            self.base_url,
            urlencoding::encode(&self.database),
            urlencoding::encode(&statement)
        )
    }
}

/// `SELECT` over the half-open window so adjacent windows never share a point
pub fn select_statement(measurement: &str, window: &TimeWindow) -> String {
    format!(
        "SELECT * FROM {measurement} WHERE time >= '{}' AND time < '{}'",
        window.start_str(),
        window.end_str()
    )
}

fn parse_response(body: &[u8]) -> Result<Vec<Point>> {
    let response: QueryResponse = serde_json::from_slice(body)?;
    if let Some(error) = response.error {
        return Err(Error::Influx(format!("{}: {error}", errors::STATEMENT_ERROR)));
    }

    let mut points = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(Error::Influx(format!("{}: {error}", errors::STATEMENT_ERROR)));
        }
        for series in result.series {
            points.extend(series.values.into_iter().map(|row| {
                series
                    .columns
                    .iter()
                    .cloned()
                    .zip(row)
                    .collect::<Point>()
            }));
        }
    }
    Ok(points)
}

#[async_trait]
impl TimeSeriesSource for InfluxClient {
    #[instrument(skip(self, window), fields(window = %window))]
    async fn query(&self, measurement: &str, window: &TimeWindow) -> Result<Vec<Point>> {
        let uri = self.query_uri(measurement, window);
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .header(header::ACCEPT, "application/json");
        if let Some(authorization) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| Error::Http(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::Http(format!("{}: {e}", errors::CONNECTION_ERROR)))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Http(format!("{}: {e}", errors::CONNECTION_ERROR)))?
            .to_bytes();

        if status != StatusCode::OK {
            return Err(Error::Influx(format!(
                "{} {status} from {}: {}",
                errors::UNEXPECTED_STATUS,
                self.base_url,
                String::from_utf8_lossy(&body)
            )));
        }

        parse_response(&body)
    }
}
