//! Google Fit dataset client.
//!
//! Reads aggregated calorie-expenditure points from
//! `GET {base}/users/{user}/dataSources/{source}/datasets/{start}-{end}`.
//! The bearer token is supplied from configuration; this client never runs
//! an authorization flow.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::source::ActivitySource;
use super::types::{RawPoint, SyncError};
use crate::error::ConfigError;
use crate::storage::ActivityConfig;

/// Google Fit dataset API client.
#[derive(Debug, Clone)]
pub struct GoogleFitSource {
    client: Client,
    base_url: Url,
    user_id: String,
    data_source_id: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetResponse {
    #[serde(default)]
    point: Vec<DatasetPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetPoint {
    start_time_nanos: NanosField,
    end_time_nanos: NanosField,
    #[serde(default)]
    value: Vec<PointValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointValue {
    fp_val: Option<f64>,
}

/// int64 fields arrive as JSON strings; accept bare numbers as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NanosField {
    Text(String),
    Number(i64),
}

impl NanosField {
    fn to_nanos(&self) -> Option<i64> {
        match self {
            NanosField::Text(s) => s.trim().parse().ok(),
            NanosField::Number(n) => Some(*n),
        }
    }
}

impl GoogleFitSource {
    /// Create a client rooted at `base_url`.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn new(
        base_url: &str,
        user_id: impl Into<String>,
        data_source_id: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            key: "activity.base_url".into(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: "activity.base_url".into(),
                message: format!("'{base_url}' cannot be used as a base URL"),
            });
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            user_id: user_id.into(),
            data_source_id: data_source_id.into(),
            access_token,
        })
    }

    pub fn from_config(config: &ActivityConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.base_url,
            config.user_id.clone(),
            config.data_source_id.clone(),
            config.resolved_access_token(),
        )
    }

    fn dataset_url(&self, start_nanos: i64, end_nanos: i64) -> Url {
        let window = format!("{start_nanos}-{end_nanos}");
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "users",
                self.user_id.as_str(),
                "dataSources",
                self.data_source_id.as_str(),
                "datasets",
                window.as_str(),
            ]);
        }
        url
    }
}

/// Decode a dataset response body into raw points.
pub fn parse_dataset(body: &str) -> Result<Vec<RawPoint>, SyncError> {
    let response: DatasetResponse =
        serde_json::from_str(body).map_err(|e| SyncError::MalformedResponse(e.to_string()))?;

    response
        .point
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let malformed = |what: &str| SyncError::MalformedResponse(format!("point {i}: {what}"));
            let start = point
                .start_time_nanos
                .to_nanos()
                .ok_or_else(|| malformed("unreadable startTimeNanos"))?;
            let end = point
                .end_time_nanos
                .to_nanos()
                .ok_or_else(|| malformed("unreadable endTimeNanos"))?;
            let calories = point
                .value
                .first()
                .and_then(|v| v.fp_val)
                .ok_or_else(|| malformed("missing value[0].fpVal"))?;
            Ok(RawPoint::new(start, end, calories))
        })
        .collect()
}

impl ActivitySource for GoogleFitSource {
    async fn fetch_points(
        &self,
        start_nanos: i64,
        end_nanos: i64,
    ) -> Result<Vec<RawPoint>, SyncError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| SyncError::RemoteAuth("no access token configured".into()))?;

        let url = self.dataset_url(start_nanos, end_nanos);
        tracing::debug!("fetching expenditure points from {url}");

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::RemoteAuth(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SyncError::TransientNetwork(format!("HTTP {status}")));
        }

        let body = response.text().await?;
        parse_dataset(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str =
        "derived:com.google.calories.expended:com.google.android.gms:merge_calories_expended";

    fn source_for(server: &mockito::Server, token: Option<&str>) -> GoogleFitSource {
        GoogleFitSource::new(&server.url(), "me", SOURCE, token.map(String::from)).unwrap()
    }

    fn dataset_path(start: i64, end: i64) -> String {
        format!("/users/me/dataSources/{SOURCE}/datasets/{start}-{end}")
    }

    #[test]
    fn parse_dataset_reads_points() {
        let body = r#"{
            "minStartTimeNs": "0",
            "point": [
                {"startTimeNanos": "1000", "endTimeNanos": "2000",
                 "dataTypeName": "com.google.calories.expended",
                 "value": [{"fpVal": 12.5, "mapVal": []}]},
                {"startTimeNanos": 2000, "endTimeNanos": 3000, "value": [{"fpVal": 0.75}]}
            ]
        }"#;
        let points = parse_dataset(body).unwrap();
        assert_eq!(
            points,
            vec![RawPoint::new(1000, 2000, 12.5), RawPoint::new(2000, 3000, 0.75)]
        );
    }

    #[test]
    fn parse_dataset_without_points_is_empty() {
        assert!(parse_dataset(r#"{"dataSourceId": "x"}"#).unwrap().is_empty());
    }

    #[test]
    fn parse_dataset_rejects_missing_value() {
        let body = r#"{"point": [{"startTimeNanos": "1", "endTimeNanos": "2", "value": []}]}"#;
        assert!(matches!(
            parse_dataset(body),
            Err(SyncError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_dataset("<html>"),
            Err(SyncError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn fetch_points_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", dataset_path(100, 200).as_str())
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"point": [{"startTimeNanos": "100", "endTimeNanos": "150", "value": [{"fpVal": 3.0}]}]}"#,
            )
            .create_async()
            .await;

        let points = source_for(&server, Some("test-token"))
            .fetch_points(100, 200)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(points, vec![RawPoint::new(100, 150, 3.0)]);
    }

    #[tokio::test]
    async fn fetch_points_maps_unauthorized_to_remote_auth() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", dataset_path(1, 2).as_str())
            .with_status(401)
            .create_async()
            .await;

        let result = source_for(&server, Some("expired")).fetch_points(1, 2).await;
        assert!(matches!(result, Err(SyncError::RemoteAuth(_))));
    }

    #[tokio::test]
    async fn fetch_points_maps_server_error_to_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", dataset_path(1, 2).as_str())
            .with_status(503)
            .create_async()
            .await;

        let result = source_for(&server, Some("token")).fetch_points(1, 2).await;
        assert!(matches!(result, Err(SyncError::TransientNetwork(_))));
    }

    #[tokio::test]
    async fn fetch_points_without_token_fails_fast() {
        let server = mockito::Server::new_async().await;
        let result = source_for(&server, None).fetch_points(1, 2).await;
        assert!(matches!(result, Err(SyncError::RemoteAuth(_))));
    }

    #[test]
    fn dataset_url_keeps_base_path() {
        let source = GoogleFitSource::new(
            "https://www.googleapis.com/fitness/v1",
            "me",
            SOURCE,
            None,
        )
        .unwrap();
        let url = source.dataset_url(5, 9);
        assert_eq!(
            url.as_str(),
            format!("https://www.googleapis.com/fitness/v1/users/me/dataSources/{SOURCE}/datasets/5-9")
        );
    }
}
