//! HTTP clients for the parking backend and the Google Directions API.
//!
//! - [`ParkingApiClient`]: JSON REST client implementing [`SessionBackend`]
//! - [`GoogleDirectionsClient`]: walking directions implementing [`DirectionsService`]
//!
//! Every call is attempted once. There is no retry or backoff here: the next
//! position sample or user action is the retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::{DirectionsService, SessionBackend};
use crate::error::{NavigatorError, Result};
use crate::estimator::DirectionsRoute;
use crate::session::{
    parse_latest_active, AchievementUpdate, LandmarkBatch, NewLandmark, ParkingSession,
    StatusUpdate,
};
use crate::GpsPoint;

/// Default backend address used by the development build.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Google Directions JSON endpoint.
pub const DIRECTIONS_BASE_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// Connection settings for the parking backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct BackendConfig {
    /// Base URL without trailing slash.
    /// Default: http://127.0.0.1:5000
    pub base_url: String,
    /// Request timeout.
    /// Default: 30 seconds
    pub timeout_secs: u64,
    /// Bearer token sent as `Authorization`, when signed in.
    pub auth_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            auth_token: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(NavigatorError::Config {
                message: "base_url is empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NavigatorError::Config {
                message: format!("base_url '{}' is not an http(s) URL", url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(NavigatorError::Config {
                message: "timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the Google Directions client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DirectionsConfig {
    pub api_key: String,
    /// Default: the public Google Directions JSON endpoint
    pub base_url: String,
    /// Default: 15 seconds
    pub timeout_secs: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DIRECTIONS_BASE_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

impl DirectionsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NavigatorError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn transport_error(e: reqwest::Error) -> NavigatorError {
    NavigatorError::Http {
        message: e.to_string(),
        status_code: e.status().map(|s| s.as_u16()),
    }
}

/// Error body shape used by the backend (`{"message": "..."}`).
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Pull a readable message out of a failed response body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

// ============================================================================
// Parking backend
// ============================================================================

/// REST client for the parking backend.
#[derive(Debug, Clone)]
pub struct ParkingApiClient {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
}

impl ParkingApiClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        let client = build_client(config.timeout_secs)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            auth_header: config.auth_token.map(|t| format!("Bearer {}", t)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth_header {
            Some(auth) => builder.header("Authorization", auth),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let start = Instant::now();
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(
            "[ParkingApi] {} -> {} ({} ms)",
            what,
            status,
            start.elapsed().as_millis()
        );

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!("[ParkingApi] {} failed: HTTP {} {}", what, status, message);
        Err(NavigatorError::Http {
            message,
            status_code: Some(status.as_u16()),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(builder, what).await?;
        response.json::<T>().await.map_err(|e| NavigatorError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SessionBackend for ParkingApiClient {
    async fn fetch_latest_active(&self) -> Result<Option<ParkingSession>> {
        let body: serde_json::Value = self
            .send_json(
                self.request(Method::GET, "/parking/latest-active"),
                "GET latest-active",
            )
            .await?;
        parse_latest_active(body)
    }

    async fn update_status(
        &self,
        session_id: i64,
        update: &StatusUpdate,
    ) -> Result<ParkingSession> {
        info!(
            "[ParkingApi] PUT /parking/{} status={}",
            session_id, update.status
        );
        let builder = self
            .request(Method::PUT, &format!("/parking/{}", session_id))
            .json(update);
        self.send_json(builder, "PUT parking").await
    }

    async fn save_landmarks(&self, session_id: i64, landmarks: &[NewLandmark]) -> Result<()> {
        let batch = LandmarkBatch {
            landmarks: landmarks.to_vec(),
        };
        let builder = self
            .request(Method::POST, &format!("/parking/{}/landmarks", session_id))
            .json(&batch);
        self.send(builder, "POST landmarks").await.map(|_| ())
    }

    async fn mark_landmark_achieved(&self, session_id: i64, landmark_id: i64) -> Result<()> {
        let builder = self
            .request(
                Method::PATCH,
                &format!("/parking/{}/landmarks/{}", session_id, landmark_id),
            )
            .json(&AchievementUpdate::achieved());
        self.send(builder, "PATCH landmark").await.map(|_| ())
    }
}

// ============================================================================
// Directions
// ============================================================================

#[derive(Debug, Deserialize)]
struct DirectionsApiResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    #[serde(default)]
    legs: Vec<ApiLeg>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
    duration: ApiValue,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: f64,
}

/// Sum the legs of the first route. A non-`OK` status is an error.
fn parse_directions(response: DirectionsApiResponse) -> Result<DirectionsRoute> {
    if response.status != "OK" {
        return Err(NavigatorError::Directions {
            message: response.error_message.unwrap_or(response.status),
        });
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .filter(|r| !r.legs.is_empty())
        .ok_or_else(|| NavigatorError::Directions {
            message: "No route returned".to_string(),
        })?;

    let (meters, seconds) = route
        .legs
        .iter()
        .fold((0.0, 0.0), |(m, s), leg| (m + leg.distance.value, s + leg.duration.value));

    Ok(DirectionsRoute {
        duration_seconds: seconds,
        distance_km: meters / 1000.0,
    })
}

fn directions_query(origin: &GpsPoint, destination: &GpsPoint, api_key: &str) -> Vec<(&'static str, String)> {
    vec![
        ("origin", format!("{},{}", origin.latitude, origin.longitude)),
        (
            "destination",
            format!("{},{}", destination.latitude, destination.longitude),
        ),
        ("mode", "walking".to_string()),
        ("key", api_key.to_string()),
    ]
}

/// Walking directions from the Google Directions API.
#[derive(Debug, Clone)]
pub struct GoogleDirectionsClient {
    client: Client,
    config: DirectionsConfig,
}

impl GoogleDirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(NavigatorError::Config {
                message: "Directions API key is empty".to_string(),
            });
        }
        let client = build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl DirectionsService for GoogleDirectionsClient {
    async fn walking_route(
        &self,
        origin: GpsPoint,
        destination: GpsPoint,
    ) -> Result<DirectionsRoute> {
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&directions_query(&origin, &destination, &self.config.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NavigatorError::Http {
                message: format!("Directions HTTP {}", status),
                status_code: Some(status.as_u16()),
            });
        }
        let body: DirectionsApiResponse =
            response.json().await.map_err(|e| NavigatorError::Decode {
                message: e.to_string(),
            })?;
        let route = parse_directions(body)?;
        debug!(
            "[Directions] Walking route: {:.2} km, {:.0} s",
            route.distance_km, route.duration_seconds
        );
        Ok(route)
    }
}

// ============================================================================
// Blocking wrappers (FFI)
// ============================================================================

/// Fetch the latest active session, blocking on a fresh tokio runtime.
#[cfg(feature = "ffi")]
pub fn fetch_latest_active_blocking(config: BackendConfig) -> Result<Option<ParkingSession>> {
    use tokio::runtime::Runtime;

    let client = ParkingApiClient::new(config)?;
    let rt = Runtime::new().map_err(|e| NavigatorError::Config {
        message: format!("Runtime error: {}", e),
    })?;
    rt.block_on(client.fetch_latest_active())
}
