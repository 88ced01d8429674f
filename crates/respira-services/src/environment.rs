//! Air-quality context from OpenWeatherMap, with a deterministic offline
//! fallback.
//!
//! The live path geocodes the postal code, then fetches current weather and
//! air pollution for the coordinates concurrently. Every failure on that path
//! (no key, timeout, transport error, non-2xx status, unexpected body) ends
//! in [`fallback_snapshot`]; callers never see an error.

use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Deserialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use respira_contracts::{
    environment::{EnvironmentSource, EnvironmentalSnapshot},
    error::{RespiraError, RespiraResult},
};
use respira_core::traits::EnvironmentProvider;

const SERVICE: &str = "openweathermap";

/// `[environment]` section of `respira.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub base_url: String,
    /// ISO 3166 country appended to the postal code when geocoding.
    pub country_code: String,
    /// Upper bound on the whole lookup, geocoding included.
    pub timeout_secs: u64,
    /// Read from `OPENWEATHERMAP_API_KEY`, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.openweathermap.org".to_string(),
            country_code: "US".to_string(),
            timeout_secs: 5,
            api_key: None,
        }
    }
}

// ── Upstream payloads ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GeoResponse {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
}

#[derive(Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct PollutionResponse {
    list: Vec<PollutionSample>,
}

#[derive(Deserialize)]
struct PollutionSample {
    main: PollutionIndex,
    components: PollutionComponents,
}

#[derive(Deserialize)]
struct PollutionIndex {
    aqi: u8,
}

#[derive(Deserialize)]
struct PollutionComponents {
    pm2_5: f64,
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// `EnvironmentProvider` backed by the OpenWeatherMap geocoding, weather
/// and air-pollution APIs.
pub struct OpenWeatherProvider {
    client: reqwest::Client,
    config: EnvironmentConfig,
}

impl OpenWeatherProvider {
    /// # Errors
    ///
    /// `ConfigError` if the HTTP client cannot be constructed.
    pub fn new(config: EnvironmentConfig) -> RespiraResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RespiraError::ConfigError {
                reason: format!("cannot build weather HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            config: EnvironmentConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> RespiraResult<T> {
        let upstream = |e: reqwest::Error| RespiraError::Upstream {
            service: SERVICE.to_string(),
            // The query carries the API key; keep it out of logs.
            reason: format!("{path}: {}", e.without_url()),
        };

        self.client
            .get(format!("{}{}", self.config.base_url, path))
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(upstream)?
            .json::<T>()
            .await
            .map_err(upstream)
    }

    async fn fetch(&self, postal_code: &str, api_key: &str) -> RespiraResult<EnvironmentalSnapshot> {
        let geo: GeoResponse = self
            .get_json(
                "/geo/1.0/zip",
                &[
                    ("zip", format!("{},{}", postal_code, self.config.country_code)),
                    ("appid", api_key.to_string()),
                ],
            )
            .await?;

        let coordinates = [("lat", geo.lat.to_string()), ("lon", geo.lon.to_string())];
        let weather_query = [
            coordinates[0].clone(),
            coordinates[1].clone(),
            ("units", "metric".to_string()),
            ("appid", api_key.to_string()),
        ];
        let pollution_query = [
            coordinates[0].clone(),
            coordinates[1].clone(),
            ("appid", api_key.to_string()),
        ];

        let (weather, pollution) = tokio::try_join!(
            self.get_json::<WeatherResponse>("/data/2.5/weather", &weather_query),
            self.get_json::<PollutionResponse>("/data/2.5/air_pollution", &pollution_query),
        )?;

        let sample = pollution.list.into_iter().next().ok_or_else(|| RespiraError::Upstream {
            service: SERVICE.to_string(),
            reason: "air pollution response has no samples".to_string(),
        })?;

        Ok(EnvironmentalSnapshot {
            aqi: sample.main.aqi,
            pm25: sample.components.pm2_5,
            temperature: weather.main.temp,
            humidity: weather.main.humidity.round().clamp(0.0, 100.0) as u8,
            source: EnvironmentSource::Api,
        })
    }
}

impl EnvironmentProvider for OpenWeatherProvider {
    fn get_data<'a>(&'a self, postal_code: &'a str) -> BoxFuture<'a, EnvironmentalSnapshot> {
        Box::pin(async move {
            let Some(api_key) = self.config.api_key.as_deref() else {
                debug!(postal_code, "no weather API key configured; using fallback");
                return fallback_snapshot(postal_code);
            };

            let limit = Duration::from_secs(self.config.timeout_secs);
            let outcome = match tokio::time::timeout(limit, self.fetch(postal_code, api_key)).await {
                Ok(result) => result,
                Err(_) => Err(RespiraError::Upstream {
                    service: SERVICE.to_string(),
                    reason: format!("lookup exceeded {}s", self.config.timeout_secs),
                }),
            };

            match outcome {
                Ok(snapshot) => {
                    debug!(postal_code, aqi = snapshot.aqi, pm25 = snapshot.pm25, "environment fetched");
                    snapshot
                }
                Err(e) => {
                    warn!(postal_code, error = %e, "environment lookup failed; using fallback");
                    fallback_snapshot(postal_code)
                }
            }
        })
    }
}

/// Synthetic but stable metrics for `postal_code`.
///
/// The SHA-256 digest of the code seeds the generator, so the same code
/// always yields the same snapshot across processes and platforms.
pub fn fallback_snapshot(postal_code: &str) -> EnvironmentalSnapshot {
    let seed: [u8; 32] = Sha256::digest(postal_code.as_bytes()).into();
    let mut rng = StdRng::from_seed(seed);

    EnvironmentalSnapshot {
        aqi: rng.gen_range(1..=5),
        pm25: round1(rng.gen_range(5.0..55.0)),
        temperature: round1(rng.gen_range(10.0..35.0)),
        humidity: rng.gen_range(30..=80),
        source: EnvironmentSource::Fallback,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
