use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors from a single analysis fetch. The synthesizer absorbs all of them
/// by falling through to the next tier.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("{0}")]
    Unavailable(String),
}

/// Per-segment descriptors as returned by the analysis endpoint.
/// Times are in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub start: f64,
    pub duration: f64,
    #[serde(default)]
    pub loudness_max: f32,
    #[serde(default)]
    pub timbre: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioAnalysisResponse {
    #[serde(default)]
    pub segments: Vec<SegmentResponse>,
}

/// Track-level descriptors. Any field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioFeaturesResponse {
    pub tempo: Option<f32>,
    pub energy: Option<f32>,
    pub danceability: Option<f32>,
    pub valence: Option<f32>,
}

/// Source of remote analysis data for a track.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn audio_analysis(
        &self,
        track_id: &str,
        credential: &str,
    ) -> Result<AudioAnalysisResponse, FetchError>;

    async fn audio_features(
        &self,
        track_id: &str,
        credential: &str,
    ) -> Result<AudioFeaturesResponse, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AnalysisApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.spotify.com/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

/// [`AnalysisApi`] over HTTPS with bearer authentication.
pub struct HttpAnalysisApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAnalysisApi {
    pub fn new(config: &AnalysisApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid analysis base url {}: {}", config.base_url, e))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, resource: &str, track_id: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Unavailable(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(resource)
            .push(track_id);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        track_id: &str,
        credential: &str,
    ) -> Result<T, FetchError> {
        let url = self.endpoint(resource, track_id)?;
        log::debug!("GET {}", url);

        let response = self.client.get(url).bearer_auth(credential).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: resource,
                status: status.as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn audio_analysis(
        &self,
        track_id: &str,
        credential: &str,
    ) -> Result<AudioAnalysisResponse, FetchError> {
        self.get_json("audio-analysis", track_id, credential).await
    }

    async fn audio_features(
        &self,
        track_id: &str,
        credential: &str,
    ) -> Result<AudioFeaturesResponse, FetchError> {
        self.get_json("audio-features", track_id, credential).await
    }
}
