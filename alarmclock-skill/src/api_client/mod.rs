//! HTTP client for the skill's local API.

pub mod types;

use anyhow::{Result, bail};

use types::{AlarmState, SiteState};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7786";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<String> {
        let response = self.http.get(self.url("/health")).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }

    pub async fn get_alarms(&self) -> Result<Vec<AlarmState>> {
        self.get_json("/alarms").await
    }

    pub async fn get_missed(&self) -> Result<Vec<AlarmState>> {
        self.get_json("/alarms/missed").await
    }

    pub async fn get_sites(&self) -> Result<Vec<SiteState>> {
        self.get_json("/sites").await
    }

    pub async fn stop_ringing(&self, site_id: &str) -> Result<SiteState> {
        let response = self
            .http
            .post(self.url(&format!("/sites/{site_id}/stop")))
            .send()
            .await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => bail!("unknown site {site_id}"),
            reqwest::StatusCode::CONFLICT => bail!("site {site_id} is not ringing"),
            _ => Ok(response.error_for_status()?.json().await?),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{path}", self.base_url)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
