//! HTTP client for the AhoyDTU REST API.

use super::api::{CtrlRequest, CtrlResponse, FieldLayout, InverterList, InverterRecord, LiveFields};
use crate::error::{BridgeError, Result};
use log::debug;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct DtuClient {
    http: reqwest::Client,
    base_url: String,
}

impl DtuClient {
    /// Create a client for a DTU base URL such as `http://192.168.1.10`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("[DTU] GET {}", url);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    pub async fn inverter_list(&self) -> Result<InverterList> {
        self.get("/api/inverter/list").await
    }

    /// Field layout reported by the DTU.
    pub async fn field_layout(&self) -> Result<FieldLayout> {
        let live: LiveFields = self.get("/api/live").await?;
        Ok(FieldLayout::from(live))
    }

    pub async fn inverter(&self, id: u32) -> Result<InverterRecord> {
        self.get(&format!("/api/inverter/id/{}", id)).await
    }

    /// Send a non-persistent absolute power limit.
    pub async fn set_power_limit(&self, id: u32, watts: i64) -> Result<()> {
        let url = self.url("/api/ctrl");
        debug!("[DTU] POST {} limit {} W for inverter {}", url, watts, id);
        let response: CtrlResponse = self
            .http
            .post(&url)
            .json(&CtrlRequest::power_limit(id, watts))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.success {
            Ok(())
        } else {
            Err(BridgeError::DtuResponse(
                response
                    .error
                    .unwrap_or_else(|| "command rejected".to_string()),
            ))
        }
    }
}
