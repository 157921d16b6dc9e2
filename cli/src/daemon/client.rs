// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with the gateway API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use nfsg_core::presentation::api::{CreateVolumeRequest, VolumeResponse};

pub type VolumeInfo = VolumeResponse;

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    /// `addr` is either `host:port` or a full `http(s)://` URL
    pub fn new(addr: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let base_url = Url::parse(&base).with_context(|| format!("Invalid gateway address '{}'", addr))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn volume_url(&self, name: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Gateway address cannot be a base URL: {}", self.base_url))?;
            segments.pop_if_empty().push("volume");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    pub async fn create_volume(
        &self,
        name: &str,
        hosts: Vec<String>,
        options: Option<String>,
    ) -> Result<VolumeInfo> {
        let mut url = self.volume_url(None)?;
        url.query_pairs_mut().append_pair("name", name);

        let request = CreateVolumeRequest {
            hosts: Some(hosts),
            options,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .context("Failed to create volume")?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => response
                .json()
                .await
                .context("Failed to parse create response"),
            StatusCode::CONFLICT => anyhow::bail!("Volume '{}' already exists", name),
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                anyhow::bail!("Failed to create volume: {}", error_text.trim());
            }
        }
    }

    /// `None` when the gateway has no such volume
    pub async fn get_volume(&self, name: &str) -> Result<Option<VolumeInfo>> {
        let response = self
            .client
            .get(self.volume_url(Some(name))?)
            .send()
            .await
            .context("Failed to get volume")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .context("Failed to parse volume response"),
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                anyhow::bail!("Failed to get volume: {}", error_text.trim());
            }
        }
    }

    pub async fn delete_volume(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.volume_url(Some(name))?)
            .send()
            .await
            .context("Failed to delete volume")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to delete volume: {}", error_text.trim());
        }

        Ok(())
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let mut url = self.base_url.clone();
        url.set_path("/health");

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .context("Gateway is not reachable")?;

        if !response.status().is_success() {
            anyhow::bail!("Gateway is unhealthy: HTTP {}", response.status());
        }

        response.json().await.context("Failed to parse health response")
    }
}
