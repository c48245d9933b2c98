//! crates.io web API oracle
//!
//! Queries `GET {api}/api/v1/crates/{name}` and looks for the exact version
//! in the returned version list. Yanked versions still count as visible: the
//! registry will not accept them again.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use semver::Version;
use serde::Deserialize;

use crate::core::traits::VersionOracle;

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(default)]
    versions: Vec<CrateVersion>,
}

#[derive(Debug, Deserialize)]
struct CrateVersion {
    num: String,
}

/// Version oracle backed by the crates.io web API
pub struct CratesIoOracle {
    client: Client,
    api_url: String,
}

impl CratesIoOracle {
    /// Create an oracle for the API at `api_url` (e.g. `https://crates.io`)
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn crate_url(&self, name: &str) -> String {
        format!("{}/api/v1/crates/{}", self.api_url, name)
    }
}

#[async_trait]
impl VersionOracle for CratesIoOracle {
    fn name(&self) -> &str {
        "crates-io-api"
    }

    async fn is_version_visible(&self, name: &str, version: &Version) -> anyhow::Result<bool> {
        let url = self.crate_url(name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{} への接続に失敗しました", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "{} の情報を取得できませんでした（HTTP {}）",
                name,
                response.status()
            );
        }

        let info = response
            .json::<CrateResponse>()
            .await
            .with_context(|| format!("{} のレスポンスを解析できませんでした", url))?;

        Ok(info
            .versions
            .iter()
            .filter_map(|v| Version::parse(&v.num).ok())
            .any(|v| &v == version))
    }
}
