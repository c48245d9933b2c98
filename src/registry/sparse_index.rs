//! Sparse index oracle
//!
//! Reads the crate's index file (newline-delimited JSON, one line per
//! published version) from a sparse registry index. Caching proxies are told
//! not to serve a stale copy, since the file changes right after a publish.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, StatusCode};
use semver::Version;
use serde::Deserialize;

use crate::core::traits::VersionOracle;

#[derive(Debug, Deserialize)]
struct IndexEntry {
    vers: String,
}

/// Version oracle backed by a sparse registry index
pub struct SparseIndexOracle {
    client: Client,
    index_url: String,
}

impl SparseIndexOracle {
    /// Create an oracle for the index at `index_url`
    ///
    /// A `sparse+` prefix, as written in cargo config, is accepted.
    pub fn new(client: Client, index_url: impl Into<String>) -> Self {
        let index_url = index_url.into();
        let index_url = index_url
            .strip_prefix("sparse+")
            .unwrap_or(index_url.as_str())
            .trim_end_matches('/')
            .to_string();
        Self { client, index_url }
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/{}", self.index_url, index_path(name))
    }
}

/// Path of a crate's file within the index
///
/// # Examples
///
/// ```
/// use publish_crates::registry::index_path;
///
/// assert_eq!(index_path("a"), "1/a");
/// assert_eq!(index_path("ab"), "2/ab");
/// assert_eq!(index_path("abc"), "3/a/abc");
/// assert_eq!(index_path("Serde"), "se/rd/serde");
/// ```
pub fn index_path(name: &str) -> String {
    let name = name.to_lowercase();
    let chars: Vec<char> = name.chars().collect();
    let prefix = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();
    match chars.len() {
        0..=2 => format!("{}/{}", chars.len(), name),
        3 => format!("3/{}/{}", prefix(0..1), name),
        _ => format!("{}/{}/{}", prefix(0..2), prefix(2..4), name),
    }
}

#[async_trait]
impl VersionOracle for SparseIndexOracle {
    fn name(&self) -> &str {
        "sparse-index"
    }

    async fn is_version_visible(&self, name: &str, version: &Version) -> anyhow::Result<bool> {
        let url = self.file_url(name);
        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .with_context(|| format!("{} への接続に失敗しました", url))?;

        // Some registries answer 403 for crates they have never seen
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Ok(false);
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "{} のインデックスを取得できませんでした（HTTP {}）",
                name,
                response.status()
            );
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("{} の読み込みに失敗しました", url))?;

        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let entry: IndexEntry = serde_json::from_str(line)
                .with_context(|| format!("{} のインデックス行を解析できませんでした", name))?;
            if Version::parse(&entry.vers).is_ok_and(|v| &v == version) {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
