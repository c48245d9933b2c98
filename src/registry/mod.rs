//! Registry version oracles

pub mod crates_io;
pub mod sparse_index;

pub use crates_io::CratesIoOracle;
pub use sparse_index::{index_path, SparseIndexOracle};

use anyhow::Context;
use log::debug;
use reqwest::Client;
use std::time::Duration;

use crate::core::config::{OracleKind, OracleSettings};
use crate::core::traits::VersionOracle;

const USER_AGENT: &str = concat!("publish-crates/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the oracle selected by the settings
pub fn load_oracle(settings: &OracleSettings) -> anyhow::Result<Box<dyn VersionOracle>> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("HTTPクライアントの初期化に失敗しました")?;

    let oracle: Box<dyn VersionOracle> = match settings.kind {
        OracleKind::Api => Box::new(CratesIoOracle::new(client, settings.api_url.clone())),
        OracleKind::Sparse => Box::new(SparseIndexOracle::new(client, settings.index_url.clone())),
    };
    debug!("using {} oracle", oracle.name());

    Ok(oracle)
}
