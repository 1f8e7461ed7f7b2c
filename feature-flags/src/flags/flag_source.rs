use std::path::PathBuf;

use async_trait::async_trait;
use tracing::instrument;

use crate::errors::FlagError;
use crate::flags::flag_models::ServerPayload;

/// Wherever the server flag list comes from. Retries and transport errors are the
/// source's business; the resolver only sees the settled result.
#[async_trait]
pub trait FlagSource {
    async fn fetch(&self) -> Result<ServerPayload, FlagError>;
}

/// Reads a flag list (bare or `{"data": [...]}`) from a JSON file.
pub struct FileFlagSource {
    path: PathBuf,
}

impl FileFlagSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FlagSource for FileFlagSource {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<ServerPayload, FlagError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            tracing::error!("failed to read flag file: {}", e);
            FlagError::FetchFailed(format!("{}: {}", self.path.display(), e))
        })?;
        ServerPayload::from_json(&contents)
    }
}
