//! Process configuration: built-in defaults, optionally overlaid by a JSON file
//! named in `STOWAGE_CONFIG`, then by individual `STOWAGE_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::idgen::{default_origin_ms, IdGenerator, MAX_CONTEXT};
use crate::resolver::FsResolver;
use crate::transfer::{ChecksumAlgorithm, ContentStore};

pub const ENV_CONFIG: &str = "STOWAGE_CONFIG";
pub const ENV_ROOT: &str = "STOWAGE_ROOT";
pub const ENV_ID_EPOCH_MS: &str = "STOWAGE_ID_EPOCH_MS";
pub const ENV_DEPLOYMENT_CONTEXT: &str = "STOWAGE_DEPLOYMENT_CONTEXT";
pub const ENV_CHECKSUM: &str = "STOWAGE_CHECKSUM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StowageConfig {
    /// Directory served by the local resolver and written by the content store.
    pub storage_root: PathBuf,
    /// Identifier time origin, milliseconds since the UNIX epoch.
    pub id_epoch_ms: u64,
    /// Distinguishes generators of different deployments; 10 bits.
    pub deployment_context: u16,
    pub checksum: ChecksumAlgorithm,
    /// Bundle even single-node responses into a tar archive.
    pub always_archive: bool,
}

impl Default for StowageConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data"),
            id_epoch_ms: default_origin_ms(),
            deployment_context: 0,
            checksum: ChecksumAlgorithm::Sha256,
            always_archive: false,
        }
    }
}

impl StowageConfig {
    /// Defaults, then the `STOWAGE_CONFIG` file if set, then `STOWAGE_*` overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    /// Same layering as [`Self::load`] with an explicit variable lookup.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match lookup(ENV_CONFIG).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_json_file(Path::new(path.trim()))?,
            None => Self::default(),
        };
        cfg.apply_env(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(v) = get(ENV_ROOT) {
            self.storage_root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_ID_EPOCH_MS) {
            self.id_epoch_ms = v.parse().with_context(|| format!("{} must be milliseconds, got '{}'", ENV_ID_EPOCH_MS, v))?;
        }
        if let Some(v) = get(ENV_DEPLOYMENT_CONTEXT) {
            self.deployment_context =
                v.parse().with_context(|| format!("{} must be an integer, got '{}'", ENV_DEPLOYMENT_CONTEXT, v))?;
        }
        if let Some(v) = get(ENV_CHECKSUM) {
            self.checksum = v.parse().map_err(|e: String| anyhow::anyhow!("{}: {}", ENV_CHECKSUM, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.deployment_context > MAX_CONTEXT {
            bail!("deployment_context {} exceeds {}", self.deployment_context, MAX_CONTEXT);
        }
        Ok(())
    }

    pub fn id_generator(&self) -> IdGenerator {
        IdGenerator::new(self.id_epoch_ms, self.deployment_context)
    }

    pub fn resolver(&self) -> FsResolver {
        FsResolver::new(&self.storage_root)
    }

    pub fn content_store(&self, ids: Arc<IdGenerator>) -> ContentStore {
        ContentStore::new(&self.storage_root, ids, self.checksum)
    }
}
