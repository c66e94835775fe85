//! Configuration file types.
//!
//! These types represent the user-authored `Honefile.yaml`.

use crate::cache::Compression;
use crate::job::Job;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "Honefile.yaml";

/// Target meaning "every job", unless a job is literally named this.
pub const ALL_TARGET: &str = "all";

#[derive(Debug, Deserialize)]
pub struct HoneConfig {
    /// Default engine for jobs that do not set one.
    #[serde(default)]
    pub engine: Option<String>,
    /// Environment shared by every job; job-level values win.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scm: Vec<ScmConfig>,
    pub jobs: Vec<Job>,
}

impl HoneConfig {
    /// Load, merge and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    /// Parse, merge and validate config from YAML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: HoneConfig = serde_yaml::from_str(contents)?;
        config.apply_global_env();
        config.validate()?;
        Ok(config)
    }

    pub fn default_engine(&self) -> Engine {
        self.engine.as_deref().map(Engine::parse).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        let default = self.default_engine();
        let mut seen = HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(Error::DuplicateJob(job.name.clone()));
            }
            job.validate(default).map_err(|e| {
                Error::InvalidConfig(format!("error validating job {}: {}", job.name, e))
            })?;
        }
        if let Some(s3) = &self.cache.s3
            && !s3.disabled
            && s3.bucket.trim().is_empty()
        {
            return Err(Error::InvalidConfig("cache.s3.bucket must be set".into()));
        }
        Ok(())
    }

    fn apply_global_env(&mut self) {
        for job in &mut self.jobs {
            for (key, value) in &self.env {
                job.env.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

/// Execution backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Docker,
    Local,
}

impl Engine {
    /// Parse an engine name. Unknown names select docker.
    pub fn parse(name: &str) -> Self {
        match name {
            "local" => Engine::Local,
            "docker" | "" => Engine::Docker,
            other => {
                warn!(engine = %other, "Unknown engine, using docker");
                Engine::Docker
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub file: FileCacheConfig,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileCacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".hone_cache")
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// Remote object storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Falls back to `AWS_ACCESS_KEY_ID`.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Falls back to `AWS_SECRET_ACCESS_KEY`.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub compression: Compression,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScmProvider {
    #[default]
    Github,
}

/// Commit status reporting settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScmConfig {
    #[serde(default)]
    pub provider: ScmProvider,
    /// Falls back to `GITHUB_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    /// `owner/repo`; falls back to `GITHUB_REPOSITORY`.
    #[serde(default)]
    pub repository: Option<String>,
    /// Falls back to `GITHUB_SHA`.
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_status_context")]
    pub context: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_status_context() -> String {
    "hone".to_string()
}
