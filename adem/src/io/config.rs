//! Site configuration loaded from an optional TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::runner::{CommandRunner, ComputeRequest};

/// Largest accepted `compute.max_concurrent_runs`.
pub const MAX_CONCURRENT_RUNS_LIMIT: usize = 1024;

/// Site configuration (TOML).
///
/// Missing fields default to values that run the `adem` module from
/// `bin/adem` with a 30 second budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    pub compute: ComputeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComputeConfig {
    /// Program to execute.
    pub program: String,

    /// Arguments; every `{query}` is replaced with the validated query.
    pub args: Vec<String>,

    /// Working directory of the computation.
    pub workdir: PathBuf,

    /// Wall-clock budget per query in seconds.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Upper bound on computations running at the same time.
    pub max_concurrent_runs: usize,

    /// Reject queries longer than this many bytes. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_query_bytes: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![
                "-c".to_string(),
                "import adem; adem.print_adem(\"{query}\")".to_string(),
            ],
            workdir: PathBuf::from("bin/adem"),
            timeout_secs: 30,
            output_limit_bytes: 100_000,
            max_concurrent_runs: 4,
            max_query_bytes: None,
        }
    }
}

impl ComputeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("compute.program must be non-empty"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("compute.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("compute.output_limit_bytes must be > 0"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(anyhow!("compute.max_concurrent_runs must be > 0"));
        }
        if self.max_concurrent_runs > MAX_CONCURRENT_RUNS_LIMIT {
            let limit = MAX_CONCURRENT_RUNS_LIMIT;
            return Err(anyhow!("compute.max_concurrent_runs must be <= {limit}"));
        }
        if self.max_query_bytes == Some(0) {
            return Err(anyhow!("compute.max_query_bytes must be > 0 when set"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Request for running `query` under this configuration.
    pub fn request(&self, query: &str) -> ComputeRequest {
        ComputeRequest {
            query: query.to_string(),
            workdir: self.workdir.clone(),
            budget: self.timeout(),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    pub fn runner(&self) -> CommandRunner {
        CommandRunner::new(self.program.clone(), self.args.clone())
    }
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        self.compute.validate()
    }
}

/// Load config from a TOML file.
///
/// If `path` is `None`, returns `SiteConfig::default()`. A path that was
/// given but does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<SiteConfig> {
    let Some(path) = path else {
        let cfg = SiteConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = parse_config(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn parse_config(contents: &str) -> Result<SiteConfig> {
    let cfg: SiteConfig = toml::from_str(contents)?;
    cfg.validate()?;
    Ok(cfg)
}
