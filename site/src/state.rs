//! Shared application state for the web server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adem::io::config::SiteConfig;
use adem::io::runner::ComputeRunner;
use adem::io::templates::TemplateCache;
use anyhow::{Context, Result};
use tokio::sync::Semaphore;

/// Shared state accessible from all request handlers.
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Directory containing `templates/` and `static/`.
    pub web_root: PathBuf,
    pub config: Arc<SiteConfig>,
    pub templates: Arc<TemplateCache>,
    /// Server start time, already formatted for page footers.
    pub build_time: Arc<str>,
    pub runner: Arc<dyn ComputeRunner>,
    /// Caps concurrent computations at `compute.max_concurrent_runs`.
    pub compute_slots: Arc<Semaphore>,
}

impl AppState {
    /// Build state for `web_root`, loading the template cache from disk.
    pub fn new(
        web_root: PathBuf,
        config: SiteConfig,
        runner: Arc<dyn ComputeRunner>,
        build_time: String,
    ) -> Result<Self> {
        let templates_dir = templates_dir(&web_root);
        let templates = TemplateCache::build(&templates_dir)
            .with_context(|| format!("load templates from {}", templates_dir.display()))?;
        let compute_slots = Arc::new(Semaphore::new(config.compute.max_concurrent_runs));

        Ok(Self {
            web_root,
            config: Arc::new(config),
            templates: Arc::new(templates),
            build_time: build_time.into(),
            runner,
            compute_slots,
        })
    }

    /// Path to the static asset directory.
    pub fn static_dir(&self) -> PathBuf {
        self.web_root.join("static")
    }
}

/// Path to the template directory under `web_root`.
pub fn templates_dir(web_root: &Path) -> PathBuf {
    web_root.join("templates")
}
