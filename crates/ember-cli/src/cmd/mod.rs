pub mod completions;
pub mod create;
pub mod init;
pub mod list;
pub mod push;
pub mod serve;
pub mod show;
pub mod sweep;

use anyhow::{Context as _, Result};
use ember_core::config::resolve_config;
use ember_core::{EmberConfig, MetricsService, Store, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global options every store-backed command needs.
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl StoreContext {
    /// # Errors
    ///
    /// Returns an error when an explicit or default config file is invalid.
    pub fn config(&self) -> Result<EmberConfig> {
        resolve_config(self.config_path.as_deref())
    }

    /// Open the store and build a service over it with the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be resolved or the store cannot
    /// be opened.
    pub fn service(&self) -> Result<MetricsService> {
        self.service_with(self.config()?)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn service_with(&self, config: EmberConfig) -> Result<MetricsService> {
        let store = open_store(&self.db_path)?;
        Ok(MetricsService::new(Arc::new(store), config, Arc::new(SystemClock)))
    }
}

fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open counter store {}", path.display()))
}

/// `$DATA_DIR/ember/ember.db`, or `./ember.db` when no data dir is known.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("ember.db"),
        |dir| dir.join("ember").join("ember.db"),
    )
}
