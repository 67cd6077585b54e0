use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `identity.salt`.
pub const SALT_ENV: &str = "EMBER_IDENTITY_SALT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmberConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub items: ItemConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub views: ViewConfig,
    #[serde(default)]
    pub comments: CommentConfig,
    #[serde(default)]
    pub votes: VoteConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Lifetime of a newly created item.
    #[serde(default = "default_item_lifetime_secs")]
    pub lifetime_secs: u64,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: default_item_lifetime_secs(),
        }
    }
}

impl ItemConfig {
    #[must_use]
    pub fn lifetime_ms(&self) -> i64 {
        secs_to_ms(self.lifetime_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Salt for origin/identity digests. Empty means "generate per process".
    #[serde(default)]
    pub salt: String,
    /// Fold the client-declared `identity` field of view requests into the
    /// dedup token. Only enable behind a proxy that assigns session ids.
    #[serde(default)]
    pub trust_client_hint: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_view_retention_days")]
    pub retention_days: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            retention_days: default_view_retention_days(),
        }
    }
}

impl ViewConfig {
    #[must_use]
    pub fn retention_ms(&self) -> i64 {
        secs_to_ms(self.retention_days.saturating_mul(86_400))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentConfig {
    #[serde(default = "default_comment_max_attempts")]
    pub max_per_window: u32,
    #[serde(default = "default_comment_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_comment_max_length")]
    pub max_length: usize,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_comment_max_attempts(),
            window_secs: default_comment_window_secs(),
            max_length: default_comment_max_length(),
        }
    }
}

/// Whether one identity may vote repeatedly on the same item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotePolicy {
    #[default]
    Unlimited,
    OncePerIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConfig {
    #[serde(default)]
    pub policy: VotePolicy,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_item_lifetime_secs() -> u64 {
    24 * 60 * 60
}

const fn default_view_retention_days() -> u64 {
    30
}

const fn default_comment_max_attempts() -> u32 {
    5
}

const fn default_comment_window_secs() -> u64 {
    300
}

const fn default_comment_max_length() -> usize {
    500
}

pub(crate) fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
}

/// Parse a config file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or is not valid TOML for
/// [`EmberConfig`].
pub fn load_config_file(path: &Path) -> Result<EmberConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EmberConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Default location: `$CONFIG_DIR/ember/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ember/config.toml"))
}

/// Resolve the effective config.
///
/// Precedence: explicit `path` (must exist), then the default location when
/// present, then built-in defaults. `EMBER_IDENTITY_SALT` overrides the salt.
///
/// # Errors
///
/// Returns an error when a config file exists but cannot be parsed.
pub fn resolve_config(path: Option<&Path>) -> Result<EmberConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => load_config_file(&path)?,
            None => EmberConfig::default(),
        },
    };

    apply_salt_override(&mut config, env::var(SALT_ENV).ok());
    Ok(config)
}

/// Write `config` as TOML, creating parent directories.
///
/// # Errors
///
/// Returns an error when the config cannot be serialized or written.
pub fn write_config_file(path: &Path, config: &EmberConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Fresh random salt suitable for `identity.salt`.
#[must_use]
pub fn generate_salt() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn apply_salt_override(config: &mut EmberConfig, salt: Option<String>) {
    if let Some(salt) = salt.filter(|s| !s.trim().is_empty()) {
        config.identity.salt = salt;
    }
}
