//! `em init`: create the counter store and a config file with a fresh salt.

use super::StoreContext;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use ember_core::EmberConfig;
use ember_core::config::{default_config_path, generate_salt, resolve_config, write_config_file};
use serde::Serialize;
use std::io::Write as _;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file (rotates the identity salt).
    #[arg(long)]
    pub force: bool,

    /// Only create the store; do not write a config file.
    #[arg(long)]
    pub no_config: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitReport {
    db: String,
    schema_version: u32,
    config: Option<String>,
    config_written: bool,
}

/// Execute `em init`.
///
/// An existing config file is kept unless `--force` is given, so running
/// `init` twice is harmless.
///
/// # Errors
///
/// Returns an error if the config cannot be written or the store cannot be
/// created.
pub fn run_init(args: &InitArgs, ctx: &StoreContext, output: OutputMode) -> Result<()> {
    let config_path = if args.no_config {
        None
    } else {
        ctx.config_path.clone().or_else(default_config_path)
    };

    let mut config_written = false;
    if let Some(path) = config_path.as_deref().filter(|p| args.force || !p.exists()) {
        let mut config = EmberConfig::default();
        config.identity.salt = generate_salt();
        write_config_file(path, &config)?;
        config_written = true;
        tracing::info!(path = %path.display(), "wrote config");
    }

    let config = match config_path.as_deref().filter(|p| p.exists()) {
        Some(path) => resolve_config(Some(path))?,
        None => EmberConfig::default(),
    };
    let status = ctx
        .service_with(config)?
        .status()
        .context("Failed to read store status")?;

    let report = InitReport {
        db: status.path,
        schema_version: status.schema_version,
        config: config_path.map(|p| p.display().to_string()),
        config_written,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "{}\t{}", r.db, r.schema_version)?;
            if let Some(ref config) = r.config {
                writeln!(w, "{config}\t{}", if r.config_written { "written" } else { "kept" })?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "ember initialized")?;
            pretty_kv(w, "Store", &r.db)?;
            pretty_kv(w, "Schema", r.schema_version.to_string())?;
            match r.config {
                Some(ref config) if r.config_written => pretty_kv(w, "Config", config),
                Some(ref config) => pretty_kv(w, "Config", format!("{config} (kept existing)")),
                None => pretty_kv(w, "Config", "not written"),
            }
        },
    )
}
