//! `em sweep`: remove expired items, lapsed view records and stale rate entries.

use super::StoreContext;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use std::io::Write as _;

/// Execute `em sweep` once, outside any server.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the sweep fails.
pub fn run_sweep(ctx: &StoreContext, output: OutputMode) -> Result<()> {
    let report = ctx.service()?.sweep().context("Sweep failed")?;

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}",
                r.items_removed, r.view_records_removed, r.rate_entries_removed
            )
        },
        |r, w| {
            pretty_section(w, "Sweep complete")?;
            pretty_kv(w, "Items", r.items_removed.to_string())?;
            pretty_kv(w, "View records", r.view_records_removed.to_string())?;
            pretty_kv(w, "Rate entries", r.rate_entries_removed.to_string())
        },
    )
}
