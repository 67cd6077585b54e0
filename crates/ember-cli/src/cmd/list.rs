//! `em list`: live items, newest first.

use super::StoreContext;
use super::show::{write_item_pretty, write_item_row};
use crate::output::{OutputMode, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use ember_core::api::ItemResponse;
use ember_core::{Clock, Outcome, SystemClock};
use std::io::Write as _;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Maximum items to show.
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: u32,
}

/// Execute `em list`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn run_list(args: &ListArgs, ctx: &StoreContext, output: OutputMode) -> Result<()> {
    let snapshots = ctx
        .service()?
        .list_live(args.limit)
        .context("Failed to list items")?;

    let at_ms = SystemClock.now_ms();
    let items: Vec<ItemResponse> = snapshots
        .into_iter()
        .map(|snapshot| ItemResponse::from(&Outcome { snapshot, at_ms }))
        .collect();

    render_mode(
        output,
        &items,
        |items, w| {
            for item in items {
                write_item_row(item, w)?;
            }
            Ok(())
        },
        |items, w| {
            if items.is_empty() {
                return writeln!(w, "No live items");
            }
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    writeln!(w)?;
                }
                write_item_pretty(item, w)?;
            }
            Ok(())
        },
    )
}
