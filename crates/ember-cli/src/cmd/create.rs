//! `em create`: start a new item with zeroed counters.

use super::StoreContext;
use super::show::{write_item_pretty, write_item_row};
use crate::output::{OutputMode, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use ember_core::api::ItemResponse;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Lifetime in seconds (defaults to `items.lifetime_secs`).
    #[arg(long)]
    pub lifetime_secs: Option<u64>,
}

/// Execute `em create`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the insert fails.
pub fn run_create(args: &CreateArgs, ctx: &StoreContext, output: OutputMode) -> Result<()> {
    let mut config = ctx.config()?;
    if let Some(secs) = args.lifetime_secs {
        anyhow::ensure!(secs > 0, "--lifetime-secs must be positive");
        config.items.lifetime_secs = secs;
    }

    let outcome = ctx
        .service_with(config)?
        .create_item()
        .context("Failed to create item")?;

    render_mode(
        output,
        &ItemResponse::from(&outcome),
        write_item_row,
        write_item_pretty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn create_args_defaults() {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: CreateArgs,
        }
        let w = Wrapper::parse_from(["test"]);
        assert!(w.args.lifetime_secs.is_none());
        let w = Wrapper::parse_from(["test", "--lifetime-secs", "60"]);
        assert_eq!(w.args.lifetime_secs, Some(60));
    }
}
