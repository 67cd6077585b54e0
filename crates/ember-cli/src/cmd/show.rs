//! `em show`: authoritative counters (and optionally comments) of one item.

use super::StoreContext;
use crate::output::{
    CliError, OutputMode, format_ms, format_remaining, pretty_kv, pretty_section, render_error,
    render_mode,
};
use anyhow::Result;
use clap::Args;
use ember_core::api::ItemResponse;
use ember_core::model::comment::time_ago;
use ember_core::model::{Comment, ItemId};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Item id (`it-...`).
    pub id: String,

    /// Also list the newest comments.
    #[arg(long)]
    pub comments: bool,

    /// Maximum comments to show with `--comments`.
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowReport {
    #[serde(flatten)]
    item: ItemResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<Vec<Comment>>,
    #[serde(skip)]
    now_ms: i64,
}

/// Execute `em show`.
///
/// # Errors
///
/// Returns an error for an invalid id, a missing or expired item, or a store
/// failure.
pub fn run_show(args: &ShowArgs, ctx: &StoreContext, output: OutputMode) -> Result<()> {
    let service = ctx.service()?;
    let fetched = ItemId::parse(&args.id)
        .map_err(ember_core::ProtocolError::from)
        .and_then(|item_id| {
            let outcome = service.counters(&item_id)?;
            let comments = if args.comments {
                Some(service.comments(&item_id, args.limit)?)
            } else {
                None
            };
            Ok((outcome, comments))
        });

    let (outcome, comments) = match fetched {
        Ok(found) => found,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            anyhow::bail!("{err}");
        }
    };

    let report = ShowReport {
        item: ItemResponse::from(&outcome),
        comments,
        now_ms: outcome.at_ms,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            write_item_row(&r.item, w)?;
            for comment in r.comments.iter().flatten() {
                writeln!(w, "{}\t{}\t{}", comment.comment_id, comment.author, comment.content)?;
            }
            Ok(())
        },
        |r, w| {
            write_item_pretty(&r.item, w)?;
            if let Some(ref comments) = r.comments {
                writeln!(w)?;
                pretty_section(w, &format!("Comments ({})", comments.len()))?;
                for comment in comments {
                    writeln!(
                        w,
                        "#{} {} ({})",
                        comment.comment_id,
                        comment.author,
                        time_ago(comment.created_at_ms, r.now_ms)
                    )?;
                    writeln!(w, "    {}", comment.content)?;
                }
            }
            Ok(())
        },
    )
}

/// Tab-separated row: id, up, down, comments, views, shares, remaining ms.
pub fn write_item_row(item: &ItemResponse, w: &mut dyn Write) -> io::Result<()> {
    let c = &item.counters;
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        item.item_id,
        c.upvotes,
        c.downvotes,
        c.comment_count,
        c.views,
        c.share_count,
        item.time_remaining
    )
}

pub fn write_item_pretty(item: &ItemResponse, w: &mut dyn Write) -> io::Result<()> {
    let c = &item.counters;
    pretty_section(w, item.item_id.as_str())?;
    pretty_kv(
        w,
        "Votes",
        format!("+{} / -{} (net {})", c.upvotes, c.downvotes, item.net_votes),
    )?;
    pretty_kv(w, "Comments", c.comment_count.to_string())?;
    pretty_kv(w, "Views", c.views.to_string())?;
    pretty_kv(w, "Shares", c.share_count.to_string())?;
    pretty_kv(w, "Created", format_ms(item.created_at))?;
    pretty_kv(
        w,
        "Expires",
        format!(
            "{} ({})",
            format_ms(item.expires_at),
            format_remaining(item.time_remaining)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ShowArgs,
    }

    #[test]
    fn show_args_defaults() {
        let w = Wrapper::parse_from(["test", "it-abc"]);
        assert_eq!(w.args.id, "it-abc");
        assert!(!w.args.comments);
        assert_eq!(w.args.limit, 20);
    }

    #[test]
    fn item_row_is_tab_separated() {
        let item: ItemResponse = serde_json::from_value(serde_json::json!({
            "itemId": "it-abc",
            "upvotes": 3,
            "downvotes": 1,
            "commentCount": 2,
            "views": 9,
            "shareCount": 4,
            "netVotes": 2,
            "createdAt": 0,
            "expiresAt": 1_000,
            "timeRemaining": 500
        }))
        .expect("item");
        let mut buf = Vec::new();
        write_item_row(&item, &mut buf).expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "it-abc\t3\t1\t2\t9\t4\t500\n");
    }
}
