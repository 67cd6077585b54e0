//! `em push`: drive updates through the optimistic client engine against a
//! running server and report how each one settled.

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use ember_client::config::DEFAULT_BASE_URL;
use ember_client::{ClientConfig, EngineEvent, HttpTransport, MetricsSet, Proposal, RefreshOutcome};
use ember_core::model::{Counters, ItemId, VoteDirection};
use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Item id to update.
    pub item_id: String,

    /// Base URL of the ember server.
    #[arg(long, env = "EMBER_SERVER", default_value = DEFAULT_BASE_URL)]
    pub server: String,

    /// Upvotes to send.
    #[arg(long, default_value = "0")]
    pub up: u32,

    /// Downvotes to send.
    #[arg(long, default_value = "0")]
    pub down: u32,

    /// Shares to send.
    #[arg(long, default_value = "0")]
    pub share: u32,

    /// Record a view.
    #[arg(long)]
    pub view: bool,

    /// Session hint sent with the view.
    #[arg(long, requires = "view")]
    pub session: Option<String>,

    /// Comment to post (repeatable).
    #[arg(short, long)]
    pub comment: Vec<String>,

    /// Attempts per update before it is reverted.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl PushArgs {
    fn proposals(&self) -> Vec<Proposal> {
        let mut proposals = Vec::new();
        proposals.extend((0..self.up).map(|_| Proposal::Vote(VoteDirection::Up)));
        proposals.extend((0..self.down).map(|_| Proposal::Vote(VoteDirection::Down)));
        proposals.extend((0..self.share).map(|_| Proposal::Share));
        if self.view {
            proposals.push(Proposal::View {
                hint: self.session.clone(),
            });
        }
        proposals.extend(self.comment.iter().map(|content| Proposal::Comment {
            content: content.clone(),
        }));
        proposals
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushReport {
    item_id: ItemId,
    baseline: Counters,
    counters: Counters,
    confirmed: usize,
    retries: usize,
    reverted_count: usize,
    /// Details of reverted updates; may be shorter than `reverted_count` if
    /// the event stream lagged.
    reverted: Vec<RevertedUpdate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevertedUpdate {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    reason: String,
}

/// Execute `em push`.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the item cannot be fetched,
/// or any update was reverted.
pub fn run_push(args: &PushArgs, output: OutputMode) -> Result<()> {
    let item_id = ItemId::parse(&args.item_id)?;
    let proposals = args.proposals();
    anyhow::ensure!(
        !proposals.is_empty(),
        "nothing to push; pass --up, --down, --share, --view or --comment"
    );

    let mut config = ClientConfig {
        base_url: args.server.clone(),
        ..ClientConfig::default()
    };
    if let Some(attempts) = args.max_attempts {
        anyhow::ensure!(attempts > 0, "--max-attempts must be at least 1");
        config.retry.max_attempts = attempts;
    }
    let transport = HttpTransport::new(config.base_url.clone())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let report = runtime.block_on(push(item_id, proposals, transport, config))?;

    render_mode(
        output,
        &report,
        |r, w| {
            let c = &r.counters;
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.item_id,
                c.upvotes,
                c.downvotes,
                c.comment_count,
                c.views,
                c.share_count,
                r.confirmed,
                r.reverted_count
            )
        },
        |r, w| {
            let c = &r.counters;
            pretty_section(w, &format!("Pushed to {}", r.item_id))?;
            pretty_kv(w, "Confirmed", r.confirmed.to_string())?;
            pretty_kv(w, "Retries", r.retries.to_string())?;
            pretty_kv(w, "Votes", format!("+{} / -{}", c.upvotes, c.downvotes))?;
            pretty_kv(w, "Comments", c.comment_count.to_string())?;
            pretty_kv(w, "Views", c.views.to_string())?;
            pretty_kv(w, "Shares", c.share_count.to_string())?;
            if r.reverted_count > r.reverted.len() {
                pretty_kv(w, "Reverted", r.reverted_count.to_string())?;
            }
            for reverted in &r.reverted {
                pretty_kv(w, "Reverted", format!("{}: {}", reverted.kind, reverted.reason))?;
            }
            Ok(())
        },
    )?;

    if report.reverted_count > 0 {
        anyhow::bail!("{} update(s) reverted", report.reverted_count);
    }
    Ok(())
}

async fn push(
    item_id: ItemId,
    proposals: Vec<Proposal>,
    transport: HttpTransport,
    config: ClientConfig,
) -> Result<PushReport> {
    let set = MetricsSet::new(item_id.clone(), Counters::default(), Arc::new(transport), config);
    let baseline = match set
        .refresh()
        .await
        .with_context(|| format!("Failed to fetch {item_id}"))?
    {
        RefreshOutcome::Installed(counters) => counters,
        RefreshOutcome::Superseded => set.baseline(),
    };

    let mut events = set.subscribe();
    for proposal in proposals {
        set.propose(proposal)?;
    }
    set.wait_idle().await;

    // Totals come from the engine; the event stream only adds detail.
    let tally = set.tally();
    let mut report = PushReport {
        item_id,
        baseline,
        counters: set.current_view(),
        confirmed: tally.confirmed,
        retries: tally.retries,
        reverted_count: tally.reverted,
        reverted: Vec::new(),
    };
    loop {
        match events.try_recv() {
            Ok(EngineEvent::Reverted {
                kind, code, reason, ..
            }) => report.reverted.push(RevertedUpdate {
                kind: kind.to_string(),
                code: code.map(|c| c.as_str().to_string()),
                reason,
            }),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "missed engine events");
            }
            Err(_) => break,
        }
    }
    set.shutdown();
    Ok(report)
}
