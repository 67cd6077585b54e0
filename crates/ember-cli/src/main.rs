#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::StoreContext;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ember: short-lived engagement counters",
    long_about = None
)]
struct Cli {
    /// Counter store database file.
    #[arg(long, global = true, env = "EMBER_DB")]
    db: Option<PathBuf>,

    /// Config file (defaults to `$CONFIG_DIR/ember/config.toml`).
    #[arg(long, global = true, env = "EMBER_CONFIG")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn store_context(&self) -> StoreContext {
        StoreContext {
            db_path: self.db.clone().unwrap_or_else(cmd::default_db_path),
            config_path: self.config.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create the counter store and config",
        after_help = "EXAMPLES:\n    # Create the store and a config with a fresh identity salt\n    em init\n\n    # Rotate the salt\n    em init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Server",
        about = "Run the HTTP API",
        after_help = "EXAMPLES:\n    # Serve on the configured address\n    em serve\n\n    # Serve on another port\n    em serve --bind 0.0.0.0:9000"
    )]
    Serve(cmd::serve::ServeArgs),

    #[command(
        next_help_heading = "Items",
        about = "Create an item",
        after_help = "EXAMPLES:\n    # Create an item with the default lifetime\n    em create\n\n    # Create an item that lives one hour\n    em create --lifetime-secs 3600 --json"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Items",
        about = "Show one item's counters",
        after_help = "EXAMPLES:\n    # Show counters\n    em show it-3k9x0a1b2c\n\n    # Include the newest comments\n    em show it-3k9x0a1b2c --comments"
    )]
    Show(cmd::show::ShowArgs),

    #[command(next_help_heading = "Items", about = "List live items")]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Remove expired items and stale records"
    )]
    Sweep,

    #[command(
        next_help_heading = "Client",
        about = "Send updates through the optimistic client",
        after_help = "EXAMPLES:\n    # Two upvotes and a view against a local server\n    em push it-3k9x0a1b2c --up 2 --view\n\n    # Post a comment to another server\n    em push it-3k9x0a1b2c -c \"nice\" --server http://10.0.0.5:8787"
    )]
    Push(cmd::push::PushArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    em completions bash\n    em completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ember=debug,info"
        } else {
            "ember=info,warn"
        })
    });

    let format = env::var("EMBER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();
    let ctx = cli.store_context();

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, &ctx, output),
        Commands::Serve(ref args) => cmd::serve::run_serve(args, &ctx),
        Commands::Create(ref args) => cmd::create::run_create(args, &ctx, output),
        Commands::Show(ref args) => cmd::show::run_show(args, &ctx, output),
        Commands::List(ref args) => cmd::list::run_list(args, &ctx, output),
        Commands::Sweep => cmd::sweep::run_sweep(&ctx, output),
        Commands::Push(ref args) => cmd::push::run_push(args, output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["em", "list", "--json"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_selects_mode() {
        let cli = Cli::parse_from(["em", "--format", "text", "sweep"]);
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn db_flag_is_global() {
        let cli = Cli::parse_from(["em", "show", "it-abc", "--db", "/tmp/x.db"]);
        assert_eq!(cli.store_context().db_path, PathBuf::from("/tmp/x.db"));
    }
}
