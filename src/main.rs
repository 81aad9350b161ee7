//! # Blog Harness CLI (`blogctl`)
//!
//! ## Usage
//!
//! ```bash
//! blogctl --config ./config/blog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `blogctl sync` | Publish `ready` Notion posts as MDX, remove `delete` posts |
//! | `blogctl serve` | Start the chat and page-metadata HTTP server |
//! | `blogctl pages` | List navigable pages |
//! | `blogctl chat` | Chat with the running server from the terminal |
//!
//! Secrets (`OPENAI_API_KEY`, `NOTION_TOKEN`, `R2_ACCESS_KEY_ID`,
//! `R2_SECRET_ACCESS_KEY`) are read from the environment; a `.env` file in
//! the working directory is loaded first.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use blog_harness::progress::ProgressMode;
use blog_harness::storage::R2Store;
use blog_harness::sync::{HttpFetcher, ImageHost};
use blog_harness::{client, config, notion, pages, server, sync};

#[derive(Parser)]
#[command(
    name = "blogctl",
    about = "Notion-to-MDX sync and a post-aware chat companion for a personal blog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/blog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync posts from Notion.
    ///
    /// Publishes every `ready` post to `{id}.mdx` (rehosting its images) and
    /// removes every `delete` post, writing the new status back to Notion.
    Sync {
        /// List the posts each phase would touch without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Start the chat HTTP server on `[server].bind`.
    Serve,

    /// List the pages the assistant may navigate to.
    Pages {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Chat with the assistant through a running server.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { dry_run, progress } => {
            let mode = match progress {
                ProgressArg::Auto => ProgressMode::default_for_tty(),
                ProgressArg::Off => ProgressMode::Off,
                ProgressArg::Human => ProgressMode::Human,
                ProgressArg::Json => ProgressMode::Json,
            };
            let notion_cfg = cfg
                .notion
                .clone()
                .ok_or_else(|| anyhow::anyhow!("[notion] section is required for sync"))?;
            let source = notion::NotionClient::from_env(&notion_cfg)?;
            let store = match &cfg.storage {
                Some(storage) => Some((R2Store::from_env(storage)?, storage)),
                None => None,
            };
            let images = store.as_ref().map(|(store, storage)| ImageHost {
                store,
                cdn_base: storage.cdn_base().to_string(),
                prefix: storage.prefix.clone(),
            });
            let fetcher = HttpFetcher::new()?;

            let report = sync::run_sync(
                &cfg,
                &source,
                images,
                &fetcher,
                mode.reporter().as_ref(),
                dry_run,
            )
            .await?;

            if dry_run {
                for (phase, title) in &report.planned {
                    println!("{:<8} {}", phase.as_str(), title);
                }
                println!("{} post(s) would be processed", report.planned.len());
                return Ok(());
            }

            for path in &report.published {
                println!("wrote {}", path.display());
            }
            println!(
                "{} published, {} deleted, {} failed ({} images uploaded, {} removed)",
                report.published.len(),
                report.deleted,
                report.failed,
                report.images_uploaded,
                report.images_removed
            );
            if report.failed > 0 {
                anyhow::bail!("{} post(s) failed to sync", report.failed);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Pages { json } => {
            pages::list_pages(&cfg, json)?;
        }
        Commands::Chat => {
            client::run_chat(&cfg).await?;
        }
    }

    Ok(())
}
