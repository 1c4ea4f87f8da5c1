mod config;
mod console;
mod notify;
mod session;
mod signals;
mod stats;
mod tee;

use clap::Parser;
use config::{CrawlerConfig, NotifyConfig};
use notify::NotifyError;
use signals::Interrupts;
use tracing_subscriber::EnvFilter;

/// Run a Scrapy spider, mirror its output to the console, and push its
/// closing stats dump to an ntfy topic once it finishes.
#[derive(Parser, Debug)]
#[command(name = "spider-notify", version, about)]
pub struct Cli {
    /// Name of the Scrapy spider to run
    #[arg(value_name = "SPIDER")]
    job: String,

    /// Arguments passed through to the spider unchanged
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
}

/// Exit status after an interrupted run, as a shell reports death by SIGINT.
const INTERRUPTED_EXIT: i32 = 130;

/// Crawl, extract, notify. Only a failed or interrupted notification is an
/// error; Ctrl-C during the crawl belongs to the crawler.
async fn run(
    cli: &Cli,
    crawler: &CrawlerConfig,
    notify_config: &NotifyConfig,
    interrupts: &mut Interrupts,
) -> Result<(), NotifyError> {
    let client = notify::build_client()?;
    let output = session::capture_output(crawler, &cli.job, &cli.args, interrupts).await;
    let stats = stats::extract_stats(Some(output.as_str()));
    tokio::select! {
        result = notify::notify(&client, notify_config, &cli.job, stats) => result,
        Some(()) = interrupts.recv() => {
            tracing::warn!("interrupt received while delivering notification");
            Err(NotifyError::Interrupted)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout belongs to the mirrored crawler output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let crawler = CrawlerConfig::default();
    let notify_config = NotifyConfig::from_env();
    tracing::debug!(url = %notify_config.url(), "notification target");

    let mut interrupts = signals::ctrl_c_events();
    if let Err(e) = run(&cli, &crawler, &notify_config, &mut interrupts).await {
        tracing::error!(error = %e, "notification failed");
        console::print_error(&e.to_string());
        let code = match e {
            NotifyError::Interrupted => INTERRUPTED_EXIT,
            _ => 1,
        };
        std::process::exit(code);
    }
}
