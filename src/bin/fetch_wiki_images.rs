use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use herbar_crawler::cli::{ScriptArgs, Setup};
use herbar_crawler::engine::{CrawlEngine, interrupt_channel};
use herbar_crawler::http;
use herbar_crawler::images::{WikiImageFetcher, needs_no_image};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ScriptArgs::parse();
    let setup = Setup::new(args.config.as_deref(), "wiki_images")?;
    let ids = setup.existing_ids()?;
    let Setup { config, log, store } = setup;

    let client = http::build_client(&config.wikipedia.user_agent)?;
    let fetcher = WikiImageFetcher::new(client, &config, log.clone());
    let delay = args.delay_or(Duration::from_secs(config.fallback_delay_secs));

    let (handle, interrupt) = interrupt_channel();
    handle.on_ctrl_c();

    let engine = CrawlEngine::new(store, fetcher, delay, needs_no_image, log.clone())
        .with_limit(args.limit)
        .with_interrupt(interrupt);
    let report = engine.run(&ids).await;

    log.write(format!(
        "Done. Images downloaded: {}, not found: {}, failed: {}, already present: {}",
        report.fetched, report.not_found, report.failed, report.skipped
    ));
    Ok(())
}
