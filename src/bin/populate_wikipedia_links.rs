use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use herbar_crawler::cli::{ScriptArgs, Setup};
use herbar_crawler::engine::{CrawlEngine, interrupt_channel};
use herbar_crawler::http;
use herbar_crawler::model::has_wikipedia_url;
use herbar_crawler::wikipedia::WikipediaLinker;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ScriptArgs::parse();
    let setup = Setup::new(args.config.as_deref(), "wiki_links")?;
    let ids = setup.existing_ids()?;
    let Setup { config, log, store } = setup;

    let client = http::build_client(&config.wikipedia.user_agent)?;
    let pause = Duration::from_millis(config.wikipedia.query_pause_ms);
    let delay = args.delay_or(Duration::from_secs(config.fallback_delay_secs));

    let (handle, interrupt) = interrupt_channel();
    handle.on_ctrl_c();

    let linker = WikipediaLinker::new(client, &config.wikipedia, pause, log.clone())
        .with_interrupt(interrupt.clone());

    let engine = CrawlEngine::new(store, linker, delay, has_wikipedia_url, log.clone())
        .with_limit(args.limit)
        .with_interrupt(interrupt);
    let report = engine.run(&ids).await;

    log.write(format!(
        "Done. Links found: {}, not found: {}, failed: {}, already linked: {}",
        report.fetched, report.not_found, report.failed, report.skipped
    ));
    Ok(())
}
