use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use herbar_crawler::cli::{ScriptArgs, Setup};
use herbar_crawler::engine::{CrawlEngine, interrupt_channel};
use herbar_crawler::http;
use herbar_crawler::model::has_primary_image;
use herbar_crawler::robots::{CrawlDelay, RobotsDelay};
use herbar_crawler::source::SourceSite;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ScriptArgs::parse();
    let Setup { config, log, store } = Setup::new(args.config.as_deref(), "crawl")?;

    log.write("Crawler started");

    let client = http::build_client(&config.source.user_agent)?;
    let site = SourceSite::new(client.clone(), &config.source, log.clone())?;

    let ids = match site.category_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            // resume whatever the checkpoint already knows about
            log.write(format!("Error fetching category {}: {e}", config.source.category));
            store.load(&log).map(|d| d.ids()).unwrap_or_default()
        }
    };
    log.write(format!("Found {} herb pages", ids.len()));

    let fallback = Duration::from_secs(config.fallback_delay_secs);
    let delay = CrawlDelay::resolve(
        args.delay,
        RobotsDelay::new(client, &config.source.base_url, fallback),
    );

    let (handle, interrupt) = interrupt_channel();
    handle.on_ctrl_c();

    let data_path = store.paths().data.clone();
    let engine = CrawlEngine::new(store, site, delay, has_primary_image, log.clone())
        .with_limit(args.limit)
        .with_default_license(config.default_license.as_str())
        .with_interrupt(interrupt);

    let report = engine.run(&ids).await;

    log.write(format!(
        "Wrote {} records to {} (fetched {}, skipped {}, not found {}, failed {}, write failures {})",
        report.dataset.len(),
        data_path.display(),
        report.fetched,
        report.skipped,
        report.not_found,
        report.failed,
        report.persist_failures,
    ));

    Ok(())
}
