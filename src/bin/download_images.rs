use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use herbar_crawler::cli::{ScriptArgs, Setup};
use herbar_crawler::downloads::{ImageDownloader, write_manifest};
use herbar_crawler::engine::interrupt_channel;
use herbar_crawler::http;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ScriptArgs::parse();
    let setup = Setup::new(args.config.as_deref(), "images")?;
    let Some(dataset) = setup.load_existing()? else {
        setup.log.write("Nothing to download, dataset was moved aside");
        return Ok(());
    };
    let Setup { config, log, .. } = setup;

    let client = http::build_client(&config.images_user_agent)?;
    let delay = args.delay_or(Duration::from_secs(config.fallback_delay_secs));

    let (handle, interrupt) = interrupt_channel();
    handle.on_ctrl_c();

    let report = ImageDownloader::new(client, &config.images_dir, log.clone())
        .with_delay(delay)
        .with_limit(args.limit)
        .with_interrupt(interrupt)
        .run(dataset.records())
        .await;

    write_manifest(&config.manifest_path, &report.manifest)?;
    log.write(format!(
        "Done. Downloaded {}, already present {}, failed {}. Manifest written to {}",
        report.downloaded,
        report.existing,
        report.failed,
        config.manifest_path.display()
    ));
    if report.interrupted {
        log.write("Interrupted, manifest covers the images handled so far");
    }
    Ok(())
}
