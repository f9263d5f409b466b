use anyhow::Result;
use clap::Parser;

use herbar_crawler::backfill::populate_summaries;
use herbar_crawler::cli::{TransformArgs, run_transform};

fn main() -> Result<()> {
    let args = TransformArgs::parse();
    run_transform(&args, "summaries", |mut dataset, _| {
        let filled = populate_summaries(&mut dataset);
        Ok((dataset, format!("Done. Summaries populated for {filled} herbs")))
    })
}
