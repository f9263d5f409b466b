use anyhow::Result;
use clap::Parser;

use herbar_crawler::cleanup::remove_boilerplate;
use herbar_crawler::cli::{TransformArgs, run_transform};

fn main() -> Result<()> {
    let args = TransformArgs::parse();
    run_transform(&args, "boilerplate", |dataset, config| {
        let (dataset, count) = remove_boilerplate(dataset, &config.boilerplate)?;
        Ok((dataset, format!("Done. Replacements made: {count}")))
    })
}
