use anyhow::Result;
use clap::Parser;

use herbar_crawler::backfill::populate_templates;
use herbar_crawler::cli::{TransformArgs, run_transform};

fn main() -> Result<()> {
    let args = TransformArgs::parse();
    run_transform(&args, "templates", |mut dataset, _| {
        let counts = populate_templates(&mut dataset);
        Ok((
            dataset,
            format!(
                "Done. Summaries added: {}, Sections added: {}",
                counts.summaries, counts.sections
            ),
        ))
    })
}
