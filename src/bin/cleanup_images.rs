use anyhow::Result;
use clap::Parser;

use herbar_crawler::cleanup::cleanup_images;
use herbar_crawler::cli::{TransformArgs, run_transform};

fn main() -> Result<()> {
    let args = TransformArgs::parse();
    run_transform(&args, "cleanup", |mut dataset, _| {
        let counts = cleanup_images(&mut dataset);
        Ok((
            dataset,
            format!(
                "Done. Removed {} non-wiki image links and {} license fields",
                counts.image_links, counts.licenses
            ),
        ))
    })
}
