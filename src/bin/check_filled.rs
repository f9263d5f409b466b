use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use herbar_crawler::backfill::FillReport;
use herbar_crawler::cli::{Setup, TransformArgs};

fn main() -> Result<ExitCode> {
    let args = TransformArgs::parse();
    let setup = Setup::new(args.config.as_deref(), "check")?;

    if !setup.store.exists() {
        eprintln!("{} not found", setup.store.paths().data.display());
        return Ok(ExitCode::FAILURE);
    }

    let Some(dataset) = setup.load_existing()? else {
        eprintln!("{} could not be read and was moved aside", setup.store.paths().data.display());
        return Ok(ExitCode::FAILURE);
    };

    println!("{}", FillReport::of(dataset.records()));
    Ok(ExitCode::SUCCESS)
}
