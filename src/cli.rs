//! Shared command-line surface and setup for the binaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{self, Config};
use crate::error::StoreError;
use crate::log::EventLog;
use crate::store::{Dataset, DatasetPaths, DatasetStore};

/// Arguments of the programs that talk to the network.
#[derive(Parser, Debug, Clone)]
pub struct ScriptArgs {
    /// JSON config file; built-in defaults when omitted.
    pub config: Option<PathBuf>,

    /// Stop after this many fetch attempts.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Seconds between fetches, overriding robots.txt and the fallback.
    #[arg(long)]
    pub delay: Option<f64>,
}

impl ScriptArgs {
    /// `--delay` when given and valid, `fallback` otherwise.
    pub fn delay_or(&self, fallback: Duration) -> Duration {
        self.delay
            .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok())
            .unwrap_or(fallback)
    }
}

/// Arguments of the offline transforms.
#[derive(Parser, Debug, Clone)]
pub struct TransformArgs {
    /// JSON config file; built-in defaults when omitted.
    pub config: Option<PathBuf>,
}

/// What every program needs before it starts work.
pub struct Setup {
    pub config: Config,
    pub log: EventLog,
    pub store: DatasetStore,
}

impl Setup {
    pub fn new(config_path: Option<&Path>, backup_tag: &str) -> Result<Self> {
        let config = config::load_or_default(config_path)?;
        let log = EventLog::new(&config.log_path);
        let store = DatasetStore::new(DatasetPaths::new(&config.data_path, backup_tag));
        Ok(Self { config, log, store })
    }

    /// Loads the dataset of a program that cannot start from nothing.
    ///
    /// A missing file is an error. An unparseable one is quarantined and
    /// gives `None`.
    pub fn load_existing(&self) -> Result<Option<Dataset>> {
        match self.store.load(&self.log) {
            Ok(dataset) => Ok(Some(dataset)),
            Err(StoreError::CorruptState { path, source }) => {
                self.log.write(format!("Error loading {}: {source}", path.display()));
                self.store.quarantine(&self.log);
                Ok(None)
            }
            Err(e) => {
                let path = self.store.paths().data.display().to_string();
                Err(e).with_context(|| format!("loading {path}"))
            }
        }
    }

    /// Ids of the stored records, none when the dataset was quarantined.
    pub fn existing_ids(&self) -> Result<Vec<String>> {
        Ok(self.load_existing()?.map(|d| d.ids()).unwrap_or_default())
    }
}

/// Backup, transform, save. `apply` returns the summary line to print.
pub fn run_transform<F>(args: &TransformArgs, backup_tag: &str, apply: F) -> Result<()>
where
    F: FnOnce(Dataset, &Config) -> Result<(Dataset, String)>,
{
    let setup = Setup::new(args.config.as_deref(), backup_tag)?;
    let Some(dataset) = setup.load_existing()? else {
        setup.log.write("Nothing to transform, dataset was moved aside");
        return Ok(());
    };

    setup.store.backup()?;
    let (dataset, summary) = apply(dataset, &setup.config)?;
    setup.store.save(&dataset)?;

    setup.log.write(format!(
        "{summary}. Backup at {}",
        setup.store.paths().backup.display()
    ));
    Ok(())
}
