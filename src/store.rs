use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;

use crate::error::StoreError;
use crate::log::EventLog;
use crate::model::{Record, RecordPatch};

/// Records in file order with an id lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Dataset {
    /// Later duplicates of an id are merged into the first occurrence.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut dataset = Self::default();
        for record in records {
            match dataset.index.get(&record.id) {
                Some(&pos) => dataset.records[pos].apply(into_patch(record)),
                None => dataset.push(record),
            }
        }
        dataset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.records.iter_mut()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Merges `patch` into the record for `id`, creating it at the end if new.
    pub fn upsert(&mut self, id: &str, patch: RecordPatch) -> &mut Record {
        let pos = match self.index.get(id) {
            Some(&pos) => {
                self.records[pos].apply(patch);
                pos
            }
            None => {
                self.push(Record::from_patch(id, patch));
                self.records.len() - 1
            }
        };
        &mut self.records[pos]
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn push(&mut self, record: Record) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }
}

fn into_patch(record: Record) -> RecordPatch {
    RecordPatch {
        id: None,
        name: Some(record.name),
        source_url: record.source_url,
        summary: record.summary,
        sections: record.sections,
        images: Some(record.images),
        wikipedia_url: record.wikipedia_url,
        license: record.license,
        extra: record.extra,
    }
}

/// Where a program reads and writes the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub data: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
}

impl DatasetPaths {
    /// `herbs.json` with tag `cleanup` gives `herbs.json.tmp` and `herbs.json.cleanup.bak`.
    pub fn new(data: impl Into<PathBuf>, backup_tag: &str) -> Self {
        let data = data.into();
        Self {
            temp: with_suffix(&data, ".tmp"),
            backup: with_suffix(&data, &format!(".{backup_tag}.bak")),
            data,
        }
    }

    pub fn quarantine(&self) -> PathBuf {
        let ts = Utc::now().format("%Y%m%dT%H%M%SZ");
        with_suffix(&self.data, &format!(".corrupt.{ts}"))
    }
}

/// Writes `bytes` to `<path>.tmp`, syncs it and renames it over `path`.
///
/// Readers see the old content or the new one, never a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = with_suffix(path, ".tmp");
    let mut writer = BufWriter::new(File::create(&temp)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&temp, path)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// JSON file persistence with atomic replace.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    paths: DatasetPaths,
}

impl DatasetStore {
    pub fn new(paths: DatasetPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &DatasetPaths {
        &self.paths
    }

    pub fn exists(&self) -> bool {
        self.paths.data.exists()
    }

    /// Reads the dataset; a missing file is an error.
    ///
    /// Only unparseable JSON is `CorruptState`. Entries without a string
    /// `id` are logged and left out.
    pub fn load(&self, log: &EventLog) -> Result<Dataset, StoreError> {
        let path = &self.paths.data;
        if !path.exists() {
            return Err(StoreError::MissingInputFile(path.clone()));
        }

        let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let items: Vec<Value> =
            serde_json::from_str(&text).map_err(|source| StoreError::CorruptState {
                path: path.clone(),
                source,
            })?;

        let mut records = Vec::with_capacity(items.len());
        for (pos, item) in items.into_iter().enumerate() {
            if !item.get("id").is_some_and(Value::is_string) {
                log.write(format!("Skipping entry {pos} without an id"));
                continue;
            }
            match serde_json::from_value::<Record>(item) {
                Ok(record) => records.push(record),
                Err(e) => log.write(format!("Skipping unreadable entry {pos}: {e}")),
            }
        }

        Ok(Dataset::from_records(records))
    }

    /// Reads the dataset, starting empty when there is none.
    ///
    /// An unreadable file is renamed aside first so its content survives.
    pub fn load_or_quarantine(&self, log: &EventLog) -> Dataset {
        match self.load(log) {
            Ok(dataset) => {
                log.write(format!(
                    "Loaded existing checkpoint with {} records",
                    dataset.len()
                ));
                dataset
            }
            Err(StoreError::MissingInputFile(_)) => Dataset::default(),
            Err(e) => {
                log.write(format!("Error loading {}: {e}", self.paths.data.display()));
                self.quarantine(log);
                Dataset::default()
            }
        }
    }

    /// Renames the canonical file aside so its content survives.
    pub fn quarantine(&self, log: &EventLog) {
        let target = self.paths.quarantine();
        match fs::rename(&self.paths.data, &target) {
            Ok(()) => log.write(format!("Corrupt dataset moved to {}", target.display())),
            Err(e) => log.write(format!("Failed to back up corrupt dataset: {e}")),
        }
    }

    /// Copies the canonical file to the backup path. Returns false if there was nothing to copy.
    pub fn backup(&self) -> Result<bool, StoreError> {
        if !self.exists() {
            return Ok(false);
        }
        fs::copy(&self.paths.data, &self.paths.backup).map_err(|source| StoreError::Io {
            path: self.paths.backup.clone(),
            source,
        })?;
        Ok(true)
    }

    /// Writes the temp sibling, then renames it over the canonical path.
    pub fn save(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let mut json = serde_json::to_string_pretty(dataset.records())?;
        json.push('\n');
        write_atomic(&self.paths.data, json.as_bytes()).map_err(|source| self.persist_failure(source))
    }

    fn persist_failure(&self, source: std::io::Error) -> StoreError {
        StoreError::PersistFailure {
            path: self.paths.data.clone(),
            source,
        }
    }
}
