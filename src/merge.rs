//! Non-null-wins shallow merge.
//!
//! Every program that applies a patch goes through here. A patch value
//! replaces the stored one only when it carries data: `None`, JSON `null`
//! and blank strings leave the stored value untouched. Image slots merge
//! in place by position, so the image order never changes.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::model::{Image, Record, RecordPatch};
use crate::text::LEGACY_SECTION_KEYS;

impl Record {
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(name) = non_blank(patch.name) {
            self.name = name;
        }
        merge_opt(&mut self.source_url, patch.source_url);
        merge_opt(&mut self.summary, patch.summary);
        merge_opt(&mut self.wikipedia_url, patch.wikipedia_url);
        merge_opt(&mut self.license, patch.license);

        if let Some(sections) = patch.sections {
            merge_sections(&mut self.sections, sections);
        }
        if let Some(images) = patch.images {
            merge_images(&mut self.images, images);
        }
        merge_object(&mut self.extra, patch.extra);
    }

    /// Builds a fresh record from a patch.
    pub fn from_patch(id: impl Into<String>, patch: RecordPatch) -> Self {
        let mut record = Record::new(id);
        record.apply(patch);
        record
    }
}

impl Image {
    pub fn apply(&mut self, other: Image) {
        merge_opt(&mut self.page_url, other.page_url);
        merge_opt(&mut self.file_title, other.file_title);
        merge_opt(&mut self.thumb_url, other.thumb_url);
        merge_opt(&mut self.file_url, other.file_url);
        merge_num(&mut self.width, other.width);
        merge_num(&mut self.height, other.height);
        merge_num(&mut self.size_bytes, other.size_bytes);
        merge_opt(&mut self.license, other.license);
        merge_object(&mut self.extra, other.extra);
    }
}

/// Shallow merge of JSON objects; `null` in the patch never erases.
pub fn merge_object(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            continue;
        }
        if let Value::String(s) = &value {
            if s.trim().is_empty() && base.contains_key(&key) {
                continue;
            }
        }
        base.insert(key, value);
    }
}

pub fn merge_images(existing: &mut Vec<Image>, incoming: Vec<Image>) {
    for (slot, image) in incoming.into_iter().enumerate() {
        match existing.get_mut(slot) {
            Some(current) => current.apply(image),
            None => existing.push(image),
        }
    }
}

fn merge_sections(
    existing: &mut Option<BTreeMap<String, String>>,
    incoming: BTreeMap<String, String>,
) {
    let filled: Vec<(String, String)> = incoming
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect();

    if !filled.is_empty() {
        existing.get_or_insert_with(BTreeMap::new).extend(filled);
    }
    if let Some(sections) = existing {
        rename_legacy_keys(sections);
    }
}

/// Moves text under an old key to its current key. A filled current key wins.
fn rename_legacy_keys(sections: &mut BTreeMap<String, String>) {
    for (legacy, current) in LEGACY_SECTION_KEYS {
        let Some(text) = sections.remove(*legacy) else {
            continue;
        };
        let slot = sections.entry((*current).to_string()).or_default();
        if slot.trim().is_empty() {
            *slot = text;
        }
    }
}

fn merge_opt(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = non_blank(value) {
        *slot = Some(value);
    }
}

fn merge_num(slot: &mut Option<u64>, value: Option<u64>) {
    if value.is_some() {
        *slot = value;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
