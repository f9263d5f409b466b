use serde_json::Value;

use crate::error::StoreError;
use crate::store::Dataset;

const SOURCE_LICENSE: &str = "cc by-nc-sa 4.0";

/// Absolute http(s) link outside Wikipedia and Wikimedia Commons.
fn is_foreign_link(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    let absolute = lower.starts_with("http://") || lower.starts_with("https://");
    absolute && !lower.contains("wikipedia.org") && !lower.contains("wikimedia.org")
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupCounts {
    pub image_links: usize,
    pub licenses: usize,
}

/// Drops image links that do not point at Wikipedia, and the source site's license.
pub fn cleanup_images(dataset: &mut Dataset) -> CleanupCounts {
    let mut counts = CleanupCounts::default();

    for record in dataset.records_mut() {
        for image in &mut record.images {
            for slot in [&mut image.file_url, &mut image.thumb_url, &mut image.page_url] {
                if slot.as_deref().is_some_and(is_foreign_link) {
                    *slot = None;
                    counts.image_links += 1;
                }
            }
        }

        if record
            .license
            .as_deref()
            .is_some_and(|l| l.to_lowercase().contains(SOURCE_LICENSE))
        {
            record.license = None;
            counts.licenses += 1;
        }
    }

    counts
}

/// Removes every variant from every string in `value`, trimming what changed.
/// Returns the number of variants removed.
pub fn strip_phrases(value: &mut Value, variants: &[String]) -> usize {
    match value {
        Value::String(s) => {
            let mut count = 0;
            for variant in variants.iter().filter(|v| !v.is_empty()) {
                if s.contains(variant.as_str()) {
                    *s = s.replace(variant.as_str(), "").trim().to_string();
                    count += 1;
                }
            }
            count
        }
        Value::Array(items) => items.iter_mut().map(|v| strip_phrases(v, variants)).sum(),
        Value::Object(map) => map.values_mut().map(|v| strip_phrases(v, variants)).sum(),
        _ => 0,
    }
}

/// Strips boilerplate sentences from every string field of every record.
pub fn remove_boilerplate(dataset: Dataset, variants: &[String]) -> Result<(Dataset, usize), StoreError> {
    let mut value = serde_json::to_value(dataset.into_records())?;
    let count = strip_phrases(&mut value, variants);
    let records = serde_json::from_value(value)?;
    Ok((Dataset::from_records(records), count))
}
