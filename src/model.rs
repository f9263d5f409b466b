use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One herb entry in the dataset.
///
/// Fields of the wrong JSON type (`null` names, a string where a list
/// belongs) read as their default instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default, deserialize_with = "lenient")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, deserialize_with = "text_sections", skip_serializing_if = "Option::is_none")]
    pub sections: Option<BTreeMap<String, String>>,

    #[serde(default, deserialize_with = "image_list")]
    pub images: Vec<Image>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub wikipedia_url: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Keys this crate does not model, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "lenient")]
    pub page_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub file_title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub thumb_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub width: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub size_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub license: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Keeps the string-valued sections only.
fn text_sections<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(map) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        map.into_iter()
            .filter_map(|(key, body)| match body {
                Value::String(text) => Some((key, text)),
                _ => None,
            })
            .collect(),
    ))
}

/// Drops entries that are not image objects; `null` is an empty list.
fn image_list<'de, D>(deserializer: D) -> Result<Vec<Image>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Partial record data returned by a fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Ignored on merge; the target id is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikipedia_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    pub fn primary_image(&self) -> Option<&Image> {
        self.images.first()
    }

    /// Name to show or search for; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn has_summary(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_sections(&self) -> bool {
        self.sections.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// The primary image already points at a binary.
pub fn has_primary_image(record: &Record) -> bool {
    record
        .primary_image()
        .and_then(|img| img.file_url.as_deref())
        .is_some_and(|url| !url.trim().is_empty())
}

pub fn has_wikipedia_url(record: &Record) -> bool {
    record
        .wikipedia_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_unknown_keys() {
        let raw = json!({
            "id": "Bazalka",
            "name": "Bazalka",
            "images": [{"file_url": null, "credit": "someone"}],
            "wikipedia_match": {"lang": "cs", "title": "Bazalka pravá"}
        });

        let record: Record = serde_json::from_value(raw).unwrap();
        assert_eq!(record.extra["wikipedia_match"]["lang"], "cs");
        assert_eq!(record.images[0].extra["credit"], "someone");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["wikipedia_match"]["title"], "Bazalka pravá");
        assert!(back["images"][0]["file_url"].is_null());
        assert!(back.get("summary").is_none());
    }

    #[test]
    fn completeness_checks() {
        let mut record = Record::new("Majoranka");
        assert!(!has_primary_image(&record));

        record.images.push(Image::default());
        assert!(!has_primary_image(&record));

        record.images[0].file_url = Some("https://upload.wikimedia.org/m.jpg".into());
        assert!(has_primary_image(&record));

        assert!(!has_wikipedia_url(&record));
        record.wikipedia_url = Some("  ".into());
        assert!(!has_wikipedia_url(&record));
    }

    #[test]
    fn wrong_types_read_as_defaults() {
        let raw = json!({
            "id": "Kopr",
            "name": null,
            "summary": 7,
            "images": null,
            "sections": {"popis": null, "sber": "V létě.", "x": ["a"]}
        });
        let record: Record = serde_json::from_value(raw).unwrap();

        assert_eq!(record.name, "");
        assert_eq!(record.display_name(), "Kopr");
        assert_eq!(record.summary, None);
        assert!(record.images.is_empty());
        let sections = record.sections.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["sber"], "V létě.");
    }

    #[test]
    fn bad_image_entries_are_dropped() {
        let raw = json!({
            "id": "Anyz",
            "images": ["https://x/a.jpg", {"file_url": "https://x/b.jpg", "width": "wide"}, null]
        });
        let record: Record = serde_json::from_value(raw).unwrap();

        assert_eq!(record.images.len(), 1);
        assert_eq!(record.images[0].file_url.as_deref(), Some("https://x/b.jpg"));
        assert_eq!(record.images[0].width, None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let mut record = Record::new("Tymian");
        record.name.clear();
        assert_eq!(record.display_name(), "Tymian");
    }
}
