//! Offline passes that fill text fields the crawl left blank.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::model::Record;
use crate::store::Dataset;
use crate::text::{collapse_whitespace, truncate_chars};

const SUMMARY_MAX_CHARS: usize = 400;
const PREFERRED_SECTIONS: &[&str] = &["popis", "vzhled", "uvod"];
const EXAMPLES: usize = 10;

static FIRST_P: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("valid regex"));
static CHUNK_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|\n\s*\n").expect("valid regex"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s").expect("valid regex"));

/// Text content of an HTML fragment, entities decoded and whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    collapse_whitespace(&text)
}

/// Lead paragraph of a section body, at most 400 chars.
pub fn first_paragraph(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }

    if let Some(inner) = FIRST_P.captures(html).and_then(|c| c.get(1)) {
        let text = strip_tags(inner.as_str());
        if !text.is_empty() {
            return Some(truncate_chars(&text, SUMMARY_MAX_CHARS));
        }
    }

    if let Some(chunk) = CHUNK_BREAK
        .split(html)
        .map(strip_tags)
        .find(|t| t.chars().count() > 20)
    {
        return Some(truncate_chars(&chunk, SUMMARY_MAX_CHARS));
    }

    let all = strip_tags(html);
    if all.is_empty() {
        return None;
    }
    let first = match SENTENCE_END.find(&all) {
        Some(m) => &all[..m.start() + 1],
        None => all.as_str(),
    };
    Some(truncate_chars(first, SUMMARY_MAX_CHARS))
}

/// Section most likely to describe the plant.
fn summary_source(sections: &BTreeMap<String, String>) -> Option<&str> {
    let preferred = PREFERRED_SECTIONS.iter().find_map(|want| {
        sections
            .iter()
            .find(|(key, body)| key.contains(want) && !body.trim().is_empty())
            .map(|(_, body)| body.as_str())
    });

    preferred.or_else(|| {
        sections
            .values()
            .find(|body| !body.trim().is_empty())
            .map(String::as_str)
    })
}

/// Derives blank summaries from section text. Returns how many were filled.
pub fn populate_summaries(dataset: &mut Dataset) -> usize {
    let mut filled = 0;
    for record in dataset.records_mut() {
        if record.has_summary() {
            continue;
        }
        let summary = record
            .sections
            .as_ref()
            .and_then(summary_source)
            .and_then(first_paragraph);
        if let Some(summary) = summary {
            record.summary = Some(summary);
            filled += 1;
        }
    }
    filled
}

pub fn summary_template(name: &str) -> String {
    format!("{name} je běžná bylinka či koření; základní informace o použití, pěstování a sběru.")
}

pub fn section_templates(name: &str) -> BTreeMap<String, String> {
    [
        (
            "popis",
            format!("{name}: stručný popis, vzhled, typ rostliny a typické vlastnosti."),
        ),
        (
            "pouziti_v_kuchyni",
            "Kulinářské a tradiční použití (čaje, koření, léčitelství). Používejte s ohledem na bezpečnost.".to_string(),
        ),
        (
            "pestovani",
            "Obecné rady: slunné až polostinné stanoviště, propustná půda; uložte specifika podle druhu.".to_string(),
        ),
        (
            "sber",
            "Sběr listů, květů či semen v optimální fázi, obvykle před nebo během kvetení; sušte rychle ve stínu.".to_string(),
        ),
    ]
    .into_iter()
    .map(|(key, body)| (key.to_string(), body))
    .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TemplateCounts {
    pub summaries: usize,
    pub sections: usize,
}

/// Fills whatever is still blank with generic text.
pub fn populate_templates(dataset: &mut Dataset) -> TemplateCounts {
    let mut counts = TemplateCounts::default();
    for record in dataset.records_mut() {
        let name = record.display_name().to_string();
        if !record.has_summary() {
            record.summary = Some(summary_template(&name));
            counts.summaries += 1;
        }
        if !record.has_sections() {
            record.sections = Some(section_templates(&name));
            counts.sections += 1;
        }
    }
    counts
}

/// Coverage of the text fields across a dataset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FillReport {
    pub total: usize,
    pub missing_summary: Vec<String>,
    pub missing_sections: Vec<String>,
}

impl FillReport {
    pub fn of(records: &[Record]) -> Self {
        let names = |pred: fn(&Record) -> bool| -> Vec<String> {
            records
                .iter()
                .filter(|r| !pred(r))
                .map(|r| r.display_name().to_string())
                .collect()
        };
        Self {
            total: records.len(),
            missing_summary: names(Record::has_summary),
            missing_sections: names(Record::has_sections),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing_summary.is_empty() && self.missing_sections.is_empty()
    }
}

impl fmt::Display for FillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total: {}", self.total)?;
        writeln!(f, "missing summary: {}", self.missing_summary.len())?;
        write!(f, "missing sections: {}", self.missing_sections.len())?;
        if !self.missing_summary.is_empty() {
            let head: Vec<_> = self.missing_summary.iter().take(EXAMPLES).collect();
            write!(f, "\nexamples missing summary: {head:?}")?;
        }
        if !self.missing_sections.is_empty() {
            let head: Vec<_> = self.missing_sections.iter().take(EXAMPLES).collect();
            write!(f, "\nexamples missing sections: {head:?}")?;
        }
        Ok(())
    }
}
