use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

// Headings seen on the source site, keyed after diacritics are stripped.
const HEADING_KEYS: &[(&str, &str)] = &[
    ("zdravotni prinosy", "zdravotni_prinosy"),
    ("skladovani", "skladovani"),
    ("kde a kdy sbirat", "kde_kdy_sbirat"),
    ("kde kdy sbirat", "kde_kdy_sbirat"),
    ("pouziti v kuchyni", "pouziti_v_kuchyni"),
    ("pouziti", "pouziti_v_kuchyni"),
    ("masti", "masti"),
];

/// Section keys written by older crawls, with the key that replaced them.
pub const LEGACY_SECTION_KEYS: &[(&str, &str)] = &[
    ("kde_a_kdy_sbirat", "kde_kdy_sbirat"),
    ("pouziti", "pouziti_v_kuchyni"),
];

/// NFKD-decompose and drop combining marks: `Šalvěj` -> `Salvej`.
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Maps a page heading to a section key.
pub fn normalize_heading(text: &str) -> String {
    let t = collapse_whitespace(&strip_diacritics(&text.to_lowercase()));
    if t.is_empty() {
        return t;
    }

    if let Some((_, key)) = HEADING_KEYS.iter().find(|(heading, _)| *heading == t) {
        return (*key).to_string();
    }

    NON_ALNUM.replace_all(&t, "_").trim_matches('_').to_string()
}

/// Word tokens, Unicode-aware.
pub fn tokens(s: &str) -> Vec<&str> {
    NON_WORD.split(s).filter(|t| !t.is_empty()).collect()
}

/// ASCII file stem: `Máta peprná` -> `mata-peprna`.
pub fn slugify(name: &str) -> String {
    let ascii = strip_diacritics(&name.to_lowercase());
    let mut slug = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "img".to_string()
    } else {
        slug.to_string()
    }
}

/// Cuts at `max` chars, ending with `...` when shortened.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}
