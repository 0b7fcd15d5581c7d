//! Product label normalization, id slugs and display ordering

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static PREFIX_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^\s*(FS|VA)\s*-\s*").expect("valid regex"));
static UNIT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*\((CX|KG|UN)\)\s*$").expect("valid regex"));
static TRAILING_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\(([^()]*)\)\s*$").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// NFKC-fold the label, strip source-system prefix tags (`FS -`, `VA -`) and
/// a trailing unit annotation (`(KG)`, `(CX)`, `(UN)`), then collapse
/// whitespace.
pub fn normalize_product_label(raw: &str) -> String {
    let folded: String = raw.nfkc().collect();
    let without_prefix = PREFIX_TAG.replace(&folded, "");
    let without_unit = UNIT_SUFFIX.replace(&without_prefix, "");
    WHITESPACE.replace_all(&without_unit, " ").trim().to_string()
}

/// Case-insensitive grouping key for product labels
pub fn product_key(raw: &str) -> String {
    normalize_product_label(raw).to_uppercase()
}

/// Normalize the product part of a `"<product> (<unit>)"` volume label and
/// keep its unit annotation.
pub fn normalize_volume_label(raw: &str) -> String {
    let folded: String = raw.nfkc().collect();
    match TRAILING_ANNOTATION.captures(&folded) {
        Some(caps) => {
            let product = normalize_product_label(&caps[1]);
            let unit = caps[2].trim();
            if unit.is_empty() {
                product
            } else {
                format!("{} ({})", product, unit)
            }
        }
        None => normalize_product_label(&folded),
    }
}

/// Id-safe form of a label: runs of non-word characters become `_`
pub fn slug(label: &str) -> String {
    NON_WORD.replace_all(label.trim(), "_").into_owned()
}

/// Alphabetical order ignoring case and accents, ties broken by raw label
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    collation_key(a).cmp(&collation_key(b)).then_with(|| a.cmp(b))
}

fn collation_key(label: &str) -> String {
    label.trim().to_lowercase().chars().map(fold_accent).collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}
