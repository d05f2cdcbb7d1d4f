//! Locating and parsing the quoted price inside fetched HTML.
//!
//! Pages that list a commodity usually carry several near-identical rows
//! (ounce, gram, kilogram, daily change). An [`ExtractionTarget`] pins down
//! the one we want: walk every element matching the outer selector, keep the
//! first whose label mentions the unit keyword, then read its value node.

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractionError;

pub const DEFAULT_UNIT_KEYWORD: &str = "gram";

#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    outer: Selector,
    outer_src: String,
    label: Selector,
    value: Selector,
    value_src: String,
    /// Stored lower-cased; matched against lower-cased label text.
    keyword: String,
    /// Value candidates carrying this class are skipped (e.g. a "down" delta).
    exclude_class: Option<String>,
}

impl ExtractionTarget {
    pub fn new(
        outer: &str,
        label: &str,
        value: &str,
        keyword: &str,
        exclude_class: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            outer: parse_selector(outer)?,
            outer_src: outer.to_string(),
            label: parse_selector(label)?,
            value: parse_selector(value)?,
            value_src: value.to_string(),
            keyword: keyword.trim().to_lowercase(),
            exclude_class: exclude_class.filter(|c| !c.trim().is_empty()),
        })
    }

    /// Selector a renderer can wait on before the page is worth capturing.
    pub fn outer_selector(&self) -> &str {
        &self.outer_src
    }

    pub fn extract_from_str(&self, html: &str) -> Result<f64, ExtractionError> {
        let doc = Html::parse_document(html);
        self.extract(&doc)
    }

    pub fn extract(&self, doc: &Html) -> Result<f64, ExtractionError> {
        let mut candidates = 0usize;
        let mut matched: Option<ElementRef> = None;

        for outer in doc.select(&self.outer) {
            candidates += 1;
            let Some(label) = outer.select(&self.label).next() else {
                continue;
            };
            if collapsed_text(&label).to_lowercase().contains(&self.keyword) {
                matched = Some(outer);
                break;
            }
        }

        if candidates == 0 {
            return Err(ExtractionError::NoCandidates {
                selector: self.outer_src.clone(),
            });
        }
        let outer = matched.ok_or_else(|| ExtractionError::NoLabelMatch {
            keyword: self.keyword.clone(),
            candidates,
        })?;

        let value = outer
            .select(&self.value)
            .find(|node| !self.is_excluded(node))
            .ok_or_else(|| ExtractionError::MissingValue {
                selector: self.value_src.clone(),
            })?;

        parse_decimal(&collapsed_text(&value))
    }

    fn is_excluded(&self, node: &ElementRef) -> bool {
        match self.exclude_class.as_deref() {
            Some(class) => node.value().classes().any(|c| c == class),
            None => false,
        }
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("invalid selector `{s}`: {e}"))
}

fn collapsed_text(node: &ElementRef) -> String {
    node.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// -------------------------
// Number parsing
// -------------------------

/// Parse a quoted amount such as `"₺ 2.345,67"`, `"$1,234.56"` or `"123,45"`.
///
/// Currency symbols and unit suffixes around the number are dropped. When both
/// separators occur the last one is the decimal point; a lone comma is always
/// a decimal comma. Dots alone are thousands grouping when every dot is
/// followed by exactly three digits (`"2.450"`, `"3.900.000"`), otherwise a
/// decimal point.
pub fn parse_decimal(raw: &str) -> Result<f64, ExtractionError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = compact
        .trim_matches(|c: char| !(c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+')));

    let normalized = match (trimmed.rfind('.'), trimmed.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) if dots_are_grouping(trimmed) => trimmed.replace('.', ""),
        _ => trimmed.replace(',', "."),
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ExtractionError::Unparsable {
            text: raw.trim().to_string(),
        })
}

fn dots_are_grouping(s: &str) -> bool {
    let mut groups = s.split('.');
    let head = groups
        .next()
        .unwrap_or_default()
        .trim_start_matches(['-', '+']);
    let all_digits = |g: &str| g.chars().all(|c| c.is_ascii_digit());
    (1..=3).contains(&head.len())
        && !head.starts_with('0')
        && all_digits(head)
        && groups.all(|g| g.len() == 3 && all_digits(g))
}
