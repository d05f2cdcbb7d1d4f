//! Priced views of the catalog, filtered and ordered per request.

use std::cmp::Ordering;

use serde::Serialize;

use crate::catalog::CatalogEntry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedEntry<'a> {
    #[serde(flatten)]
    pub entry: &'a CatalogEntry,
    pub price: u64,
    pub rating: f64,
}

/// `round((popularity + 1) * weight * per_gram)`, half away from zero.
pub fn price_for(entry: &CatalogEntry, per_gram: f64) -> u64 {
    let raw = (entry.popularity_score + 1.0) * entry.weight * per_gram;
    if raw.is_finite() && raw > 0.0 {
        raw.round() as u64
    } else {
        0
    }
}

/// Popularity on a five-star scale, one decimal, halves rounded up.
pub fn rating_for(entry: &CatalogEntry) -> f64 {
    // Nudge so that `0.29 * 50 = 14.499..98` still lands on 1.5.
    (entry.popularity_score * 50.0 + 1e-9).round() / 10.0
}

pub fn compute_entries(catalog: &[CatalogEntry], per_gram: f64) -> Vec<PricedEntry<'_>> {
    catalog
        .iter()
        .map(|entry| PricedEntry {
            entry,
            price: price_for(entry, per_gram),
            rating: rating_for(entry),
        })
        .collect()
}

// -------------------------
// Request parameters
// -------------------------

/// Raw `/api/products` query string. Every field is kept as text so a bad
/// number never fails the request.
#[derive(Debug, Default, Clone)]
pub struct ProductQuery {
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub min_rating: Option<String>,
    pub max_rating: Option<String>,
    pub sort_by: Option<String>,
}

impl ProductQuery {
    /// Build from decoded `key=value` pairs. The first occurrence of a key
    /// wins; unknown keys are ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut q = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "minPrice" => &mut q.min_price,
                "maxPrice" => &mut q.max_price,
                "minRating" => &mut q.min_rating,
                "maxRating" => &mut q.max_rating,
                "sortBy" => &mut q.sort_by,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        q
    }

    /// Decode a raw query string. Never fails: bad percent escapes are kept
    /// as literal text and later fall out as malformed values.
    pub fn parse(query_string: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query_string.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Cheapest first.
    Price,
    /// Best rated first.
    Rating,
    /// Most rating per unit price first.
    Ratio,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "price" => Some(SortKey::Price),
            "rating" => Some(SortKey::Rating),
            "ratio" => Some(SortKey::Ratio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Filters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub sort: Option<SortKey>,
}

impl From<&ProductQuery> for Filters {
    fn from(q: &ProductQuery) -> Self {
        Self {
            min_price: lenient_number(q.min_price.as_deref()),
            max_price: lenient_number(q.max_price.as_deref()),
            min_rating: lenient_number(q.min_rating.as_deref()),
            max_rating: lenient_number(q.max_rating.as_deref()),
            sort: q.sort_by.as_deref().and_then(SortKey::parse),
        }
    }
}

/// Anything that is not a finite number counts as "not given".
fn lenient_number(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Filters {
    pub fn admits(&self, e: &PricedEntry) -> bool {
        let price = e.price as f64;
        self.min_price.is_none_or(|min| price >= min)
            && self.max_price.is_none_or(|max| price <= max)
            && self.min_rating.is_none_or(|min| e.rating >= min)
            && self.max_rating.is_none_or(|max| e.rating <= max)
    }

    pub fn apply<'a>(&self, entries: Vec<PricedEntry<'a>>) -> Vec<PricedEntry<'a>> {
        let mut kept: Vec<_> = entries.into_iter().filter(|e| self.admits(e)).collect();
        // sort_by is stable: ties keep catalog order.
        match self.sort {
            Some(SortKey::Price) => kept.sort_by(|a, b| a.price.cmp(&b.price)),
            Some(SortKey::Rating) => kept.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
            Some(SortKey::Ratio) => kept.sort_by(by_ratio_desc),
            None => {}
        }
        kept
    }
}

/// Zero-price entries have no ratio and go last.
fn ratio(e: &PricedEntry) -> Option<f64> {
    (e.price > 0).then(|| e.rating / e.price as f64)
}

fn by_ratio_desc(a: &PricedEntry, b: &PricedEntry) -> Ordering {
    match (ratio(a), ratio(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Price the catalog at `per_gram` and answer one products request.
pub fn products<'a>(
    catalog: &'a [CatalogEntry],
    per_gram: f64,
    query: &ProductQuery,
) -> Vec<PricedEntry<'a>> {
    Filters::from(query).apply(compute_entries(catalog, per_gram))
}
