// src/catalog.rs

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::{fs, path::Path};
use tracing::{debug, info};

/// Maximum number of hits returned by a catalog search.
const MAX_SEARCH_RESULTS: usize = 50;

/// A stock item from the read-only catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

/// Strip everything but ASCII letters and digits, then uppercase.
///
/// `canonical_sku("ab-123") == canonical_sku("AB123") == "AB123"`
pub fn canonical_sku(sku: &str) -> String {
    sku.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Canonical SKU -> catalog item. Later items overwrite earlier ones.
#[derive(Debug, Default, Clone)]
pub struct SkuIndex {
    by_sku: HashMap<String, CatalogItem>,
}

impl SkuIndex {
    pub fn get(&self, token: &str) -> Option<&CatalogItem> {
        self.by_sku.get(&canonical_sku(token))
    }

    pub fn len(&self) -> usize {
        self.by_sku.len()
    }
}

/// Lowercased manufacturer -> display form, kept in first-insertion order.
/// The first spelling seen for a key is the one kept.
#[derive(Debug, Default, Clone)]
pub struct ManufacturerHints {
    entries: Vec<(String, String)>,
    seen: HashSet<String>,
}

impl ManufacturerHints {
    fn insert(&mut self, manufacturer: &str) {
        let key = manufacturer.to_lowercase();
        if self.seen.insert(key.clone()) {
            self.entries.push((key, manufacturer.to_string()));
        }
    }

    /// First hint (in insertion order) whose key occurs in `lowered_line`.
    pub fn find_in(&self, lowered_line: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| lowered_line.contains(key.as_str()))
            .map(|(_, display)| display.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Both lookup structures derived from one catalog snapshot.
#[derive(Debug, Default, Clone)]
pub struct CatalogIndex {
    pub skus: SkuIndex,
    pub hints: ManufacturerHints,
}

impl CatalogIndex {
    pub fn build(items: &[CatalogItem]) -> Self {
        let mut index = CatalogIndex::default();

        for item in items {
            if !item.sku.is_empty() {
                index
                    .skus
                    .by_sku
                    .insert(canonical_sku(&item.sku), item.clone());
            }
            if let Some(m) = item.manufacturer.as_deref().filter(|m| !m.is_empty()) {
                index.hints.insert(m);
            }
        }

        debug!(
            skus = index.skus.len(),
            hints = index.hints.len(),
            "Catalog index built"
        );
        index
    }
}

/// A loaded catalog snapshot.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Load a catalog from a JSON array of items.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let items: Vec<CatalogItem> = serde_json::from_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            items = items.len(),
            "Catalog loaded"
        );
        Ok(Self::new(items))
    }

    /// Exact SKU lookup, as used when reopening a stored order.
    pub fn find_by_sku(&self, sku: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.sku == sku)
    }

    /// Case-insensitive substring search over name and SKU.
    pub fn search(&self, term: &str) -> Vec<&CatalogItem> {
        if term.is_empty() {
            return Vec::new();
        }
        let needle = term.to_lowercase();
        self.items
            .iter()
            .filter(|i| {
                i.name.to_lowercase().contains(&needle) || i.sku.to_lowercase().contains(&needle)
            })
            .take(MAX_SEARCH_RESULTS)
            .collect()
    }

    /// Distinct manufacturers, sorted.
    pub fn suppliers(&self) -> Vec<String> {
        distinct_sorted(self.items.iter().filter_map(|i| i.manufacturer.as_deref()))
    }

    /// Distinct systems, sorted.
    pub fn systems(&self) -> Vec<String> {
        distinct_sorted(self.items.iter().filter_map(|i| i.system.as_deref()))
    }
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    out.sort();
    out
}

/// Case-insensitive substring filter. An empty query keeps everything.
pub fn filter_options(options: &[String], query: &str) -> Vec<String> {
    if query.is_empty() {
        return options.to_vec();
    }
    let needle = query.to_lowercase();
    options
        .iter()
        .filter(|o| o.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
