//! Search, tag filtering and facet derivation over a published menu.
//!
//! Everything here is a pure function of the catalog snapshot and the
//! guest's query state; callers recompute on every change.

use crate::model::{Allergen, Category, DietaryTag, Item, Menu, TagRef};
use crate::presets::TagGroup;
use crate::util::compare_names;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Identity key -> explicit facet bucket, as saved by the operator.
pub type TagGroupOverrides = BTreeMap<String, TagGroup>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoldOutMode {
    /// Keep sold-out items; the renderer de-emphasizes them.
    #[default]
    Dim,
    Hide,
}

impl SoldOutMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SoldOutMode::Dim => "dim",
            SoldOutMode::Hide => "hide",
        }
    }

    fn hides(self, item: &Item) -> bool {
        self == SoldOutMode::Hide && item.is_sold_out
    }
}

impl std::str::FromStr for SoldOutMode {
    type Err = crate::MenuError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "dim" => Ok(SoldOutMode::Dim),
            "hide" => Ok(SoldOutMode::Hide),
            other => Err(crate::MenuError::Invalid(format!(
                "sold-out display must be dim or hide, got {other:?}"
            ))),
        }
    }
}

/// A selectable filter value: `d:<key>` for dietary tags, `a:<key>` for allergens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagKey {
    Dietary(String),
    Allergen(String),
}

impl TagKey {
    pub fn dietary(tag: &DietaryTag) -> Self {
        TagKey::Dietary(tag.identity_key().to_string())
    }

    pub fn allergen(allergen: &Allergen) -> Self {
        TagKey::Allergen(allergen.identity_key().to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(key) = raw.strip_prefix("d:") {
            Some(TagKey::Dietary(key.to_string()))
        } else {
            raw.strip_prefix("a:")
                .map(|key| TagKey::Allergen(key.to_string()))
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKey::Dietary(key) => write!(f, "d:{key}"),
            TagKey::Allergen(key) => write!(f, "a:{key}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FilterFacets {
    pub diet: Vec<DietaryTag>,
    pub spice: Vec<DietaryTag>,
    pub highlights: Vec<DietaryTag>,
    pub allergens: Vec<Allergen>,
}

impl FilterFacets {
    fn bucket_mut(&mut self, group: TagGroup) -> &mut Vec<DietaryTag> {
        match group {
            TagGroup::Diet => &mut self.diet,
            TagGroup::Spice => &mut self.spice,
            TagGroup::Highlights => &mut self.highlights,
        }
    }
}

/// Builds the filter panel's buckets from the tags present on visible items.
///
/// Tags are de-duplicated by identity key with the first occurrence kept.
/// Two tags sharing a name but not an id stay separate entries.
pub fn compute_facets(
    menu: &Menu,
    sold_out: SoldOutMode,
    overrides: &TagGroupOverrides,
) -> FilterFacets {
    let mut seen_tags = HashSet::new();
    let mut seen_allergens = HashSet::new();
    let mut tags: Vec<&DietaryTag> = Vec::new();
    let mut allergens: Vec<&Allergen> = Vec::new();

    for item in menu.categories.iter().flat_map(|c| c.items.iter()) {
        if sold_out.hides(item) {
            continue;
        }
        // a tag with neither id nor name cannot be selected
        for tag in &item.dietary_tags {
            if !tag.identity_key().is_empty() && seen_tags.insert(tag.identity_key()) {
                tags.push(tag);
            }
        }
        for allergen in &item.allergens {
            if !allergen.identity_key().is_empty() && seen_allergens.insert(allergen.identity_key()) {
                allergens.push(allergen);
            }
        }
    }

    let mut facets = FilterFacets::default();
    for tag in tags {
        let group = overrides
            .get(tag.identity_key())
            .copied()
            .unwrap_or_else(|| TagGroup::infer(&tag.name));
        facets.bucket_mut(group).push(tag.clone());
    }
    for bucket in [&mut facets.diet, &mut facets.spice, &mut facets.highlights] {
        bucket.sort_by(|a, b| compare_names(&a.name, &b.name));
    }
    facets.allergens = allergens.into_iter().cloned().collect();
    facets
        .allergens
        .sort_by(|a, b| compare_names(&a.name, &b.name));
    facets
}

/// Text match AND tag match. Selected tags combine with OR.
pub fn matches_query(item: &Item, search: &str, selected: &[String]) -> bool {
    matches_text(item, &search.to_lowercase()) && matches_tags(item, selected)
}

fn matches_text(item: &Item, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    item.name.to_lowercase().contains(needle)
        || item
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}

fn matches_tags(item: &Item, selected: &[String]) -> bool {
    if selected.is_empty() {
        return true;
    }
    let keys: HashSet<TagKey> = item
        .dietary_tags
        .iter()
        .map(TagKey::dietary)
        .chain(item.allergens.iter().map(TagKey::allergen))
        .collect();
    // unknown prefixes match nothing
    selected
        .iter()
        .filter_map(|k| TagKey::parse(k))
        .any(|k| keys.contains(&k))
}

pub fn apply_sold_out_visibility(items: Vec<Item>, sold_out: SoldOutMode) -> Vec<Item> {
    match sold_out {
        SoldOutMode::Dim => items,
        SoldOutMode::Hide => items.into_iter().filter(|i| !i.is_sold_out).collect(),
    }
}

/// Filters every category and drops the ones left empty. Sold-out
/// visibility is applied after the search, so a hidden item never shows.
pub fn derive_filtered_catalog(
    menu: &Menu,
    search: &str,
    selected: &[String],
    sold_out: SoldOutMode,
) -> Vec<Category> {
    let needle = search.to_lowercase();
    menu.categories
        .iter()
        .filter_map(|cat| {
            let matched: Vec<Item> = cat
                .items
                .iter()
                .filter(|item| matches_text(item, &needle) && matches_tags(item, selected))
                .cloned()
                .collect();
            let items = apply_sold_out_visibility(matched, sold_out);
            if items.is_empty() {
                return None;
            }
            Some(Category {
                id: cat.id.clone(),
                name: cat.name.clone(),
                rank: cat.rank,
                menu_id: cat.menu_id.clone(),
                items,
            })
        })
        .collect()
}

pub fn toggle_tag_key(key: &str, selection: &[String]) -> Vec<String> {
    if selection.iter().any(|k| k == key) {
        selection.iter().filter(|k| *k != key).cloned().collect()
    } else {
        let mut next = selection.to_vec();
        next.push(key.to_string());
        next
    }
}

/// The guest's query state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MenuQuery {
    pub search: String,
    pub tags: Vec<String>,
    pub sold_out: SoldOutMode,
}

impl MenuQuery {
    pub fn toggle(&mut self, key: &str) {
        self.tags = toggle_tag_key(key, &self.tags);
    }

    pub fn run(&self, menu: &Menu, overrides: &TagGroupOverrides) -> MenuView {
        let categories = derive_filtered_catalog(menu, &self.search, &self.tags, self.sold_out);
        let matched_items = categories.iter().map(|c| c.items.len()).sum();
        MenuView {
            menu_id: menu.id.clone(),
            categories,
            facets: compute_facets(menu, self.sold_out, overrides),
            sold_out: self.sold_out,
            selected_tags: self.tags.clone(),
            matched_items,
        }
    }
}

/// Derived view handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuView {
    pub menu_id: String,
    pub categories: Vec<Category>,
    pub facets: FilterFacets,
    pub sold_out: SoldOutMode,
    pub selected_tags: Vec<String>,
    pub matched_items: usize,
}
