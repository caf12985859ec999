use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type MenuId = String;
pub type OrgId = String;

/// Anything a guest can filter on: dietary tags and allergens.
///
/// The identity key is the tag's id, or its name for legacy rows that were
/// stored without one. Every consumer goes through [`TagRef::identity_key`].
pub trait TagRef {
    fn tag_id(&self) -> Option<&str>;
    fn tag_name(&self) -> &str;

    fn identity_key(&self) -> &str {
        match self.tag_id() {
            Some(id) if !id.is_empty() => id,
            _ => self.tag_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DietaryTag {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Allergen {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

impl TagRef for DietaryTag {
    fn tag_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn tag_name(&self) -> &str {
        &self.name
    }
}

impl TagRef for Allergen {
    fn tag_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
    fn tag_name(&self) -> &str {
        &self.name
    }
}

impl DietaryTag {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            icon: None,
        }
    }
}

impl Allergen {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ItemPhoto {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub is_sold_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<ItemPhoto>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dietary_tags: Vec<DietaryTag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allergens: Vec<Allergen>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_id: Option<MenuId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
}

/// A published menu as served by `GET /menus/public/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Menu {
    pub id: MenuId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_design_config: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<Category>,
}

// Dashboard list rows. Only the fields the dashboard reads are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MenuSummary {
    pub id: MenuId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
}

fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}
