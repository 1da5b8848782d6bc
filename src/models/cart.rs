use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Catalog product as handed to the cart by the presentation layer.
///
/// Product ids are strings because the catalog lives in an external store;
/// only carts, lines and checkout sessions use locally generated UUIDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// One option picked inside a modifier group (e.g. "extra cheese").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierOption {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

/// A modifier group selection attached to a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierSelection {
    pub group_id: String,
    pub group_name: String,
    pub options: Vec<ModifierOption>,
}

/// Optional configuration supplied alongside `add_item`.
///
/// `item_price` is the final per-unit price including modifier surcharges;
/// when absent the catalog price is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineExtras {
    #[serde(default)]
    pub selected_variants: BTreeMap<String, String>,
    #[serde(default)]
    pub selected_modifiers: Vec<ModifierSelection>,
    pub custom_note: Option<String>,
    pub item_price: Option<Decimal>,
}

/// A single line in a cart.
///
/// Invariants: `quantity >= 1` (a decrement to zero removes the line) and
/// `unit_price` already includes modifier surcharges.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: String,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    pub quantity: i32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub selected_variants: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selected_modifiers: Vec<ModifierSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_note: Option<String>,
    pub unit_price: Decimal,
}

impl CartLine {
    /// Line total, recomputed on every read.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Deterministic identity key deciding merge vs. append.
    ///
    /// Product id + sorted `name:value` variant pairs + sorted modifier
    /// option ids. `custom_note` never participates: two lines differing
    /// only in note still merge.
    pub fn identity_key(&self) -> String {
        identity_key(
            &self.product_id,
            &self.selected_variants,
            &self.selected_modifiers,
        )
    }
}

/// Computes the line identity key for a product/selection combination.
pub fn identity_key(
    product_id: &str,
    variants: &BTreeMap<String, String>,
    modifiers: &[ModifierSelection],
) -> String {
    let mut key = String::from(product_id);
    // BTreeMap iteration is already name-sorted
    for (name, value) in variants {
        key.push('|');
        key.push_str(name);
        key.push(':');
        key.push_str(value);
    }
    let mut option_ids: Vec<&str> = modifiers
        .iter()
        .flat_map(|m| m.options.iter().map(|o| o.id.as_str()))
        .collect();
    option_ids.sort_unstable();
    for id in option_ids {
        key.push('|');
        key.push_str(id);
    }
    key
}

/// An in-memory shopping cart.
///
/// `total_items` and `total_price` are pure derivations over the line list,
/// recomputed on every read. Nothing is cached.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub id: Uuid,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_items(&self) -> i32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(|line| line.line_total()).sum()
    }
}
