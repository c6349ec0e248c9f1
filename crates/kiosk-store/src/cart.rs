//! Shopping cart: `itemId -> (size -> quantity)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

type CartItems = BTreeMap<String, BTreeMap<String, u32>>;

/// Quantities per item and size. Absent entries mean zero; a stored
/// quantity is always positive.
///
/// Serialized as a JSON object of objects, e.g. `{"shirt":{"M":2}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CartItems", into = "CartItems")]
pub struct Cart {
    items: CartItems,
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine<'a> {
    pub item_id: &'a str,
    pub size: &'a str,
    pub quantity: u32,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units. Returns the new quantity for the line.
    pub fn add(&mut self, item_id: &str, size: &str, quantity: u32) -> u32 {
        if quantity == 0 {
            return self.quantity(item_id, size);
        }
        let entry = self
            .items
            .entry(item_id.to_string())
            .or_default()
            .entry(size.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(quantity);
        *entry
    }

    /// Set a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, item_id: &str, size: &str, quantity: u32) {
        if quantity == 0 {
            self.remove(item_id, size);
            return;
        }
        self.items
            .entry(item_id.to_string())
            .or_default()
            .insert(size.to_string(), quantity);
    }

    /// Remove a line. Returns whether it existed.
    pub fn remove(&mut self, item_id: &str, size: &str) -> bool {
        let Some(sizes) = self.items.get_mut(item_id) else {
            return false;
        };
        let removed = sizes.remove(size).is_some();
        if sizes.is_empty() {
            self.items.remove(item_id);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn quantity(&self, item_id: &str, size: &str) -> u32 {
        self.items
            .get(item_id)
            .and_then(|sizes| sizes.get(size))
            .copied()
            .unwrap_or(0)
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items
            .values()
            .flat_map(|sizes| sizes.values())
            .fold(0u32, |acc, q| acc.saturating_add(*q))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Lines in item then size order.
    pub fn lines(&self) -> impl Iterator<Item = CartLine<'_>> {
        self.items.iter().flat_map(|(item_id, sizes)| {
            sizes.iter().map(move |(size, quantity)| CartLine {
                item_id,
                size,
                quantity: *quantity,
            })
        })
    }
}

impl From<CartItems> for Cart {
    fn from(mut items: CartItems) -> Self {
        for sizes in items.values_mut() {
            sizes.retain(|_, quantity| *quantity > 0);
        }
        items.retain(|_, sizes| !sizes.is_empty());
        Self { items }
    }
}

impl From<Cart> for CartItems {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}
