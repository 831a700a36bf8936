use serde::{Deserialize, Serialize};

use super::ids::{ItemId, SupplierId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Stocked item. The API reports stock as either `stock` or `currentStock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub current_stock: Option<i64>,
}

impl Item {
    /// `stock` when set and non-zero, otherwise `currentStock`, otherwise 0.
    pub fn current_stock_level(&self) -> i64 {
        self.stock
            .filter(|s| *s != 0)
            .or(self.current_stock)
            .unwrap_or(0)
    }

    pub fn display_code(&self) -> &str {
        self.code
            .as_deref()
            .or(self.sku.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}
