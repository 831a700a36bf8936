//! Form state of a transaction being created or edited, and its local
//! validation rules.

use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::ValidationError;
use crate::models::transaction::normalize_notes;
use crate::models::{ItemId, Transaction, TransactionHeader, TransactionInput, TransactionItem};

/// Header, notes and accumulated lines of the open form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft<H> {
    pub header: H,
    pub notes: String,
    pub items: Vec<TransactionItem>,
}

/// The item picker and quantity box next to the line list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

impl<H: TransactionHeader> Draft<H> {
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            header: H::blank(today),
            notes: String::new(),
            items: Vec::new(),
        }
    }

    pub fn from_transaction(tx: &Transaction<H>) -> Self {
        Self {
            header: tx.header.clone(),
            notes: tx.notes.clone().unwrap_or_default(),
            items: tx.items.clone(),
        }
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.items.iter().any(|line| &line.item_id == item_id)
    }

    /// Appends a line. `available` is the item's stock when the kind enforces
    /// a stock ceiling, `None` otherwise.
    pub fn add_line(
        &mut self,
        item_id: &ItemId,
        quantity: i64,
        available: Option<i64>,
    ) -> Result<(), ValidationError> {
        let line = check_line(item_id, quantity)?;

        if let Some(available) = available {
            if quantity > available {
                return Err(ValidationError::InsufficientStock {
                    item_id: item_id.clone(),
                    available,
                    requested: quantity,
                });
            }
        }

        if self.contains(item_id) {
            return Err(ValidationError::DuplicateItem {
                item_id: item_id.clone(),
            });
        }

        self.items.push(line);
        Ok(())
    }

    /// Removes the line for `item_id`; returns whether one was present.
    pub fn remove_line(&mut self, item_id: &ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|line| &line.item_id != item_id);
        self.items.len() != before
    }

    /// Required header fields must be non-blank and at least one line present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in H::CONFIG.required_fields {
            let filled = self
                .header
                .field_text(*field)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false);
            if !filled {
                return Err(ValidationError::MissingField {
                    field: field.wire_name(),
                });
            }
        }

        if self.items.is_empty() {
            return Err(ValidationError::EmptyItems);
        }

        Ok(())
    }

    pub fn to_input(&self) -> TransactionInput<H> {
        TransactionInput {
            header: self.header.clone(),
            notes: normalize_notes(Some(&self.notes)),
            items: self.items.clone(),
        }
    }
}

fn check_line(item_id: &ItemId, quantity: i64) -> Result<TransactionItem, ValidationError> {
    if item_id.is_empty() {
        return Err(ValidationError::MissingItem);
    }
    if quantity <= 0 {
        return Err(ValidationError::NonPositiveQuantity { quantity });
    }
    let quantity_u32 =
        u32::try_from(quantity).map_err(|_| ValidationError::QuantityTooLarge { quantity })?;
    Ok(TransactionItem::new(item_id.clone(), quantity_u32))
}
