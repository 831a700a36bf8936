//! Read-only projections handed to the presentation layer, with reference
//! ids resolved to display names.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::reference::ReferenceData;
use crate::models::{
    ApprovalOutcome, ItemId, SignatureImage, Transaction, TransactionHeader, TransactionId,
    TransactionItem, TransactionKind, TransactionStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub item_id: ItemId,
    pub item_code: String,
    pub item_name: String,
    pub quantity: u32,
    pub stock: i64,
    /// Set for stock-checked kinds when the line asks for more than is in stock.
    pub over_stock: bool,
}

impl LineView {
    pub fn build(line: &TransactionItem, refs: &ReferenceData, stock_check: bool) -> Self {
        let stock = refs.stock_of(&line.item_id);
        Self {
            item_id: line.item_id.clone(),
            item_code: refs
                .item(&line.item_id)
                .map(|i| i.display_code().to_string())
                .unwrap_or_default(),
            item_name: refs.item_name(&line.item_id).to_string(),
            quantity: line.quantity,
            stock,
            over_stock: stock_check && i64::from(line.quantity) > stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum OutcomeView {
    Approved {
        approver: String,
        approved_at: Option<DateTime<Utc>>,
        signature: Option<SignatureImage>,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView<H> {
    pub kind: TransactionKind,
    pub id: TransactionId,
    pub number: String,
    pub status: TransactionStatus,
    pub status_label: &'static str,
    pub header: H,
    pub supplier: Option<String>,
    pub author: String,
    pub created_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lines: Vec<LineView>,
    pub outcome: Option<OutcomeView>,
}

impl<H: TransactionHeader> TransactionView<H> {
    pub fn build(tx: &Transaction<H>, refs: &ReferenceData) -> Self {
        let config = H::CONFIG;
        let outcome = tx.approval_outcome().map(|outcome| match outcome {
            ApprovalOutcome::Approved {
                approved_by,
                approved_at,
                signature,
            } => OutcomeView::Approved {
                approver: approved_by
                    .as_ref()
                    .map(|id| refs.user_name(id).to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
                approved_at,
                signature,
            },
            ApprovalOutcome::Rejected { reason } => OutcomeView::Rejected {
                reason: reason.unwrap_or_default(),
            },
        });

        Self {
            kind: config.kind,
            id: tx.id.clone(),
            number: tx.number.clone(),
            status: tx.status,
            status_label: tx.status.label(),
            header: tx.header.clone(),
            supplier: tx
                .header
                .supplier_id()
                .map(|id| refs.supplier_name(id).to_string()),
            author: tx
                .author_id
                .as_ref()
                .map(|id| refs.user_name(id).to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            created_at: tx.created_at,
            notes: tx.notes.clone(),
            lines: tx
                .items
                .iter()
                .map(|line| LineView::build(line, refs, config.stock_check))
                .collect(),
            outcome,
        }
    }
}
