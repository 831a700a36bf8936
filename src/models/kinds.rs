use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

use super::ids::SupplierId;
use super::transaction::{date_only, Transaction, TransactionInput};
use crate::auth::Screen;

/// The three transaction-bearing screens.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
    IncomingGoods,
    OutgoingGoods,
    PurchaseOrder,
}

/// Header fields a kind may declare as required or searchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    SupplierId,
    ReferenceNumber,
    Destination,
    RecipientName,
}

impl HeaderField {
    /// Wire name, also used in user-facing validation messages.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::SupplierId => "supplierId",
            Self::ReferenceNumber => "referenceNumber",
            Self::Destination => "destination",
            Self::RecipientName => "recipientName",
        }
    }
}

/// Fields matched by the list search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Number,
    Header(HeaderField),
}

/// Per-kind behaviour of the lifecycle controller.
#[derive(Debug, Clone, Copy)]
pub struct KindConfig {
    pub kind: TransactionKind,
    /// Path segment under `/api`.
    pub resource: &'static str,
    /// Singular noun used in notices ("Transaction", "Order").
    pub label: &'static str,
    pub required_fields: &'static [HeaderField],
    pub search_fields: &'static [SearchField],
    /// Outgoing goods may not request more than the current stock.
    pub stock_check: bool,
    /// Field carrying the acting user's id on create.
    pub author_field: &'static str,
    pub screen: Screen,
}

/// Header of one transaction kind. Implementors carry their [`KindConfig`]
/// so the controller is generic over kinds.
pub trait TransactionHeader:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const CONFIG: KindConfig;

    /// Header of a fresh draft. Date fields default to `today`.
    fn blank(today: NaiveDate) -> Self;

    /// Text value of a header field, `None` when this kind has no such field.
    fn field_text(&self, field: HeaderField) -> Option<&str>;

    fn supplier_id(&self) -> Option<&SupplierId> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingGoodsHeader {
    #[serde(default)]
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub reference_number: String,
    #[serde(with = "date_only")]
    pub received_at: NaiveDate,
}

impl TransactionHeader for IncomingGoodsHeader {
    const CONFIG: KindConfig = KindConfig {
        kind: TransactionKind::IncomingGoods,
        resource: "incoming-goods",
        label: "Transaction",
        required_fields: &[HeaderField::SupplierId, HeaderField::ReferenceNumber],
        search_fields: &[
            SearchField::Number,
            SearchField::Header(HeaderField::ReferenceNumber),
        ],
        stock_check: false,
        author_field: "createdBy",
        screen: Screen::IncomingGoods,
    };

    fn blank(today: NaiveDate) -> Self {
        Self {
            supplier_id: SupplierId::default(),
            reference_number: String::new(),
            received_at: today,
        }
    }

    fn field_text(&self, field: HeaderField) -> Option<&str> {
        match field {
            HeaderField::SupplierId => Some(self.supplier_id.as_str()),
            HeaderField::ReferenceNumber => Some(&self.reference_number),
            _ => None,
        }
    }

    fn supplier_id(&self) -> Option<&SupplierId> {
        Some(&self.supplier_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingGoodsHeader {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub recipient_name: String,
}

impl TransactionHeader for OutgoingGoodsHeader {
    const CONFIG: KindConfig = KindConfig {
        kind: TransactionKind::OutgoingGoods,
        resource: "outgoing-goods",
        label: "Transaction",
        required_fields: &[HeaderField::Destination, HeaderField::RecipientName],
        search_fields: &[SearchField::Number],
        stock_check: true,
        author_field: "issuedById",
        screen: Screen::OutgoingGoods,
    };

    fn blank(_today: NaiveDate) -> Self {
        Self {
            destination: String::new(),
            recipient_name: String::new(),
        }
    }

    fn field_text(&self, field: HeaderField) -> Option<&str> {
        match field {
            HeaderField::Destination => Some(&self.destination),
            HeaderField::RecipientName => Some(&self.recipient_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderHeader {
    #[serde(default)]
    pub supplier_id: SupplierId,
    #[serde(with = "date_only")]
    pub expected_date: NaiveDate,
}

impl TransactionHeader for PurchaseOrderHeader {
    const CONFIG: KindConfig = KindConfig {
        kind: TransactionKind::PurchaseOrder,
        resource: "purchase-orders",
        label: "Order",
        required_fields: &[HeaderField::SupplierId],
        search_fields: &[SearchField::Number],
        stock_check: false,
        author_field: "createdBy",
        screen: Screen::PurchaseOrders,
    };

    fn blank(today: NaiveDate) -> Self {
        Self {
            supplier_id: SupplierId::default(),
            expected_date: today,
        }
    }

    fn field_text(&self, field: HeaderField) -> Option<&str> {
        match field {
            HeaderField::SupplierId => Some(self.supplier_id.as_str()),
            _ => None,
        }
    }

    fn supplier_id(&self) -> Option<&SupplierId> {
        Some(&self.supplier_id)
    }
}

pub type IncomingGoods = Transaction<IncomingGoodsHeader>;
pub type OutgoingGoods = Transaction<OutgoingGoodsHeader>;
pub type PurchaseOrder = Transaction<PurchaseOrderHeader>;

pub type IncomingGoodsInput = TransactionInput<IncomingGoodsHeader>;
pub type OutgoingGoodsInput = TransactionInput<OutgoingGoodsHeader>;
pub type PurchaseOrderInput = TransactionInput<PurchaseOrderHeader>;
