use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ids::{ItemId, TransactionId, UserId};
use super::kinds::TransactionHeader;

/// Lifecycle status of a stock transaction.
///
/// The server owns every transition; the client only mirrors it. `Pending`
/// is the state between submission and the approver's decision and is sent
/// as `SUBMITTED` by the API.
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
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TransactionStatus {
    Draft,
    #[serde(rename = "SUBMITTED", alias = "PENDING")]
    #[strum(to_string = "SUBMITTED", serialize = "PENDING")]
    Pending,
    Approved,
    Rejected,
}

impl TransactionStatus {
    /// Only drafts may be edited, deleted or submitted.
    pub fn is_draft(self) -> bool {
        self == Self::Draft
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Transitions the server may perform. Used to sanity check refetched state.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Pending)
                | (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Pending => "Pending approval",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

/// One `{itemId, quantity}` line of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl TransactionItem {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Approval signature as delivered by the API, usually a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureImage(String);

impl SignatureImage {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Media type declared by a `data:` URL, if any.
    pub fn media_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let (meta, _) = rest.split_once(',')?;
        meta.split(';').next().filter(|m| !m.is_empty())
    }

    /// Decodes the image bytes of a base64 `data:` URL. Other forms (plain
    /// URLs) are not decodable here.
    pub fn decode(&self) -> Option<Vec<u8>> {
        let rest = self.0.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        if !meta.ends_with(";base64") {
            return None;
        }
        STANDARD.decode(payload.trim()).ok()
    }
}

/// Outcome of the approval step, present once the server has decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved {
        approved_by: Option<UserId>,
        approved_at: Option<DateTime<Utc>>,
        signature: Option<SignatureImage>,
    },
    Rejected {
        reason: Option<String>,
    },
}

/// A persisted stock transaction of kind `H`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "H: DeserializeOwned"))]
pub struct Transaction<H> {
    pub id: TransactionId,
    #[serde(alias = "transactionNumber", alias = "orderNumber")]
    pub number: String,
    pub status: TransactionStatus,
    #[serde(flatten)]
    pub header: H,
    #[serde(default)]
    pub items: Vec<TransactionItem>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "createdBy", alias = "issuedById")]
    pub author_id: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<UserId>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature_image: Option<SignatureImage>,
    #[serde(default, alias = "rejectReason")]
    pub rejection_reason: Option<String>,
}

impl<H: TransactionHeader> Transaction<H> {
    pub fn is_editable(&self) -> bool {
        self.status.is_draft()
    }

    pub fn approval_outcome(&self) -> Option<ApprovalOutcome> {
        match self.status {
            TransactionStatus::Approved => Some(ApprovalOutcome::Approved {
                approved_by: self.approved_by.clone(),
                approved_at: self.approved_at,
                signature: self.signature_image.clone(),
            }),
            TransactionStatus::Rejected => Some(ApprovalOutcome::Rejected {
                reason: self.rejection_reason.clone(),
            }),
            TransactionStatus::Draft | TransactionStatus::Pending => None,
        }
    }

    /// The editable part of this transaction, as it would be sent back on update.
    pub fn to_input(&self) -> TransactionInput<H> {
        TransactionInput {
            header: self.header.clone(),
            notes: normalize_notes(self.notes.as_deref()),
            items: self.items.clone(),
        }
    }
}

/// Payload for create and update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "H: DeserializeOwned"))]
pub struct TransactionInput<H> {
    #[serde(flatten)]
    pub header: H,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<TransactionItem>,
}

/// Blank notes are the same as no notes.
pub(crate) fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Date-only fields arrive either as `YYYY-MM-DD` or as a full timestamp;
/// only the date part is kept.
pub mod date_only {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
        let date_part = raw.trim().split('T').next().unwrap_or_default();
        NaiveDate::parse_from_str(date_part, FORMAT)
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(|e| D::Error::custom(format!("invalid date '{}': {}", raw, e)))
    }
}
