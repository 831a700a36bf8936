use serde::Serialize;
use thiserror::Error;

use crate::models::{ItemId, TransactionId, TransactionStatus};

/// Local, pre-flight validation failures. These never reach the remote layer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Please select an item")]
    MissingItem,

    #[error("Quantity must be greater than zero (got {quantity})")]
    NonPositiveQuantity { quantity: i64 },

    #[error("Quantity {quantity} is too large")]
    QuantityTooLarge { quantity: i64 },

    #[error("Item already added: {item_id}")]
    DuplicateItem { item_id: ItemId },

    #[error("Insufficient stock. Available: {available}")]
    InsufficientStock {
        item_id: ItemId,
        available: i64,
        requested: i64,
    },

    #[error("Add at least one item")]
    EmptyItems,
}

impl ValidationError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::MissingItem => "missing_item",
            Self::NonPositiveQuantity { .. } => "non_positive_quantity",
            Self::QuantityTooLarge { .. } => "quantity_too_large",
            Self::DuplicateItem { .. } => "duplicate_item",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::EmptyItems => "empty_items",
        }
    }
}

/// Any failure reported by the remote data-access layer: transport, timeout,
/// server-side validation, authorization or a stale-state conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct RemoteError {
    /// HTTP status when the server answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(format!("Failed to reach server: {}", err))
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::new(format!("Failed to parse server response: {}", err))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::new(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            RemoteError::decode(err)
        } else if let Some(status) = err.status() {
            RemoteError::with_status(status.as_u16(), err.to_string())
        } else {
            RemoteError::transport(err)
        }
    }
}

/// Mutating operation kinds, used for in-flight tracking, events and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Submit,
    Delete,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid state: {id} is {status}, only drafts can be changed")]
    InvalidState {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Another {0} is still in progress")]
    MutationInFlight(Operation),

    #[error("Nothing to confirm")]
    NothingToConfirm,

    #[error("No draft is open")]
    NoActiveDraft,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the failure was detected locally, before any remote call.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
