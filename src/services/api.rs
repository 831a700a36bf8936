use async_trait::async_trait;

use crate::errors::RemoteError;
use crate::models::{
    Item, Supplier, Transaction, TransactionHeader, TransactionId, TransactionInput, User, UserId,
};

/// Remote data access for one transaction kind.
///
/// Every failure (network, timeout, server-side validation, authorization,
/// stale state) is reported as a single [`RemoteError`].
#[async_trait]
pub trait TransactionApi<H: TransactionHeader>: Send + Sync {
    async fn list(&self) -> Result<Vec<Transaction<H>>, RemoteError>;

    /// Creates a draft authored by `author`. The server assigns id and number.
    async fn create(
        &self,
        input: &TransactionInput<H>,
        author: &UserId,
    ) -> Result<Transaction<H>, RemoteError>;

    /// Fails when `id` is unknown or no longer a draft.
    async fn update(
        &self,
        id: &TransactionId,
        input: &TransactionInput<H>,
    ) -> Result<Transaction<H>, RemoteError>;

    /// Moves a draft to pending approval.
    async fn submit(&self, id: &TransactionId) -> Result<Transaction<H>, RemoteError>;

    async fn delete(&self, id: &TransactionId) -> Result<(), RemoteError>;
}

/// Read-only lookups for suppliers, items and users.
#[async_trait]
pub trait ReferenceProvider: Send + Sync {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RemoteError>;
    async fn list_items(&self) -> Result<Vec<Item>, RemoteError>;
    async fn list_users(&self) -> Result<Vec<User>, RemoteError>;
}
