use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, instrument, warn};

use super::api::ReferenceProvider;
use crate::errors::RemoteError;
use crate::events::{Event, EventSender};
use crate::models::{Item, ItemId, Supplier, SupplierId, User, UserId};

const UNKNOWN: &str = "Unknown";

/// Suppliers, items and users keyed by id, built once per fetch.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    suppliers: HashMap<SupplierId, Supplier>,
    items: HashMap<ItemId, Item>,
    users: HashMap<UserId, User>,
}

impl ReferenceData {
    pub fn from_lists(suppliers: Vec<Supplier>, items: Vec<Item>, users: Vec<User>) -> Self {
        Self {
            suppliers: suppliers.into_iter().map(|s| (s.id.clone(), s)).collect(),
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    pub fn supplier(&self, id: &SupplierId) -> Option<&Supplier> {
        self.suppliers.get(id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn supplier_name(&self, id: &SupplierId) -> &str {
        self.supplier(id).map(|s| s.name.as_str()).unwrap_or(UNKNOWN)
    }

    pub fn item_name(&self, id: &ItemId) -> &str {
        self.item(id).map(|i| i.name.as_str()).unwrap_or(UNKNOWN)
    }

    pub fn user_name(&self, id: &UserId) -> &str {
        self.user(id).map(|u| u.name.as_str()).unwrap_or(UNKNOWN)
    }

    /// Current stock of an item; unknown items have none.
    pub fn stock_of(&self, id: &ItemId) -> i64 {
        self.item(id).map(Item::current_stock_level).unwrap_or(0)
    }

    /// Items sorted by name, for pickers.
    pub fn items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.values().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        items
    }

    pub fn suppliers(&self) -> Vec<&Supplier> {
        let mut suppliers: Vec<&Supplier> = self.suppliers.values().collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        suppliers
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.suppliers.len(), self.items.len(), self.users.len())
    }
}

/// Shared read-only cache of reference data. Refetching replaces the whole
/// snapshot; the last completed fetch wins.
pub struct ReferenceCache {
    provider: Arc<dyn ReferenceProvider>,
    data: RwLock<Arc<ReferenceData>>,
    events: Option<EventSender>,
}

impl ReferenceCache {
    pub fn new(provider: Arc<dyn ReferenceProvider>) -> Self {
        Self {
            provider,
            data: RwLock::new(Arc::new(ReferenceData::default())),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Cache pre-filled with data, mostly for tests and offline use.
    pub fn with_data(provider: Arc<dyn ReferenceProvider>, data: ReferenceData) -> Self {
        Self {
            provider,
            data: RwLock::new(Arc::new(data)),
            events: None,
        }
    }

    pub fn snapshot(&self) -> Arc<ReferenceData> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches all three lists. On failure the previous snapshot is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<ReferenceData>, RemoteError> {
        let fetched = tokio::try_join!(
            self.provider.list_suppliers(),
            self.provider.list_items(),
            self.provider.list_users(),
        );

        let (suppliers, items, users) = match fetched {
            Ok(lists) => lists,
            Err(e) => {
                warn!(error = %e, "reference data refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let data = Arc::new(ReferenceData::from_lists(suppliers, items, users));
        let (suppliers, items, users) = data.counts();
        info!(suppliers, items, users, "reference data refreshed");

        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data.clone();

        if let Some(events) = &self.events {
            events.send(Event::ReferenceDataRefreshed {
                suppliers,
                items,
                users,
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Provider {}

        #[async_trait]
        impl ReferenceProvider for Provider {
            async fn list_suppliers(&self) -> Result<Vec<Supplier>, RemoteError>;
            async fn list_items(&self) -> Result<Vec<Item>, RemoteError>;
            async fn list_users(&self) -> Result<Vec<User>, RemoteError>;
        }
    }

    fn item(id: &str, name: &str, stock: i64) -> Item {
        Item {
            id: ItemId::from(id),
            name: name.to_string(),
            code: None,
            sku: None,
            stock: Some(stock),
            current_stock: None,
        }
    }

    fn supplier(id: &str, name: &str) -> Supplier {
        Supplier {
            id: SupplierId::from(id),
            name: name.to_string(),
            code: None,
        }
    }

    #[tokio::test]
    async fn refresh_builds_keyed_lookup() {
        let mut provider = MockProvider::new();
        provider
            .expect_list_suppliers()
            .times(1)
            .returning(|| Ok(vec![supplier("S1", "Acme")]));
        provider
            .expect_list_items()
            .times(1)
            .returning(|| Ok(vec![item("I1", "Cable", 10)]));
        provider.expect_list_users().times(1).returning(|| Ok(vec![]));

        let cache = ReferenceCache::new(Arc::new(provider));
        let data = cache.refresh().await.unwrap();

        assert_eq!(data.supplier_name(&SupplierId::from("S1")), "Acme");
        assert_eq!(data.supplier_name(&SupplierId::from("S9")), "Unknown");
        assert_eq!(data.stock_of(&ItemId::from("I1")), 10);
        assert_eq!(data.stock_of(&ItemId::from("missing")), 0);
        assert_eq!(data.user_name(&UserId::from("U1")), "Unknown");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let mut provider = MockProvider::new();
        provider
            .expect_list_suppliers()
            .returning(|| Err(RemoteError::with_status(503, "maintenance")));
        provider.expect_list_items().returning(|| Ok(vec![]));
        provider.expect_list_users().returning(|| Ok(vec![]));

        let seeded = ReferenceData::from_lists(vec![], vec![item("I1", "Cable", 3)], vec![]);
        let cache = ReferenceCache::with_data(Arc::new(provider), seeded);

        let err = cache.refresh().await.unwrap_err();
        assert_eq!(err.status, Some(503));
        assert_eq!(cache.snapshot().stock_of(&ItemId::from("I1")), 3);
    }

    #[test]
    fn items_are_listed_by_name() {
        let data = ReferenceData::from_lists(
            vec![],
            vec![item("I2", "Tape", 1), item("I1", "Cable", 1)],
            vec![],
        );
        let names: Vec<&str> = data.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Cable", "Tape"]);
    }
}
