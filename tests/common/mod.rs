//! Shared harness: an in-memory transaction server and reference provider
//! standing in for the REST API, plus fixtures.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use stockdesk::{
    auth::{Actor, Role},
    errors::{Operation, RemoteError},
    events::EventSender,
    models::{
        Item, ItemId, SignatureImage, Supplier, SupplierId, Transaction, TransactionHeader,
        TransactionId, TransactionInput, TransactionItem, TransactionKind, TransactionStatus,
        User, UserId,
    },
    services::{
        LifecycleController, ReferenceCache, ReferenceData, ReferenceProvider, TransactionApi,
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A remote call as observed by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Create { author: UserId },
    Update(TransactionId),
    Submit(TransactionId),
    Delete(TransactionId),
}

impl Call {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Call::List => None,
            Call::Create { .. } => Some(Operation::Create),
            Call::Update(_) => Some(Operation::Update),
            Call::Submit(_) => Some(Operation::Submit),
            Call::Delete(_) => Some(Operation::Delete),
        }
    }
}

struct ServerState<H> {
    transactions: Vec<Transaction<H>>,
    next_seq: u64,
    calls: Vec<Call>,
    payloads: Vec<TransactionInput<H>>,
    failures: HashMap<Operation, RemoteError>,
    list_failure: Option<RemoteError>,
}

/// In-memory server enforcing the draft-only rules the real API enforces.
pub struct FakeServer<H> {
    state: Mutex<ServerState<H>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl<H: TransactionHeader> FakeServer<H> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                transactions: Vec::new(),
                next_seq: 1,
                calls: Vec::new(),
                payloads: Vec::new(),
                failures: HashMap::new(),
                list_failure: None,
            }),
            hold: Mutex::new(None),
        })
    }

    fn prefix() -> &'static str {
        match H::CONFIG.kind {
            TransactionKind::IncomingGoods => "IN",
            TransactionKind::OutgoingGoods => "OUT",
            TransactionKind::PurchaseOrder => "PO",
        }
    }

    /// Stores a transaction as if another session had created it.
    pub fn seed(&self, tx: Transaction<H>) -> Transaction<H> {
        lock(&self.state).transactions.push(tx.clone());
        tx
    }

    pub fn seed_with_status(
        &self,
        header: H,
        items: Vec<TransactionItem>,
        status: TransactionStatus,
    ) -> Transaction<H> {
        let mut st = lock(&self.state);
        let seq = st.next_seq;
        st.next_seq += 1;
        let tx = transaction(
            &format!("tx-{}", seq),
            &format!("{}-{:03}", Self::prefix(), seq),
            header,
            items,
            status,
        );
        st.transactions.push(tx.clone());
        tx
    }

    pub fn seed_draft(&self, header: H, items: Vec<TransactionItem>) -> Transaction<H> {
        self.seed_with_status(header, items, TransactionStatus::Draft)
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.operation() == Some(operation))
            .count()
    }

    pub fn mutation_calls(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.operation().is_some())
            .count()
    }

    pub fn payloads(&self) -> Vec<TransactionInput<H>> {
        lock(&self.state).payloads.clone()
    }

    pub fn transaction(&self, id: &TransactionId) -> Option<Transaction<H>> {
        lock(&self.state)
            .transactions
            .iter()
            .find(|tx| &tx.id == id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Transaction<H>> {
        lock(&self.state).transactions.clone()
    }

    /// The next call of `operation` fails with `error`.
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        lock(&self.state).failures.insert(operation, error);
    }

    pub fn fail_next_list(&self, error: RemoteError) {
        lock(&self.state).list_failure = Some(error);
    }

    /// The next mutation blocks after being recorded until the returned
    /// handle is notified.
    pub fn hold_next_mutation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.hold) = Some(gate.clone());
        gate
    }

    /// Moves a pending transaction to APPROVED, as the head of warehouse would.
    pub fn approve(&self, id: &TransactionId, approver: &str, signature: Option<&str>) {
        self.update_status(id, |tx| {
            tx.status = TransactionStatus::Approved;
            tx.approved_by = Some(UserId::from(approver));
            tx.approved_at = Some(Utc::now());
            tx.signature_image = signature.map(SignatureImage::new);
        });
    }

    pub fn reject(&self, id: &TransactionId, reason: &str) {
        self.update_status(id, |tx| {
            tx.status = TransactionStatus::Rejected;
            tx.rejection_reason = Some(reason.to_string());
        });
    }

    /// Changes status behind the controller's back.
    pub fn force_status(&self, id: &TransactionId, status: TransactionStatus) {
        self.update_status(id, |tx| tx.status = status);
    }

    fn update_status(&self, id: &TransactionId, change: impl FnOnce(&mut Transaction<H>)) {
        let mut st = lock(&self.state);
        if let Some(tx) = st.transactions.iter_mut().find(|tx| &tx.id == id) {
            change(tx);
        }
    }

    async fn record(&self, call: Call) -> Result<(), RemoteError> {
        let operation = call.operation();
        lock(&self.state).calls.push(call);

        let gate = match operation {
            Some(_) => lock(&self.hold).take(),
            None => None,
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        match operation {
            Some(operation) => match lock(&self.state).failures.remove(&operation) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

fn draft_index<H>(st: &ServerState<H>, id: &TransactionId) -> Result<usize, RemoteError> {
    let index = st
        .transactions
        .iter()
        .position(|tx| &tx.id == id)
        .ok_or_else(|| RemoteError::with_status(404, "Transaction not found"))?;
    if !st.transactions[index].status.is_draft() {
        return Err(RemoteError::with_status(
            400,
            "Only draft transactions can be modified",
        ));
    }
    Ok(index)
}

#[async_trait]
impl<H: TransactionHeader> TransactionApi<H> for FakeServer<H> {
    async fn list(&self) -> Result<Vec<Transaction<H>>, RemoteError> {
        self.record(Call::List).await?;
        let mut st = lock(&self.state);
        match st.list_failure.take() {
            Some(err) => Err(err),
            None => Ok(st.transactions.clone()),
        }
    }

    async fn create(
        &self,
        input: &TransactionInput<H>,
        author: &UserId,
    ) -> Result<Transaction<H>, RemoteError> {
        self.record(Call::Create {
            author: author.clone(),
        })
        .await?;

        let mut st = lock(&self.state);
        st.payloads.push(input.clone());
        let seq = st.next_seq;
        st.next_seq += 1;
        let mut tx = transaction(
            &format!("tx-{}", seq),
            &format!("{}-{:03}", Self::prefix(), seq),
            input.header.clone(),
            input.items.clone(),
            TransactionStatus::Draft,
        );
        tx.notes = input.notes.clone();
        tx.author_id = Some(author.clone());
        st.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn update(
        &self,
        id: &TransactionId,
        input: &TransactionInput<H>,
    ) -> Result<Transaction<H>, RemoteError> {
        self.record(Call::Update(id.clone())).await?;

        let mut st = lock(&self.state);
        st.payloads.push(input.clone());
        let index = draft_index(&*st, id)?;
        let tx = &mut st.transactions[index];
        tx.header = input.header.clone();
        tx.items = input.items.clone();
        tx.notes = input.notes.clone();
        Ok(tx.clone())
    }

    async fn submit(&self, id: &TransactionId) -> Result<Transaction<H>, RemoteError> {
        self.record(Call::Submit(id.clone())).await?;

        let mut st = lock(&self.state);
        let index = draft_index(&*st, id)?;
        st.transactions[index].status = TransactionStatus::Pending;
        Ok(st.transactions[index].clone())
    }

    async fn delete(&self, id: &TransactionId) -> Result<(), RemoteError> {
        self.record(Call::Delete(id.clone())).await?;

        let mut st = lock(&self.state);
        let index = draft_index(&*st, id)?;
        st.transactions.remove(index);
        Ok(())
    }
}

/// Fixed reference lists.
pub struct FakeReferences {
    pub suppliers: Vec<Supplier>,
    items: Mutex<Vec<Item>>,
    pub users: Vec<User>,
    item_fetches: AtomicUsize,
}

impl FakeReferences {
    pub fn new(suppliers: Vec<Supplier>, items: Vec<Item>, users: Vec<User>) -> Self {
        Self {
            suppliers,
            items: Mutex::new(items),
            users,
            item_fetches: AtomicUsize::new(0),
        }
    }

    pub fn items(&self) -> Vec<Item> {
        lock(&self.items).clone()
    }

    /// Changes an item's stock as the warehouse would after a movement.
    pub fn set_stock(&self, id: &str, stock: i64) {
        let mut items = lock(&self.items);
        if let Some(item) = items.iter_mut().find(|i| i.id.as_str() == id) {
            item.stock = Some(stock);
            item.current_stock = None;
        }
    }

    pub fn item_fetches(&self) -> usize {
        self.item_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceProvider for FakeReferences {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RemoteError> {
        Ok(self.suppliers.clone())
    }

    async fn list_items(&self) -> Result<Vec<Item>, RemoteError> {
        self.item_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.items())
    }

    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        Ok(self.users.clone())
    }
}

// ==================== Fixtures ====================

pub fn transaction<H>(
    id: &str,
    number: &str,
    header: H,
    items: Vec<TransactionItem>,
    status: TransactionStatus,
) -> Transaction<H> {
    Transaction {
        id: TransactionId::from(id),
        number: number.to_string(),
        status,
        header,
        items,
        notes: None,
        author_id: Some(UserId::from("U1")),
        created_at: Some(Utc::now()),
        approved_by: None,
        approved_at: None,
        signature_image: None,
        rejection_reason: None,
    }
}

pub fn line(item_id: &str, quantity: u32) -> TransactionItem {
    TransactionItem::new(item_id, quantity)
}

pub fn item(id: &str, name: &str, stock: i64) -> Item {
    Item {
        id: ItemId::from(id),
        name: name.to_string(),
        code: Some(format!("{}-CODE", id)),
        sku: None,
        stock: Some(stock),
        current_stock: None,
    }
}

pub fn supplier(id: &str, name: &str) -> Supplier {
    Supplier {
        id: SupplierId::from(id),
        name: name.to_string(),
        code: None,
    }
}

pub fn user(id: &str, name: &str, role: &str) -> User {
    User {
        id: UserId::from(id),
        name: name.to_string(),
        email: None,
        role: Some(role.to_string()),
    }
}

/// Acme supplier, cable stocked at 10, tape stocked at 4, a clerk and the
/// head of warehouse.
pub fn warehouse_references() -> FakeReferences {
    FakeReferences::new(
        vec![supplier("S1", "Acme Supplies")],
        vec![item("I1", "Network Cable", 10), item("I2", "Packing Tape", 4)],
        vec![
            user("U1", "Wira Clerk", "warehouse_staff"),
            user("U9", "Hana Head", "head_of_warehouse"),
        ],
    )
}

pub fn staff() -> Actor {
    Actor::new("U1", Role::WarehouseStaff)
}

/// A controller wired to a fresh fake server with the list already loaded.
pub struct TestDesk<H: TransactionHeader> {
    pub server: Arc<FakeServer<H>>,
    pub provider: Arc<FakeReferences>,
    pub references: Arc<ReferenceCache>,
    pub events: EventSender,
    pub controller: LifecycleController<H>,
}

impl<H: TransactionHeader> TestDesk<H> {
    pub async fn new() -> Self {
        Self::with_server(FakeServer::new()).await
    }

    pub async fn with_server(server: Arc<FakeServer<H>>) -> Self {
        let provider = Arc::new(warehouse_references());
        let data = ReferenceData::from_lists(
            provider.suppliers.clone(),
            provider.items(),
            provider.users.clone(),
        );
        let references = Arc::new(ReferenceCache::with_data(provider.clone(), data));
        let events = EventSender::new(16);
        let api: Arc<dyn TransactionApi<H>> = server.clone();
        let controller =
            LifecycleController::new(api, references.clone(), staff(), events.clone())
                .expect("warehouse staff may open every transaction screen");
        controller.refresh().await.expect("initial list load");

        Self {
            server,
            provider,
            references,
            events,
            controller,
        }
    }
}

/// Yields until the controller reports a mutation in flight.
pub async fn wait_for_in_flight<H: TransactionHeader>(controller: &LifecycleController<H>) {
    for _ in 0..1_000 {
        if controller.snapshot().in_flight.is_some() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("mutation never started");
}
