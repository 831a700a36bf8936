/*!
 * # Transaction Lifecycle Controller
 *
 * One controller per transaction kind drives the draft form, the two-phase
 * submit/delete confirmations and the cached transaction list. Transitions
 * beyond creation are performed by the server; the controller only calls the
 * remote layer and refetches.
 *
 * Only one mutation may be in flight per controller. Closing the form while a
 * save is in flight does not cancel the call: a late success still refreshes
 * the list but is never applied to a form session that no longer exists.
 */

use chrono::Local;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, instrument, warn};

use super::api::TransactionApi;
use super::draft::{Draft, PendingLine};
use super::reference::ReferenceCache;
use super::search;
use super::views::{LineView, TransactionView};
use crate::auth::{authorize, Actor};
use crate::errors::{Operation, RemoteError, ServiceError, ServiceResult, ValidationError};
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::{ItemId, Transaction, TransactionHeader, TransactionId, TransactionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "id", rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Creating,
    Editing(TransactionId),
    Viewing(TransactionId),
}

/// The single armed confirmation, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "id", rename_all = "snake_case")]
pub enum ConfirmTarget {
    Submit(TransactionId),
    Delete(TransactionId),
}

impl ConfirmTarget {
    pub fn id(&self) -> &TransactionId {
        match self {
            Self::Submit(id) | Self::Delete(id) => id,
        }
    }

    fn operation(&self) -> Operation {
        match self {
            Self::Submit(_) => Operation::Submit,
            Self::Delete(_) => Operation::Delete,
        }
    }
}

/// The mutation currently awaiting the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub operation: Operation,
    pub target: Option<TransactionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// User-visible message produced by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Read-only copy of the controller state for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<H> {
    pub kind: TransactionKind,
    pub mode: Mode,
    pub draft: Option<Draft<H>>,
    pub pending_line: PendingLine,
    pub confirm_target: Option<ConfirmTarget>,
    pub in_flight: Option<InFlight>,
    pub loading: bool,
    pub transactions: Vec<Transaction<H>>,
    pub notices: Vec<Notice>,
}

struct State<H> {
    mode: Mode,
    draft: Option<Draft<H>>,
    /// Bumped whenever a form is opened or closed.
    session: u64,
    pending_line: PendingLine,
    confirm: Option<ConfirmTarget>,
    in_flight: Option<InFlight>,
    loading: usize,
    transactions: Vec<Transaction<H>>,
    notices: Vec<Notice>,
}

impl<H: TransactionHeader> State<H> {
    fn new() -> Self {
        Self {
            mode: Mode::Idle,
            draft: None,
            session: 0,
            pending_line: PendingLine::default(),
            confirm: None,
            in_flight: None,
            loading: 0,
            transactions: Vec::new(),
            notices: Vec::new(),
        }
    }

    fn find(&self, id: &TransactionId) -> Option<&Transaction<H>> {
        self.transactions.iter().find(|tx| &tx.id == id)
    }

    /// Fast-fail lifecycle check against the loaded list. Ids the list does
    /// not know yet are left for the server to accept or reject.
    fn check_draft(&self, id: &TransactionId) -> ServiceResult<()> {
        match self.find(id) {
            Some(tx) if !tx.status.is_draft() => Err(ServiceError::InvalidState {
                id: id.clone(),
                status: tx.status,
            }),
            _ => Ok(()),
        }
    }

    fn open_form(&mut self, mode: Mode, draft: Draft<H>) {
        self.session = self.session.wrapping_add(1);
        self.mode = mode;
        self.draft = Some(draft);
        self.pending_line = PendingLine::default();
    }

    fn close_form(&mut self) {
        self.session = self.session.wrapping_add(1);
        self.mode = Mode::Idle;
        self.draft = None;
        self.pending_line = PendingLine::default();
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }

    fn fail(&mut self, err: ServiceError, verb: &str) -> ServiceError {
        match &err {
            ServiceError::InvalidState { .. } => self.notify(
                NoticeLevel::Warning,
                format!("Only draft {} can be {}", label_plural::<H>(), verb),
            ),
            ServiceError::Validation(v) => {
                metrics::record_validation_failure(H::CONFIG.kind, v.reason());
                self.notify(NoticeLevel::Error, validation_notice(v));
            }
            other => self.notify(NoticeLevel::Error, other.to_string()),
        }
        err
    }
}

fn label_lower<H: TransactionHeader>() -> String {
    H::CONFIG.label.to_lowercase()
}

fn label_plural<H: TransactionHeader>() -> String {
    format!("{}s", label_lower::<H>())
}

fn validation_notice(err: &ValidationError) -> String {
    match err {
        ValidationError::MissingField { .. } | ValidationError::EmptyItems => {
            "Please fill all required fields and add at least one item".to_string()
        }
        ValidationError::MissingItem
        | ValidationError::NonPositiveQuantity { .. }
        | ValidationError::QuantityTooLarge { .. } => {
            "Please select an item and enter a valid quantity".to_string()
        }
        ValidationError::DuplicateItem { .. } => "Item already added".to_string(),
        ValidationError::InsufficientStock { .. } => err.to_string(),
    }
}

pub struct LifecycleController<H: TransactionHeader> {
    api: Arc<dyn TransactionApi<H>>,
    references: Arc<ReferenceCache>,
    actor: Actor,
    events: EventSender,
    state: Arc<Mutex<State<H>>>,
}

impl<H: TransactionHeader> std::fmt::Debug for LifecycleController<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController").finish_non_exhaustive()
    }
}

impl<H: TransactionHeader> Clone for LifecycleController<H> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            references: self.references.clone(),
            actor: self.actor.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
        }
    }
}

impl<H: TransactionHeader> LifecycleController<H> {
    /// Opens a controller for `actor`, who must be allowed on the kind's screen.
    pub fn new(
        api: Arc<dyn TransactionApi<H>>,
        references: Arc<ReferenceCache>,
        actor: Actor,
        events: EventSender,
    ) -> ServiceResult<Self> {
        authorize(&actor, H::CONFIG.screen)?;
        Ok(Self {
            api,
            references,
            actor,
            events,
            state: Arc::new(Mutex::new(State::new())),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> TransactionKind {
        H::CONFIG.kind
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn references(&self) -> &Arc<ReferenceCache> {
        &self.references
    }

    pub fn snapshot(&self) -> Snapshot<H> {
        let st = self.lock();
        Snapshot {
            kind: H::CONFIG.kind,
            mode: st.mode.clone(),
            draft: st.draft.clone(),
            pending_line: st.pending_line.clone(),
            confirm_target: st.confirm.clone(),
            in_flight: st.in_flight.clone(),
            loading: st.loading > 0,
            transactions: st.transactions.clone(),
            notices: st.notices.clone(),
        }
    }

    /// Drains the notices raised since the last call.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.lock().notices)
    }

    pub fn transactions(&self) -> Vec<Transaction<H>> {
        self.lock().transactions.clone()
    }

    pub fn find(&self, id: &TransactionId) -> Option<Transaction<H>> {
        self.lock().find(id).cloned()
    }

    /// Transactions that still accept edit, submit and delete.
    pub fn editable(&self) -> Vec<Transaction<H>> {
        self.lock()
            .transactions
            .iter()
            .filter(|tx| tx.is_editable())
            .cloned()
            .collect()
    }

    /// Filters the loaded list; never touches the server.
    pub fn search(&self, query: &str) -> Vec<Transaction<H>> {
        let st = self.lock();
        search::filter_transactions(&st.transactions, query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Refetches the transaction list. The last completed fetch wins.
    #[instrument(skip(self), fields(kind = %H::CONFIG.kind))]
    pub async fn refresh(&self) -> ServiceResult<()> {
        self.lock().loading += 1;
        let result = self.api.list().await;

        let mut st = self.lock();
        st.loading = st.loading.saturating_sub(1);
        match result {
            Ok(transactions) => {
                debug!(count = transactions.len(), "transaction list refreshed");
                for tx in &transactions {
                    let Some(previous) = st.find(&tx.id) else {
                        continue;
                    };
                    if previous.status != tx.status && !previous.status.can_transition_to(tx.status)
                    {
                        warn!(id = %tx.id, from = %previous.status, to = %tx.status, "unexpected status change");
                    }
                }
                st.transactions = transactions;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load transactions");
                st.notify(
                    NoticeLevel::Error,
                    format!("Failed to load {}: {}", label_plural::<H>(), e),
                );
                Err(e.into())
            }
        }
    }

    /// Refetches the list and the shared reference data. Failures keep the
    /// previous snapshots.
    async fn refresh_after_mutation(&self) {
        let (list, references) = tokio::join!(self.refresh(), self.references.refresh());
        if let Err(e) = list {
            warn!(error = %e, "list refresh after mutation failed");
        }
        if let Err(e) = references {
            warn!(error = %e, "reference refresh after mutation failed");
        }
    }

    pub fn start_create(&self) {
        let today = Local::now().date_naive();
        self.lock().open_form(Mode::Creating, Draft::blank(today));
    }

    /// Opens the form on a copy of `tx`. Only drafts can be edited.
    pub fn start_edit(&self, tx: &Transaction<H>) -> ServiceResult<()> {
        let mut st = self.lock();
        if !tx.status.is_draft() {
            let err = ServiceError::InvalidState {
                id: tx.id.clone(),
                status: tx.status,
            };
            return Err(st.fail(err, "edited"));
        }
        st.open_form(Mode::Editing(tx.id.clone()), Draft::from_transaction(tx));
        Ok(())
    }

    pub fn start_edit_by_id(&self, id: &TransactionId) -> ServiceResult<()> {
        let tx = self
            .find(id)
            .ok_or_else(|| ServiceError::NotFound(format!("{} {}", label_lower::<H>(), id)))?;
        self.start_edit(&tx)
    }

    /// Read-only view; any open form is discarded.
    pub fn start_view(&self, tx: &Transaction<H>) {
        let mut st = self.lock();
        st.close_form();
        st.mode = Mode::Viewing(tx.id.clone());
    }

    /// Projection of the transaction currently being viewed.
    pub fn view(&self) -> Option<TransactionView<H>> {
        let refs = self.references.snapshot();
        let st = self.lock();
        match &st.mode {
            Mode::Viewing(id) => st.find(id).map(|tx| TransactionView::build(tx, &refs)),
            _ => None,
        }
    }

    pub fn view_of(&self, id: &TransactionId) -> Option<TransactionView<H>> {
        let refs = self.references.snapshot();
        let st = self.lock();
        st.find(id).map(|tx| TransactionView::build(tx, &refs))
    }

    pub fn edit_header(&self, edit: impl FnOnce(&mut H)) -> ServiceResult<()> {
        let mut st = self.lock();
        let draft = st.draft.as_mut().ok_or(ServiceError::NoActiveDraft)?;
        edit(&mut draft.header);
        Ok(())
    }

    pub fn set_notes(&self, notes: impl Into<String>) -> ServiceResult<()> {
        let mut st = self.lock();
        let draft = st.draft.as_mut().ok_or(ServiceError::NoActiveDraft)?;
        draft.notes = notes.into();
        Ok(())
    }

    pub fn set_pending_line(&self, item_id: impl Into<ItemId>, quantity: i64) {
        self.lock().pending_line = PendingLine {
            item_id: item_id.into(),
            quantity,
        };
    }

    /// Adds the line currently held in the item picker.
    pub fn add_pending_line(&self) -> ServiceResult<()> {
        let pending = self.lock().pending_line.clone();
        self.add_line(&pending.item_id, pending.quantity)
    }

    /// Appends a line to the open draft. Outgoing goods may not exceed the
    /// item's current stock.
    pub fn add_line(&self, item_id: &ItemId, quantity: i64) -> ServiceResult<()> {
        let refs = self.references.snapshot();
        let available = H::CONFIG.stock_check.then(|| refs.stock_of(item_id));

        let mut st = self.lock();
        let draft = st.draft.as_mut().ok_or(ServiceError::NoActiveDraft)?;
        match draft.add_line(item_id, quantity, available) {
            Ok(()) => {
                st.pending_line = PendingLine::default();
                Ok(())
            }
            Err(e) => {
                debug!(item_id = %item_id, quantity, reason = e.reason(), "line rejected");
                Err(st.fail(e.into(), "edited"))
            }
        }
    }

    /// Removes a line; absent items are ignored.
    pub fn remove_line(&self, item_id: &ItemId) -> bool {
        self.lock()
            .draft
            .as_mut()
            .map(|draft| draft.remove_line(item_id))
            .unwrap_or(false)
    }

    /// Lines of the open draft with names, stock and over-stock flags.
    pub fn draft_lines(&self) -> Vec<LineView> {
        let refs = self.references.snapshot();
        let st = self.lock();
        st.draft
            .as_ref()
            .map(|draft| {
                draft
                    .items
                    .iter()
                    .map(|line| LineView::build(line, &refs, H::CONFIG.stock_check))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validates the draft and creates or updates it remotely.
    ///
    /// On success the form closes (if it is still the same form) and the list
    /// is refetched. On failure the draft is left untouched for a retry.
    #[instrument(skip(self), fields(kind = %H::CONFIG.kind))]
    pub async fn save(&self) -> ServiceResult<Transaction<H>> {
        let (session, operation, target, input) = {
            let mut st = self.lock();
            if let Some(in_flight) = &st.in_flight {
                return Err(ServiceError::MutationInFlight(in_flight.operation));
            }
            let target = match &st.mode {
                Mode::Creating => None,
                Mode::Editing(id) => Some(id.clone()),
                Mode::Idle | Mode::Viewing(_) => return Err(ServiceError::NoActiveDraft),
            };
            let (validation, input) = match &st.draft {
                Some(draft) => (draft.validate(), draft.to_input()),
                None => return Err(ServiceError::NoActiveDraft),
            };
            if let Err(e) = validation {
                return Err(st.fail(e.into(), "saved"));
            }
            if let Some(id) = &target {
                if let Err(e) = st.check_draft(id) {
                    return Err(st.fail(e, "edited"));
                }
            }
            let operation = if target.is_some() {
                Operation::Update
            } else {
                Operation::Create
            };
            st.in_flight = Some(InFlight {
                operation,
                target: target.clone(),
            });
            (st.session, operation, target, input)
        };

        let result = match &target {
            None => self.api.create(&input, &self.actor.id).await,
            Some(id) => self.api.update(id, &input).await,
        };
        metrics::record_mutation(H::CONFIG.kind, operation, result.is_ok());

        {
            let mut st = self.lock();
            st.in_flight = None;
            match &result {
                Ok(tx) => {
                    info!(id = %tx.id, number = %tx.number, %operation, "transaction saved");
                    if st.session == session {
                        st.close_form();
                    } else {
                        debug!(id = %tx.id, "form closed before save completed");
                    }
                    st.notify(NoticeLevel::Success, success_message::<H>(operation));
                }
                Err(e) => {
                    error!(error = %e, %operation, "failed to save transaction");
                    st.notify(
                        NoticeLevel::Error,
                        format!("Failed to save {}: {}", label_lower::<H>(), e),
                    );
                }
            }
        }

        let tx = result?;
        self.events.send(Event::transactions_changed(
            H::CONFIG.kind,
            Some(tx.id.clone()),
            operation,
        ));
        self.refresh_after_mutation().await;
        Ok(tx)
    }

    /// Arms the submit confirmation for a draft.
    pub fn request_submit(&self, id: &TransactionId) -> ServiceResult<()> {
        self.arm(ConfirmTarget::Submit(id.clone()))
    }

    /// Arms the delete confirmation for a draft.
    pub fn request_delete(&self, id: &TransactionId) -> ServiceResult<()> {
        self.arm(ConfirmTarget::Delete(id.clone()))
    }

    fn arm(&self, target: ConfirmTarget) -> ServiceResult<()> {
        let mut st = self.lock();
        if let Err(e) = st.check_draft(target.id()) {
            return Err(st.fail(e, verb_for(target.operation())));
        }
        st.confirm = Some(target);
        Ok(())
    }

    /// Submits the armed draft for approval.
    #[instrument(skip(self), fields(kind = %H::CONFIG.kind))]
    pub async fn confirm_submit(&self) -> ServiceResult<Transaction<H>> {
        let id = self.begin_confirmed(Operation::Submit)?;
        let result = self.api.submit(&id).await;
        self.finish_confirmed(Operation::Submit, &id, result.as_ref().map(|_| ()));

        let tx = result?;
        self.events.send(Event::transactions_changed(
            H::CONFIG.kind,
            Some(id),
            Operation::Submit,
        ));
        self.refresh_after_mutation().await;
        Ok(tx)
    }

    /// Deletes the armed draft.
    #[instrument(skip(self), fields(kind = %H::CONFIG.kind))]
    pub async fn confirm_delete(&self) -> ServiceResult<()> {
        let id = self.begin_confirmed(Operation::Delete)?;
        let result = self.api.delete(&id).await;
        self.finish_confirmed(Operation::Delete, &id, result.as_ref().map(|_| ()));

        result?;
        self.events.send(Event::transactions_changed(
            H::CONFIG.kind,
            Some(id),
            Operation::Delete,
        ));
        self.refresh_after_mutation().await;
        Ok(())
    }

    fn begin_confirmed(&self, operation: Operation) -> ServiceResult<TransactionId> {
        let mut st = self.lock();
        if let Some(in_flight) = &st.in_flight {
            return Err(ServiceError::MutationInFlight(in_flight.operation));
        }
        let id = match &st.confirm {
            Some(target) if target.operation() == operation => target.id().clone(),
            _ => return Err(ServiceError::NothingToConfirm),
        };
        if let Err(e) = st.check_draft(&id) {
            st.confirm = None;
            return Err(st.fail(e, verb_for(operation)));
        }
        st.in_flight = Some(InFlight {
            operation,
            target: Some(id.clone()),
        });
        Ok(id)
    }

    fn finish_confirmed(
        &self,
        operation: Operation,
        id: &TransactionId,
        outcome: Result<(), &RemoteError>,
    ) {
        metrics::record_mutation(H::CONFIG.kind, operation, outcome.is_ok());

        let mut st = self.lock();
        st.in_flight = None;
        match outcome {
            Ok(()) => {
                info!(id = %id, %operation, "transaction {}", verb_for(operation));
                let still_armed = st
                    .confirm
                    .as_ref()
                    .map(|t| t.id() == id && t.operation() == operation)
                    .unwrap_or(false);
                if still_armed {
                    st.confirm = None;
                }
                st.notify(NoticeLevel::Success, success_message::<H>(operation));
            }
            Err(e) => {
                error!(id = %id, %operation, error = %e, "remote {} failed", operation);
                st.notify(
                    NoticeLevel::Error,
                    format!(
                        "Failed to {} {}: {}",
                        operation,
                        label_lower::<H>(),
                        e
                    ),
                );
            }
        }
    }

    /// Disarms a pending confirmation, or closes the open form or view
    /// discarding unsaved changes. In-flight calls are not cancelled.
    pub fn cancel(&self) {
        let mut st = self.lock();
        if st.confirm.take().is_some() {
            return;
        }
        if st.mode != Mode::Idle {
            st.close_form();
        }
    }
}

fn success_message<H: TransactionHeader>(operation: Operation) -> String {
    let label = H::CONFIG.label;
    match operation {
        Operation::Create => format!("{} created successfully", label),
        Operation::Update => format!("{} updated successfully", label),
        Operation::Submit => format!("{} submitted for approval", label),
        Operation::Delete => format!("{} deleted successfully", label),
    }
}

fn verb_for(operation: Operation) -> &'static str {
    match operation {
        Operation::Create => "created",
        Operation::Update => "edited",
        Operation::Submit => "submitted",
        Operation::Delete => "deleted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_target_serializes_action_and_id() {
        let target = ConfirmTarget::Delete(TransactionId::from("tx9"));
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            serde_json::json!({ "action": "delete", "id": "tx9" })
        );
        assert_eq!(target.operation(), Operation::Delete);
    }

    #[test]
    fn every_operation_has_its_own_success_message() {
        use crate::models::PurchaseOrderHeader;

        let messages: Vec<String> = [
            Operation::Create,
            Operation::Update,
            Operation::Submit,
            Operation::Delete,
        ]
        .into_iter()
        .map(success_message::<PurchaseOrderHeader>)
        .collect();
        assert_eq!(
            messages,
            [
                "Order created successfully",
                "Order updated successfully",
                "Order submitted for approval",
                "Order deleted successfully",
            ]
        );
    }

    #[test]
    fn validation_notices_mirror_form_messages() {
        assert_eq!(
            validation_notice(&ValidationError::EmptyItems),
            "Please fill all required fields and add at least one item"
        );
        assert_eq!(
            validation_notice(&ValidationError::DuplicateItem {
                item_id: ItemId::from("I1")
            }),
            "Item already added"
        );
    }
}
