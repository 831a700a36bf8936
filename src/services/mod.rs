// Data access
pub mod api;
pub mod http;
pub mod reference;

// Draft editing and lifecycle control
pub mod draft;
pub mod lifecycle;

// Read-side helpers
pub mod search;
pub mod views;

pub use api::{ReferenceProvider, TransactionApi};
pub use draft::{Draft, PendingLine};
pub use http::{ApiClient, HttpReferenceProvider, HttpTransactionApi};
pub use lifecycle::{
    ConfirmTarget, InFlight, LifecycleController, Mode, Notice, NoticeLevel, Snapshot,
};
pub use reference::{ReferenceCache, ReferenceData};
pub use views::{LineView, OutcomeView, TransactionView};
