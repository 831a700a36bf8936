// Core models
pub mod ids;
pub mod kinds;
pub mod reference;
pub mod transaction;

pub use ids::{ItemId, SupplierId, TransactionId, UserId};
pub use kinds::{
    HeaderField, IncomingGoods, IncomingGoodsHeader, IncomingGoodsInput, KindConfig,
    OutgoingGoods, OutgoingGoodsHeader, OutgoingGoodsInput, PurchaseOrder, PurchaseOrderHeader,
    PurchaseOrderInput, SearchField, TransactionHeader, TransactionKind,
};
pub use reference::{Item, Supplier, User};
pub use transaction::{
    date_only, ApprovalOutcome, SignatureImage, Transaction, TransactionInput, TransactionItem,
    TransactionStatus,
};
