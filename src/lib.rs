//! Stockdesk client library
//!
//! Lifecycle control for warehouse inventory transactions (incoming goods,
//! outgoing goods and purchase orders) on top of a remote REST API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod models;
pub mod services;

pub use auth::{Actor, Role, Screen};
pub use errors::{Operation, RemoteError, ServiceError, ServiceResult, ValidationError};
pub use models::{
    IncomingGoods, IncomingGoodsHeader, OutgoingGoods, OutgoingGoodsHeader, PurchaseOrder,
    PurchaseOrderHeader, Transaction, TransactionHeader, TransactionKind, TransactionStatus,
};
pub use services::{LifecycleController, ReferenceCache};

/// Controllers for the three transaction kinds.
pub type IncomingGoodsController = LifecycleController<IncomingGoodsHeader>;
pub type OutgoingGoodsController = LifecycleController<OutgoingGoodsHeader>;
pub type PurchaseOrderController = LifecycleController<PurchaseOrderHeader>;
