use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::errors::Operation;
use crate::models::TransactionKind;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref TRANSACTION_MUTATIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "stockdesk_transaction_mutations_total",
            "Remote transaction mutations by kind, operation and outcome"
        ),
        &["kind", "operation", "outcome"]
    ));
    static ref VALIDATION_FAILURES: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "stockdesk_validation_failures_total",
            "Draft validation failures caught before reaching the server"
        ),
        &["kind", "reason"]
    ));
}

fn register(counter: prometheus::Result<IntCounterVec>) -> IntCounterVec {
    let counter = counter.expect("metric can be created");
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        error!("Failed to register metric: {}", e);
    }
    counter
}

pub fn record_mutation(kind: TransactionKind, operation: Operation, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    TRANSACTION_MUTATIONS
        .with_label_values(&[kind.as_ref(), operation.as_ref(), outcome])
        .inc();
}

pub fn record_validation_failure(kind: TransactionKind, reason: &str) {
    VALIDATION_FAILURES
        .with_label_values(&[kind.as_ref(), reason])
        .inc();
}

pub fn mutation_count(kind: TransactionKind, operation: Operation, success: bool) -> u64 {
    let outcome = if success { "success" } else { "failure" };
    TRANSACTION_MUTATIONS
        .with_label_values(&[kind.as_ref(), operation.as_ref(), outcome])
        .get()
}

/// Renders all metrics in the Prometheus text format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
