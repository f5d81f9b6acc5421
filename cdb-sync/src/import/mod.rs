//! Reconciliation of legacy records into local aggregates

pub mod importer;
pub mod save_loop;

pub use importer::{DependencyImporter, ImportError, ImportOutcome, ReconciliationImporter};
pub use save_loop::{save_with_retry, RetryPolicy, SaveError};
