//! Test Helper Utilities
//!
//! Shared utilities for testing cdb-sync
#![allow(dead_code)]

pub mod db_utils;
pub mod legacy_mock;

// Re-export commonly used items
pub use db_utils::{count_events, create_test_db, event_types, get_table_names};
pub use legacy_mock::{actor_xml, envelope, event_xml, LegacyMock, NS};
