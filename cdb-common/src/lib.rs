//! # CDB Common Library
//!
//! Shared code for the legacy/aggregate bridge including:
//! - Error and result types
//! - Configuration loading (TOML + environment overrides)
//! - Identifiers for legacy records and local aggregates
//! - Domain messages, credential context and the event bus
//! - Labels with case-insensitive identity
//! - UUID helpers

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod ids;
pub mod label;
pub mod uuid_utils;

pub use credentials::{ConsumerCredentials, CredentialContext, TokenCredentials};
pub use error::{Error, Result};
pub use ids::{AggregateKind, ExternalId, RecordKind};
pub use label::{Label, LabelSet};
