//! Content-addressable media import

pub mod identity;
pub mod importer;
pub mod normalize;
pub mod store;

pub use identity::{derive_asset_id, IdentityScheme};
pub use importer::{mime_type_for, ImageCollection, MediaImporter};
pub use normalize::{normalize_uri, NormalizeError};
pub use store::{MediaStore, SqliteMediaStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    InvalidUri(#[from] NormalizeError),

    #[error("Invalid identifier pattern: {0}")]
    InvalidPattern(String),

    #[error("Media store error: {0}")]
    Store(#[from] sqlx::Error),
}
