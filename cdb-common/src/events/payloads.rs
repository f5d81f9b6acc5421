//! Value types carried inside domain events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A category reference (event type, theme, facility)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub label: String,
}

impl Category {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Reference to the place an event happens at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    /// Legacy id of the place
    pub id: String,
    pub name: String,
}

/// Contact information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPoint {
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Booking information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
    pub url_label: Option<String>,
    pub availability_starts: Option<DateTime<Utc>>,
    pub availability_ends: Option<DateTime<Utc>>,
}

impl BookingInfo {
    /// Booking period, only when both ends are known
    pub fn period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.availability_starts, self.availability_ends) {
            (Some(starts), Some(ends)) => Some((starts, ends)),
            _ => None,
        }
    }
}

/// Image registered with the media store
///
/// `id` is content-addressed: a pure function of the normalized
/// `source_location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub mime_type: String,
    pub description: String,
    pub copyright_holder: String,
    pub source_location: String,
}
