//! Core value types.

mod alarm;
pub mod minute;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use alarm::{Alarm, AlarmId, AlarmRecord};

/// Opaque site identifier from the messaging layer (`siteId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Correlation token attached to a ringtone play request.
///
/// The audio server echoes it back in `playFinished`, which is how a
/// finished playback is matched to the request that started it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RingId(String);

impl RingId {
    /// A fresh, random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
