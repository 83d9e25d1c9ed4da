use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use super::{SiteId, minute};

/// Process-local insertion sequence number.
///
/// Not persisted. Breaks ties between alarms at the same minute and lets
/// callers remove one specific alarm.
pub type AlarmId = u64;

/// A scheduled alarm for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: AlarmId,
    /// Naive local wall-clock time, truncated to the minute.
    pub datetime: PrimitiveDateTime,
    pub site_id: SiteId,
    /// Recurrence descriptor. Carried through persistence, never interpreted.
    pub repetition: Option<String>,
    /// Rang without acknowledgement, or was due while the skill was down.
    pub missed: bool,
    /// Handed to the ring controller. Runtime only.
    pub fired: bool,
}

impl Alarm {
    /// Whether the alarm still waits to ring.
    pub fn is_active(&self) -> bool {
        !self.missed && !self.fired
    }

    pub fn to_record(&self) -> AlarmRecord {
        AlarmRecord {
            datetime: self.datetime,
            site_id: self.site_id.clone(),
            repetition: self.repetition.clone(),
            missed: self.missed,
        }
    }
}

/// Durable form of an [`Alarm`], one JSON object per line in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRecord {
    #[serde(with = "minute::serde_minute")]
    pub datetime: PrimitiveDateTime,
    pub site_id: SiteId,
    #[serde(default)]
    pub repetition: Option<String>,
    #[serde(default)]
    pub missed: bool,
}
