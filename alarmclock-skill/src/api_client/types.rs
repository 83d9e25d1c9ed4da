//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};

/// One alarm as the API reports it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AlarmState {
    /// `YYYY-MM-DDTHH:MM`, local time.
    pub datetime: String,
    pub site_id: String,
    pub room: String,
    pub missed: bool,
}

/// Site status.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteState {
    pub site_id: String,
    pub room: String,
    /// `idle`, `ringing`, `awaiting_session` or `awaiting_answer`.
    pub phase: String,
    pub ringing_timeout_secs: u64,
    pub ringtone_enabled: bool,
    /// Alarm being rung, if any.
    pub ringing: Option<AlarmState>,
}
