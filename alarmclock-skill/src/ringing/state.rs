/// Per-site phase of the ring/acknowledge cycle.
///
/// ```text
/// Idle -> Ringing -> AwaitingSession -> AwaitingAnswer -> Idle
///            |              |                               ^
///            +- timeout ----+----- no session / no answer --+
/// ```
///
/// Only `Idle` accepts a new alarm. Everything after `Ringing` belongs to
/// the dialogue side and ends by releasing the site back to `Idle`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RingPhase {
    #[default]
    Idle,

    /// Ringtone playing, timeout armed.
    Ringing,

    /// Acknowledged by hotword; waiting for the dialogue manager to open
    /// the session the hotword triggers.
    AwaitingSession,

    /// Snooze question asked; waiting for the answer.
    AwaitingAnswer,
}

impl RingPhase {
    pub fn is_idle(self) -> bool {
        matches!(self, RingPhase::Idle)
    }

    pub fn is_ringing(self) -> bool {
        matches!(self, RingPhase::Ringing)
    }

    /// Acknowledged, with the dialogue not yet finished.
    pub fn in_dialogue(self) -> bool {
        matches!(self, RingPhase::AwaitingSession | RingPhase::AwaitingAnswer)
    }
}
