//! Hermes and skill-specific message formats.
//!
//! Outbound messages know their topic and encode their own payload.
//! Inbound messages are decoded from `(topic, payload)` pairs; anything the
//! skill does not handle is reported as [`MessageError::UnknownTopic`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{MessageError, TransportError};
use crate::types::{AlarmRecord, RingId, SiteId};

pub const END_SESSION: &str = "hermes/dialogueManager/endSession";
pub const CONTINUE_SESSION: &str = "hermes/dialogueManager/continueSession";
pub const START_SESSION: &str = "hermes/dialogueManager/startSession";
pub const STOP_LISTENING: &str = "hermes/asr/stopListening";
pub const SESSION_STARTED: &str = "hermes/dialogueManager/sessionStarted";
pub const SESSION_ENDED: &str = "hermes/dialogueManager/sessionEnded";
pub const RINGING_STARTED: &str = "external/alarmclock/ringingStarted";
pub const RINGING_STOPPED: &str = "external/alarmclock/ringingStopped";
pub const NEW_ALARM: &str = "external/alarmclock/newAlarm";
pub const SUNRISE_START: &str = "external/alarmclock/sunriseStart";
pub const STOP_RINGING: &str = "external/alarmclock/stopRinging";

/// Topic filters the skill subscribes to.
pub fn subscriptions() -> Vec<String> {
    vec![
        "hermes/intent/+".to_string(),
        "hermes/hotword/+/detected".to_string(),
        "hermes/audioServer/+/playFinished".to_string(),
        SESSION_STARTED.to_string(),
        SESSION_ENDED.to_string(),
        STOP_RINGING.to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSession {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueSession {
    pub session_id: String,
    pub text: String,
    pub intent_filter: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub site_id: SiteId,
    pub init: SessionInit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionInit {
    /// Speak `text` and listen for one of the filtered intents.
    #[serde(rename_all = "camelCase")]
    Action {
        text: String,
        can_be_enqueued: bool,
        intent_filter: Vec<String>,
        send_intent_not_recognized: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StopReason {
    /// Stopped by the hotword.
    Acknowledged,
    /// Rang out without acknowledgement.
    Timeout,
    /// Stopped through `external/alarmclock/stopRinging`.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingingStopped {
    #[serde(flatten)]
    pub alarm: AlarmRecord,
    pub reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopListening {
    pub site_id: SiteId,
    pub session_id: String,
}

/// Lead-in for wake-up lights, sent once per alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SunriseStart {
    pub site_id: SiteId,
    /// Whole minutes until the alarm rings.
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAlarmNotice {
    pub new: AlarmRecord,
    pub all: Vec<AlarmRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    EndSession(EndSession),
    ContinueSession(ContinueSession),
    StartSession(StartSession),
    StopListening(StopListening),
    PlayBytes {
        site_id: SiteId,
        ring_id: RingId,
        wav: Bytes,
    },
    RingingStarted(AlarmRecord),
    RingingStopped(RingingStopped),
    NewAlarm(NewAlarmNotice),
    SunriseStart(SunriseStart),
}

impl Outbound {
    /// End a session, optionally with a closing utterance.
    pub fn end_session(session_id: impl Into<String>, text: Option<String>) -> Self {
        Outbound::EndSession(EndSession {
            session_id: session_id.into(),
            text,
        })
    }

    pub fn topic(&self) -> String {
        match self {
            Outbound::EndSession(_) => END_SESSION.to_string(),
            Outbound::ContinueSession(_) => CONTINUE_SESSION.to_string(),
            Outbound::StartSession(_) => START_SESSION.to_string(),
            Outbound::StopListening(_) => STOP_LISTENING.to_string(),
            Outbound::PlayBytes {
                site_id, ring_id, ..
            } => format!("hermes/audioServer/{site_id}/playBytes/{ring_id}"),
            Outbound::RingingStarted(_) => RINGING_STARTED.to_string(),
            Outbound::RingingStopped(_) => RINGING_STOPPED.to_string(),
            Outbound::NewAlarm(_) => NEW_ALARM.to_string(),
            Outbound::SunriseStart(_) => SUNRISE_START.to_string(),
        }
    }

    pub fn payload(&self) -> Result<Bytes, TransportError> {
        let json = match self {
            Outbound::EndSession(m) => serde_json::to_vec(m)?,
            Outbound::ContinueSession(m) => serde_json::to_vec(m)?,
            Outbound::StartSession(m) => serde_json::to_vec(m)?,
            Outbound::StopListening(m) => serde_json::to_vec(m)?,
            Outbound::PlayBytes { wav, .. } => return Ok(wav.clone()),
            Outbound::RingingStarted(m) => serde_json::to_vec(m)?,
            Outbound::RingingStopped(m) => serde_json::to_vec(m)?,
            Outbound::NewAlarm(m) => serde_json::to_vec(m)?,
            Outbound::SunriseStart(m) => serde_json::to_vec(m)?,
        };
        Ok(Bytes::from(json))
    }
}

/// Intents the skill registers, by name after the `<namespace>:` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum IntentKind {
    NewAlarm,
    GetAlarms,
    GetNextAlarm,
    GetMissedAlarms,
    DeleteAlarms,
    ConfirmAlarm,
    AnswerAlarm,
}

impl IntentKind {
    /// Full intent name as used in topics and intent filters.
    pub fn qualified(self, namespace: &str) -> String {
        format!("{namespace}:{self}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Grain {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    #[serde(other)]
    Other,
}

impl Grain {
    /// Whether a time with this grain names a point in the day rather
    /// than a whole day or longer.
    pub fn is_time_of_day(self) -> bool {
        matches!(self, Grain::Hour | Grain::Minute | Grain::Second)
    }
}

/// Slot value as delivered by the NLU.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind")]
pub enum SlotValue {
    InstantTime {
        value: String,
        #[serde(default)]
        grain: Option<Grain>,
    },
    TimeInterval {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
    Duration {
        #[serde(default)]
        days: i64,
        #[serde(default)]
        hours: i64,
        #[serde(default)]
        minutes: i64,
        #[serde(default)]
        seconds: i64,
    },
    Custom {
        value: String,
    },
    #[serde(other)]
    Other,
}

impl SlotValue {
    /// Total length of a duration slot in whole minutes.
    pub fn duration_minutes(&self) -> Option<i64> {
        match *self {
            SlotValue::Duration {
                days,
                hours,
                minutes,
                seconds,
            } => Some(days * 24 * 60 + hours * 60 + minutes + seconds / 60),
            _ => None,
        }
    }

    pub fn custom(&self) -> Option<&str> {
        match self {
            SlotValue::Custom { value } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub slot_name: String,
    pub value: SlotValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentName {
    pub intent_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMessage {
    pub session_id: String,
    pub site_id: SiteId,
    #[serde(default)]
    pub custom_data: Option<String>,
    pub intent: IntentName,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl IntentMessage {
    pub fn slot(&self, name: &str) -> Option<&SlotValue> {
        self.slots
            .iter()
            .find(|s| s.slot_name == name)
            .map(|s| &s.value)
    }

    /// Value of a custom-entity slot.
    pub fn custom_slot(&self, name: &str) -> Option<&str> {
        self.slot(name).and_then(SlotValue::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteOnly {
    site_id: SiteId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayFinished {
    id: String,
    site_id: SiteId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionNotice {
    session_id: String,
    site_id: SiteId,
    #[serde(default)]
    custom_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Hotword {
        site_id: SiteId,
    },
    PlayFinished {
        site_id: SiteId,
        ring_id: RingId,
    },
    SessionStarted {
        site_id: SiteId,
        session_id: String,
        custom_data: Option<String>,
    },
    SessionEnded {
        site_id: SiteId,
        session_id: String,
        custom_data: Option<String>,
    },
    Intent {
        kind: IntentKind,
        message: IntentMessage,
    },
    StopRinging {
        site_id: SiteId,
    },
}

impl Inbound {
    /// Decode a message received on `topic`.
    ///
    /// Intents outside `namespace` count as unknown topics.
    pub fn parse(topic: &str, payload: &[u8], namespace: &str) -> Result<Inbound, MessageError> {
        let segments: Vec<&str> = topic.split('/').collect();
        let unknown = || MessageError::UnknownTopic(topic.to_string());

        match segments.as_slice() {
            ["hermes", "hotword", _, "detected"] => {
                let m: SiteOnly = decode(topic, payload)?;
                Ok(Inbound::Hotword { site_id: m.site_id })
            }
            ["hermes", "audioServer", _, "playFinished"] => {
                let m: PlayFinished = decode(topic, payload)?;
                Ok(Inbound::PlayFinished {
                    site_id: m.site_id,
                    ring_id: RingId::from(m.id.as_str()),
                })
            }
            ["hermes", "dialogueManager", "sessionStarted"] => {
                let m: SessionNotice = decode(topic, payload)?;
                Ok(Inbound::SessionStarted {
                    site_id: m.site_id,
                    session_id: m.session_id,
                    custom_data: m.custom_data,
                })
            }
            ["hermes", "dialogueManager", "sessionEnded"] => {
                let m: SessionNotice = decode(topic, payload)?;
                Ok(Inbound::SessionEnded {
                    site_id: m.site_id,
                    session_id: m.session_id,
                    custom_data: m.custom_data,
                })
            }
            ["hermes", "intent", name] => {
                let kind = name
                    .strip_prefix(namespace)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .and_then(|intent| intent.parse::<IntentKind>().ok())
                    .ok_or_else(unknown)?;
                let message: IntentMessage = decode(topic, payload)?;
                Ok(Inbound::Intent { kind, message })
            }
            ["external", "alarmclock", "stopRinging"] => {
                let m: SiteOnly = decode(topic, payload)?;
                Ok(Inbound::StopRinging { site_id: m.site_id })
            }
            _ => Err(unknown()),
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(topic: &str, payload: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(payload).map_err(|source| MessageError::Payload {
        topic: topic.to_string(),
        source,
    })
}
