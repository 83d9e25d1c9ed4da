//! Spoken-intent handlers.
//!
//! Each handler answers through the dialogue manager: `endSession` with a
//! sentence, or `continueSession` when a confirmation is needed. Responses
//! are fixed English sentences.

use std::sync::Arc;

use time::{Date, PrimitiveDateTime};

use crate::bus::messages::{ContinueSession, Grain, NewAlarmNotice, SlotValue};
use crate::bus::{IntentKind, IntentMessage, Outbound, Publisher, publish_all};
use crate::clock::TimeSource;
use crate::dialogue::DialogueCoordinator;
use crate::error::{Error, ValidationError};
use crate::site::{PendingDelete, SiteRegistry};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;
use crate::types::{Alarm, SiteId, minute};

const NOT_UNDERSTOOD: &str = "I'm afraid I didn't understand you.";
const HERE_NOT_CONFIGURED: &str = "This room here hasn't been configured yet.";
const LISTED_AT_MOST: usize = 5;

/// Which alarms a query is about.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TimeFilter {
    Any,
    Exact(PrimitiveDateTime),
    Day(Date),
    Range {
        from: Option<PrimitiveDateTime>,
        to: Option<PrimitiveDateTime>,
    },
}

impl TimeFilter {
    fn matches(&self, dt: PrimitiveDateTime) -> bool {
        match self {
            TimeFilter::Any => true,
            TimeFilter::Exact(at) => dt == *at,
            TimeFilter::Day(day) => dt.date() == *day,
            TimeFilter::Range { from, to } => {
                from.is_none_or(|from| from <= dt) && to.is_none_or(|to| dt <= to)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Filter {
    site: Option<SiteId>,
    time: TimeFilter,
}

impl Filter {
    fn apply(&self, alarms: Vec<Alarm>) -> Vec<Alarm> {
        alarms
            .into_iter()
            .filter(|a| self.site.as_ref().is_none_or(|s| &a.site_id == s))
            .filter(|a| self.time.matches(a.datetime))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IntentHandler {
    sites: Arc<SiteRegistry>,
    store: Arc<AlarmStore>,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    dialogue: DialogueCoordinator,
    default_room: String,
    namespace: String,
}

impl IntentHandler {
    pub fn new(
        sites: Arc<SiteRegistry>,
        store: Arc<AlarmStore>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
        dialogue: DialogueCoordinator,
        default_room: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            sites,
            store,
            publisher,
            time,
            dialogue,
            default_room: default_room.into(),
            namespace: namespace.into(),
        }
    }

    pub async fn handle(&self, kind: IntentKind, message: &IntentMessage) {
        debug!(intent = %kind, site = %message.site_id, session = %message.session_id, "Intent");
        if kind == IntentKind::AnswerAlarm {
            self.dialogue.on_answer(message).await;
            return;
        }
        let messages = self.respond(kind, message);
        publish_all(self.publisher.as_ref(), messages).await;
    }

    fn respond(&self, kind: IntentKind, message: &IntentMessage) -> Vec<Outbound> {
        let reply = match kind {
            IntentKind::NewAlarm => return self.new_alarm(message),
            IntentKind::DeleteAlarms => return vec![self.delete_alarms(message)],
            IntentKind::GetAlarms => self.get_alarms(message),
            IntentKind::GetNextAlarm => self.get_next_alarm(message),
            IntentKind::GetMissedAlarms => self.get_missed_alarms(message),
            IntentKind::ConfirmAlarm => self.confirm_alarm(message),
            IntentKind::AnswerAlarm => None,
        };
        vec![Outbound::end_session(&message.session_id, reply)]
    }

    fn new_alarm(&self, message: &IntentMessage) -> Vec<Outbound> {
        let end = |text: String| vec![Outbound::end_session(&message.session_id, Some(text))];

        let site_id = match message.custom_slot("room") {
            Some("here") => message.site_id.clone(),
            Some(room) => match self.sites.resolve(room) {
                Ok(site_id) => site_id,
                Err(_) => return end(format!("The room {room} has not been configured yet.")),
            },
            None => match self.sites.resolve(&self.default_room) {
                Ok(site_id) => site_id,
                Err(e) => {
                    error!(error = %e, "Default room not resolvable");
                    return end(NOT_UNDERSTOOD.to_string());
                }
            },
        };

        let Some(at) = (match message.slot("time") {
            Some(SlotValue::InstantTime { value, .. }) => minute::parse_slot(value),
            _ => None,
        }) else {
            return end(NOT_UNDERSTOOD.to_string());
        };

        match self.store.add(at, &site_id) {
            Ok(alarm) => {
                let mut messages = end(format!(
                    "The alarm will ring {}.",
                    self.describe(&alarm, &message.site_id)
                ));
                messages.push(Outbound::NewAlarm(NewAlarmNotice {
                    new: alarm.to_record(),
                    all: self.store.records(),
                }));
                messages
            }
            Err(Error::Validation(ValidationError::InPast { .. })) => {
                end("This time is in the past. Please set another alarm.".to_string())
            }
            Err(Error::Validation(ValidationError::TooSoon { .. })) => {
                end("This alarm would ring now. Please set another alarm.".to_string())
            }
            Err(Error::UnknownSite(_)) => end(HERE_NOT_CONFIGURED.to_string()),
            Err(e) => {
                error!(error = %e, "Failed to add alarm");
                end("Sorry, the alarm could not be saved.".to_string())
            }
        }
    }

    fn get_alarms(&self, message: &IntentMessage) -> Option<String> {
        let filter = match self.filter(message, false) {
            Ok(filter) => filter,
            Err(reply) => return Some(reply),
        };
        let alarms = filter.apply(self.store.active(None, None));

        let reply = match alarms.len() {
            0 => "There are no alarms.".to_string(),
            1 => format!(
                "There is one alarm, {}.",
                self.describe(&alarms[0], &message.site_id)
            ),
            n if n > LISTED_AT_MOST => format!(
                "There are {n} alarms. The next {LISTED_AT_MOST} are {}.",
                self.list(&alarms[..LISTED_AT_MOST], &message.site_id)
            ),
            n => format!(
                "There are {n} alarms, {}.",
                self.list(&alarms, &message.site_id)
            ),
        };
        Some(reply)
    }

    fn get_next_alarm(&self, message: &IntentMessage) -> Option<String> {
        let filter = match self.filter(message, false) {
            Ok(filter) => filter,
            Err(reply) => return Some(reply),
        };
        let reply = match filter.apply(self.store.active(None, None)).first() {
            Some(alarm) => format!(
                "The next alarm rings {}.",
                self.describe(alarm, &message.site_id)
            ),
            None => "There is no alarm.".to_string(),
        };
        Some(reply)
    }

    /// Read missed alarms out, oldest first, then forget them.
    fn get_missed_alarms(&self, message: &IntentMessage) -> Option<String> {
        let filter = match self.filter(message, true) {
            Ok(filter) => filter,
            Err(reply) => return Some(reply),
        };
        let mut missed = filter.apply(self.store.missed(None));
        missed.reverse();

        let reply = match missed.len() {
            0 => "You missed no alarm.".to_string(),
            1 => format!(
                "You missed one alarm, {}.",
                self.describe(&missed[0], &message.site_id)
            ),
            n => format!(
                "You missed {n} alarms, {}.",
                self.list(&missed, &message.site_id)
            ),
        };

        if !missed.is_empty() {
            let ids: Vec<_> = missed.iter().map(|a| a.id).collect();
            if let Err(e) = self.store.remove_all(|a| ids.contains(&a.id)) {
                error!(error = %e, "Failed to clear reported missed alarms");
            }
        }
        Some(reply)
    }

    /// Ask before deleting. The matches are remembered on the speaking site
    /// until the confirmation arrives.
    fn delete_alarms(&self, message: &IntentMessage) -> Outbound {
        let end = |text: &str| Outbound::end_session(&message.session_id, Some(text.to_string()));

        let Some(speaking) = self.sites.get(&message.site_id) else {
            return end(HERE_NOT_CONFIGURED);
        };
        let filter = match self.filter(message, false) {
            Ok(filter) => filter,
            Err(reply) => return end(&reply),
        };
        let alarms = filter.apply(self.store.active(None, None));

        let question = match alarms.len() {
            0 => return end("There is no alarm to delete."),
            1 => format!(
                "Are you sure you want to delete the alarm {}?",
                self.describe(&alarms[0], &message.site_id)
            ),
            n => format!("There are {n} alarms. Are you sure you want to delete them?"),
        };

        speaking.runtime().pending_delete = Some(PendingDelete {
            session_id: message.session_id.clone(),
            alarm_ids: alarms.iter().map(|a| a.id).collect(),
        });

        Outbound::ContinueSession(ContinueSession {
            session_id: message.session_id.clone(),
            text: question,
            intent_filter: vec![IntentKind::ConfirmAlarm.qualified(&self.namespace)],
        })
    }

    fn confirm_alarm(&self, message: &IntentMessage) -> Option<String> {
        let site = self.sites.get(&message.site_id)?;
        let pending = {
            let mut rt = site.runtime();
            let ours = rt
                .pending_delete
                .as_ref()
                .is_some_and(|p| p.session_id == message.session_id);
            if ours { rt.pending_delete.take() } else { None }
        };
        let Some(pending) = pending else {
            trace!(site = %message.site_id, session = %message.session_id, "Nothing to confirm");
            return None;
        };

        if message.custom_slot("answer") != Some("yes") {
            return Some("Okay, nothing was deleted.".to_string());
        }

        match self
            .store
            .remove_all(|a| pending.alarm_ids.contains(&a.id))
        {
            Ok(removed) => {
                info!(site = %message.site_id, count = removed.len(), "Alarms deleted");
                Some("Done.".to_string())
            }
            Err(e) => {
                error!(error = %e, "Failed to delete alarms");
                Some("Sorry, the alarms could not be deleted.".to_string())
            }
        }
    }

    /// Build a filter from the optional `room` and `time` slots.
    ///
    /// `Err` carries the sentence to reply with.
    fn filter(&self, message: &IntentMessage, allow_past: bool) -> Result<Filter, String> {
        let now = minute::truncate(self.time.now());

        let time = match message.slot("time") {
            None => TimeFilter::Any,
            Some(SlotValue::InstantTime { value, grain }) => {
                let at = minute::parse_slot(value).ok_or_else(|| NOT_UNDERSTOOD.to_string())?;
                if grain.is_none_or(Grain::is_time_of_day) {
                    if !allow_past && at < now {
                        return Err("This time is in the past.".to_string());
                    }
                    TimeFilter::Exact(at)
                } else {
                    if !allow_past && at.date() < now.date() {
                        return Err("This day is in the past.".to_string());
                    }
                    TimeFilter::Day(at.date())
                }
            }
            Some(SlotValue::TimeInterval { from, to }) => {
                // A missing bound leaves the range open; a garbled one must
                // not widen it.
                let bound = |value: &Option<String>| match value.as_deref() {
                    None => Ok(None),
                    Some(v) => minute::parse_slot(v)
                        .map(Some)
                        .ok_or_else(|| NOT_UNDERSTOOD.to_string()),
                };
                TimeFilter::Range {
                    from: bound(from)?,
                    to: bound(to)?,
                }
            }
            Some(_) => return Err(NOT_UNDERSTOOD.to_string()),
        };

        let site = match message.custom_slot("room") {
            None => None,
            Some("here") => match self.sites.get(&message.site_id) {
                Some(site) => Some(site.id.clone()),
                None => return Err(HERE_NOT_CONFIGURED.to_string()),
            },
            Some(room) => Some(
                self.sites
                    .resolve(room)
                    .map_err(|_| format!("The room {room} has not been configured yet."))?,
            ),
        };

        Ok(Filter { site, time })
    }

    /// "tomorrow at 07:30 in the kitchen"
    fn describe(&self, alarm: &Alarm, speaking: &SiteId) -> String {
        let today = self.time.now().date();
        let room = self.room_part(&alarm.site_id, speaking);
        let text = format!(
            "{} at {} {}",
            day_part(alarm.datetime.date(), today),
            minute::clock_time(alarm.datetime),
            room
        );
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn list(&self, alarms: &[Alarm], speaking: &SiteId) -> String {
        let described: Vec<String> = alarms.iter().map(|a| self.describe(a, speaking)).collect();
        match described.split_last() {
            None => String::new(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        }
    }

    fn room_part(&self, site_id: &SiteId, speaking: &SiteId) -> String {
        if self.sites.sites().len() <= 1 {
            return String::new();
        }
        if site_id == speaking {
            return "here".to_string();
        }
        match self.sites.resolve_room(site_id) {
            Ok(room) => format!("in the {room}"),
            Err(_) => String::new(),
        }
    }
}

fn day_part(date: Date, today: Date) -> String {
    match (date - today).whole_days() {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        -1 => "yesterday".to_string(),
        2..=6 => format!("on {}", date.weekday()),
        _ => format!("on {date}"),
    }
}
