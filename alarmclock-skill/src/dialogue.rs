//! Conversation that follows an acknowledged alarm.
//!
//! The hotword that stops an alarm also makes the dialogue manager open a
//! session on that site. The coordinator waits for that session, closes it
//! and, with snooze enabled, opens its own session asking "snooze or stop".
//! The answer (or its absence) releases the site for the next alarm.

use std::sync::Arc;
use std::time::Duration;

use time::PrimitiveDateTime;

use crate::bus::messages::{SessionInit, StartSession, StopListening};
use crate::bus::{IntentKind, IntentMessage, Outbound, Publisher, publish_all};
use crate::clock::TimeSource;
use crate::config::SnoozeConfig;
use crate::ringing::{RingPhase, TimerEvent, TimerKind, Timers};
use crate::site::{Site, SiteRegistry, SiteRuntime};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;
use crate::types::{SiteId, minute};

const SNOOZE_QUESTION: &str = "Do you want to snooze or stop the alarm?";

#[derive(Debug, Clone)]
pub struct DialogueCoordinator {
    sites: Arc<SiteRegistry>,
    store: Arc<AlarmStore>,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    timers: Timers,
    snooze: SnoozeConfig,
    session_timeout: Duration,
    namespace: String,
}

impl DialogueCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sites: Arc<SiteRegistry>,
        store: Arc<AlarmStore>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
        timers: Timers,
        snooze: SnoozeConfig,
        session_timeout: Duration,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            sites,
            store,
            publisher,
            time,
            timers,
            snooze,
            session_timeout,
            namespace: namespace.into(),
        }
    }

    /// Custom data attached to the snooze session so its notifications can
    /// be told apart from everyone else's.
    pub fn snooze_tag(&self) -> String {
        format!("{}:snooze", self.namespace)
    }

    /// Called by the ring controller, under the site lock, when the hotword
    /// stopped an alarm.
    pub fn on_hotword_acked(&self, site: &Site, rt: &mut SiteRuntime, acked_at: PrimitiveDateTime) {
        rt.phase = RingPhase::AwaitingSession;
        rt.acked_at = Some(acked_at);
        rt.timer = Some(
            self.timers
                .schedule(&site.id, TimerKind::SessionWait, self.session_timeout),
        );
    }

    pub async fn on_session_started(
        &self,
        site_id: &SiteId,
        session_id: &str,
        custom_data: Option<&str>,
    ) {
        let Some(site) = self.sites.get(site_id) else {
            return;
        };
        let tag = self.snooze_tag();

        let messages = {
            let mut rt = site.runtime();

            if custom_data == Some(tag.as_str()) {
                // Our own snooze session opening.
                if rt.phase == RingPhase::AwaitingAnswer {
                    rt.handled_session = Some(session_id.to_string());
                }
                return;
            }
            if !rt.session_pending() {
                trace!(site = %site_id, session = session_id, "Session not ours");
                return;
            }
            if rt.handled_session.as_deref() == Some(session_id) {
                debug!(site = %site_id, session = session_id, "Session already handled");
                return;
            }
            rt.handled_session = Some(session_id.to_string());

            if self.snooze.enabled {
                rt.phase = RingPhase::AwaitingAnswer;
                rt.timer = Some(self.timers.schedule(
                    &site.id,
                    TimerKind::AnswerWait,
                    self.snooze.answer_timeout,
                ));
                debug!(site = %site_id, "Asking snooze or stop");
                vec![
                    Outbound::end_session(session_id, None),
                    Outbound::StartSession(StartSession {
                        site_id: site.id.clone(),
                        init: SessionInit::Action {
                            text: SNOOZE_QUESTION.to_string(),
                            can_be_enqueued: true,
                            intent_filter: vec![IntentKind::AnswerAlarm.qualified(&self.namespace)],
                            send_intent_not_recognized: false,
                        },
                        custom_data: Some(tag),
                    }),
                ]
            } else {
                rt.release();
                let text = format!(
                    "Alarm stopped. It is now {}.",
                    minute::clock_time(self.time.now())
                );
                vec![Outbound::end_session(session_id, Some(text))]
            }
        };

        // Keep the ASR from transcribing into the session we are closing.
        let stop = Outbound::StopListening(StopListening {
            site_id: site.id.clone(),
            session_id: session_id.to_string(),
        });
        let messages = std::iter::once(stop).chain(messages).collect();
        publish_all(self.publisher.as_ref(), messages).await;
    }

    /// Answer to the snooze question.
    pub async fn on_answer(&self, message: &IntentMessage) {
        let text = match self.sites.get(&message.site_id) {
            Some(site) => self.answer(site, message),
            None => None,
        };
        publish_all(
            self.publisher.as_ref(),
            vec![Outbound::end_session(&message.session_id, text)],
        )
        .await;
    }

    fn answer(&self, site: &Site, message: &IntentMessage) -> Option<String> {
        let mut rt = site.runtime();
        if rt.phase != RingPhase::AwaitingAnswer {
            trace!(site = %site.id, "Answer without a pending question");
            return None;
        }
        let acked_at = rt.acked_at.unwrap_or_else(|| self.time.now());
        rt.release();

        if message.custom_slot("answer") == Some("stop") {
            info!(site = %site.id, "Alarm stopped by answer");
            return Some("Alarm stopped.".to_string());
        }

        let minutes = self.snooze_minutes(message);
        let at = acked_at + Duration::from_secs(u64::from(minutes) * 60);
        match self.store.add_snooze(at, &site.id) {
            Ok(alarm) => {
                info!(site = %site.id, at = %minute::format(alarm.datetime), minutes, "Snoozed");
                Some(format!("I will wake you in {minutes} minutes."))
            }
            Err(e) => {
                error!(site = %site.id, error = %e, "Failed to add snooze alarm");
                Some("Sorry, I could not snooze the alarm.".to_string())
            }
        }
    }

    /// Requested snooze length, or the default when missing or outside the
    /// configured bounds.
    fn snooze_minutes(&self, message: &IntentMessage) -> u32 {
        let requested = message
            .slot("duration")
            .and_then(|slot| slot.duration_minutes());
        match requested {
            Some(m) if (i64::from(self.snooze.min_minutes)..=i64::from(self.snooze.max_minutes))
                .contains(&m) =>
            {
                m as u32
            }
            _ => self.snooze.default_minutes,
        }
    }

    /// The snooze session ended without an answer we handled.
    pub async fn on_session_ended(&self, site_id: &SiteId, custom_data: Option<&str>) {
        if custom_data != Some(self.snooze_tag().as_str()) {
            return;
        }
        let Some(site) = self.sites.get(site_id) else {
            return;
        };

        let mut rt = site.runtime();
        if rt.phase == RingPhase::AwaitingAnswer {
            info!(site = %site_id, "Snooze session ended unanswered");
            rt.release();
        }
    }

    /// Session wait or answer wait ran out.
    pub fn on_timeout(&self, event: &TimerEvent) {
        let Some(site) = self.sites.get(&event.site_id) else {
            return;
        };

        let mut rt = site.runtime();
        if !rt.timer.as_ref().is_some_and(|t| t.matches(event)) {
            trace!(site = %site.id, timer = event.timer_id, "Ignoring stale dialogue timer");
            return;
        }

        let expected = match event.kind {
            TimerKind::SessionWait => RingPhase::AwaitingSession,
            TimerKind::AnswerWait => RingPhase::AwaitingAnswer,
            TimerKind::RingTimeout => return,
        };
        if rt.phase == expected {
            info!(site = %site.id, kind = %event.kind, "Dialogue timed out, releasing site");
            rt.release();
        }
    }
}
