//! End-to-end behaviour of the skill, driven step by step with a manual
//! wall clock and paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use time::PrimitiveDateTime;
use time::macros::datetime;

use alarmclock_skill::bus::messages::{SessionInit, StopListening, StopReason};
use alarmclock_skill::bus::{Inbound, IntentKind, IntentMessage, Outbound, RecordingPublisher};
use alarmclock_skill::clock::ManualTimeSource;
use alarmclock_skill::config::{Config, SiteConfig};
use alarmclock_skill::ringing::RingPhase;
use alarmclock_skill::ringtone;
use alarmclock_skill::skill::AlarmClockSkill;
use alarmclock_skill::store::{AlarmBackend, JsonLinesFile, MemoryBackend};
use alarmclock_skill::types::{RingId, SiteId};

const START: PrimitiveDateTime = datetime!(2024-03-01 07:00);

struct Harness {
    skill: AlarmClockSkill,
    time: Arc<ManualTimeSource>,
    publisher: Arc<RecordingPublisher>,
}

fn config() -> Config {
    Config {
        sites: vec![
            SiteConfig::new("bedroom", "bedroom-pi"),
            SiteConfig::new("kitchen", "kitchen-pi"),
        ],
        default_room: "bedroom".into(),
        ..Config::default()
    }
}

fn harness_with(config: Config, backend: Box<dyn AlarmBackend>, start: PrimitiveDateTime) -> Harness {
    let time = Arc::new(ManualTimeSource::new(start));
    let publisher = Arc::new(RecordingPublisher::new());
    let skill = AlarmClockSkill::with_backend(
        config,
        backend,
        publisher.clone(),
        time.clone(),
        ringtone::beep(),
    )
    .unwrap();
    Harness {
        skill,
        time,
        publisher,
    }
}

fn harness() -> Harness {
    harness_with(config(), Box::new(MemoryBackend::default()), START)
}

fn site(id: &str) -> SiteId {
    SiteId::from(id)
}

fn intent(kind: IntentKind, session: &str, site: &str, slots: serde_json::Value) -> Inbound {
    let message: IntentMessage = serde_json::from_value(json!({
        "sessionId": session,
        "siteId": site,
        "intent": {"intentName": format!("alarmclock:{kind}")},
        "slots": slots,
    }))
    .unwrap();
    Inbound::Intent { kind, message }
}

impl Harness {
    fn add(&self, at: PrimitiveDateTime, site_id: &str) {
        self.skill.store().add(at, &site(site_id)).unwrap();
    }

    async fn tick_at(&mut self, now: PrimitiveDateTime) {
        self.time.set(now);
        self.skill.tick().await;
    }

    /// Let tokio time pass, then handle whatever the timers posted.
    async fn elapse(&mut self, by: Duration) {
        self.time.advance(by);
        tokio::time::advance(by).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.skill.drain().await;
    }

    fn phase(&self, site_id: &str) -> RingPhase {
        self.skill.sites().get(&site(site_id)).unwrap().phase()
    }

    fn ringing_started(&self) -> Vec<SiteId> {
        self.publisher
            .published()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::RingingStarted(record) => Some(record.site_id),
                _ => None,
            })
            .collect()
    }

    fn ringing_stopped(&self) -> Vec<StopReason> {
        self.publisher
            .published()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::RingingStopped(stopped) => Some(stopped.reason),
                _ => None,
            })
            .collect()
    }

    fn ring_ids(&self) -> Vec<RingId> {
        self.publisher
            .published()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::PlayBytes { ring_id, .. } => Some(ring_id),
                _ => None,
            })
            .collect()
    }

    fn sunrises(&self) -> Vec<(SiteId, i64)> {
        self.publisher
            .published()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::SunriseStart(sunrise) => Some((sunrise.site_id, sunrise.minutes)),
                _ => None,
            })
            .collect()
    }

    async fn hotword(&self, site_id: &str) {
        self.skill
            .handle(Inbound::Hotword {
                site_id: site(site_id),
            })
            .await;
    }

    async fn session_started(&self, site_id: &str, session_id: &str) {
        self.skill
            .handle(Inbound::SessionStarted {
                site_id: site(site_id),
                session_id: session_id.into(),
                custom_data: None,
            })
            .await;
    }

    fn replies(&self) -> Vec<String> {
        self.publisher
            .published()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::EndSession(end) => end.text,
                _ => None,
            })
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn alarm_fires_once_across_ticks_in_its_minute() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");

    h.tick_at(datetime!(2024-03-01 07:04:55)).await;
    assert!(h.ringing_started().is_empty());

    h.tick_at(datetime!(2024-03-01 07:05:00)).await;
    h.tick_at(datetime!(2024-03-01 07:05:05)).await;
    h.tick_at(datetime!(2024-03-01 07:05:55)).await;

    assert_eq!(h.ringing_started(), vec![site("bedroom-pi")]);
    assert_eq!(h.ring_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn skipped_minutes_still_ring_once() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.add(datetime!(2024-03-01 07:07), "kitchen-pi");

    h.tick_at(datetime!(2024-03-01 07:04)).await;
    // Suspend across both alarms.
    h.tick_at(datetime!(2024-03-01 07:12)).await;
    h.tick_at(datetime!(2024-03-01 07:12:05)).await;

    let mut started = h.ringing_started();
    started.sort();
    assert_eq!(started, vec![site("bedroom-pi"), site("kitchen-pi")]);
}

#[tokio::test(start_paused = true)]
async fn one_alarm_rings_per_site_and_the_next_waits() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.add(datetime!(2024-03-01 07:06), "bedroom-pi");

    h.tick_at(datetime!(2024-03-01 07:06)).await;
    assert_eq!(h.ringing_started().len(), 1);
    assert_eq!(h.phase("bedroom-pi"), RingPhase::Ringing);

    h.tick_at(datetime!(2024-03-01 07:06:05)).await;
    assert_eq!(h.ringing_started().len(), 1);

    h.skill
        .handle(Inbound::StopRinging {
            site_id: site("bedroom-pi"),
        })
        .await;
    assert_eq!(h.ringing_stopped(), vec![StopReason::External]);
    assert!(h.phase("bedroom-pi").is_idle());

    h.tick_at(datetime!(2024-03-01 07:06:10)).await;
    assert_eq!(h.ringing_started().len(), 2);
    assert!(h.skill.store().active(None, None).is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_play_finished_does_not_replay() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    let first = h.ring_ids()[0].clone();
    let finished = |ring_id: RingId| Inbound::PlayFinished {
        site_id: site("bedroom-pi"),
        ring_id,
    };

    h.skill.handle(finished(first.clone())).await;
    let ids = h.ring_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[1], first);

    // Retransmitted acknowledgement for the first cycle.
    h.skill.handle(finished(first)).await;
    assert_eq!(h.ring_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unexpected_session_started_is_ignored() {
    let mut h = harness();
    h.skill
        .handle(Inbound::SessionStarted {
            site_id: site("bedroom-pi"),
            session_id: "s1".into(),
            custom_data: None,
        })
        .await;

    assert!(h.publisher.published().is_empty());
    assert!(h.phase("bedroom-pi").is_idle());
}

#[tokio::test(start_paused = true)]
async fn unanswered_alarm_times_out_as_missed() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    h.elapse(Duration::from_secs(29)).await;
    assert_eq!(h.phase("bedroom-pi"), RingPhase::Ringing);
    assert!(h.ringing_stopped().is_empty());

    h.elapse(Duration::from_secs(2)).await;
    assert!(h.phase("bedroom-pi").is_idle());
    assert_eq!(h.ringing_stopped(), vec![StopReason::Timeout]);

    let missed = h.skill.store().missed(None);
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].datetime, datetime!(2024-03-01 07:05));

    // Replays and later ticks change nothing.
    h.elapse(Duration::from_secs(60)).await;
    h.skill.tick().await;
    assert_eq!(h.ringing_stopped().len(), 1);
    assert_eq!(h.ringing_started().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn snooze_counts_from_acknowledgement() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    h.time.set(datetime!(2024-03-01 07:05:20));
    h.skill
        .handle(Inbound::Hotword {
            site_id: site("bedroom-pi"),
        })
        .await;
    assert_eq!(h.ringing_stopped(), vec![StopReason::Acknowledged]);
    assert_eq!(h.phase("bedroom-pi"), RingPhase::AwaitingSession);

    h.skill
        .handle(Inbound::SessionStarted {
            site_id: site("bedroom-pi"),
            session_id: "wake".into(),
            custom_data: None,
        })
        .await;
    let question = h.publisher.published().into_iter().find_map(|m| match m {
        Outbound::StartSession(start) => Some(start),
        _ => None,
    });
    let Some(question) = question else {
        panic!("snooze question not asked");
    };
    let SessionInit::Action { intent_filter, .. } = &question.init;
    assert_eq!(intent_filter, &vec!["alarmclock:answerAlarm".to_string()]);

    // Delivered twice; handled once.
    h.skill
        .handle(Inbound::SessionStarted {
            site_id: site("bedroom-pi"),
            session_id: "wake".into(),
            custom_data: None,
        })
        .await;
    let starts = h
        .publisher
        .published()
        .iter()
        .filter(|m| matches!(m, Outbound::StartSession(_)))
        .count();
    assert_eq!(starts, 1);

    h.time.set(datetime!(2024-03-01 07:05:40));
    h.skill
        .handle(intent(
            IntentKind::AnswerAlarm,
            "snooze-session",
            "bedroom-pi",
            json!([{"slotName": "duration", "value": {"kind": "Duration", "minutes": 5}}]),
        ))
        .await;

    assert_eq!(
        h.replies().last().map(String::as_str),
        Some("I will wake you in 5 minutes.")
    );
    assert!(h.phase("bedroom-pi").is_idle());
    let pending = h.skill.store().active(None, None);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].datetime, datetime!(2024-03-01 07:10));

    h.tick_at(datetime!(2024-03-01 07:10)).await;
    h.tick_at(datetime!(2024-03-01 07:10:05)).await;
    assert_eq!(h.ringing_started().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dialogue_times_out_when_no_session_starts() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;
    h.skill
        .handle(Inbound::Hotword {
            site_id: site("bedroom-pi"),
        })
        .await;

    h.elapse(Duration::from_secs(31)).await;

    assert!(h.phase("bedroom-pi").is_idle());
    assert!(h.publisher.published().iter().all(|m| !matches!(m, Outbound::StartSession(_))));
}

#[tokio::test(start_paused = true)]
async fn new_alarm_lead_time() {
    let mut h = harness();

    h.time.set(datetime!(2024-03-01 07:00:30));
    h.skill
        .handle(intent(
            IntentKind::NewAlarm,
            "s1",
            "bedroom-pi",
            json!([{"slotName": "time", "value": {
                "kind": "InstantTime", "value": "2024-03-01 07:01:00 +01:00", "grain": "Minute"
            }}]),
        ))
        .await;
    assert_eq!(
        h.replies(),
        vec!["This alarm would ring now. Please set another alarm."]
    );
    assert!(h.skill.store().records().is_empty());

    h.time.set(datetime!(2024-03-01 07:00:50));
    h.skill
        .handle(intent(
            IntentKind::NewAlarm,
            "s2",
            "bedroom-pi",
            json!([{"slotName": "time", "value": {
                "kind": "InstantTime", "value": "2024-03-01 07:03:00 +01:00", "grain": "Minute"
            }}]),
        ))
        .await;
    assert_eq!(
        h.replies().last().map(String::as_str),
        Some("The alarm will ring today at 07:03 here.")
    );
    assert_eq!(h.skill.store().active(None, None).len(), 1);
    assert!(
        h.publisher
            .published()
            .iter()
            .any(|m| matches!(m, Outbound::NewAlarm(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn alarms_survive_restart_and_past_ones_become_missed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alarms.jsonl");

    {
        let h = harness_with(config(), Box::new(JsonLinesFile::new(&path)), START);
        h.add(datetime!(2024-03-01 07:30), "bedroom-pi");
        h.add(datetime!(2024-03-01 09:00), "kitchen-pi");
    }

    let mut h = harness_with(
        config(),
        Box::new(JsonLinesFile::new(&path)),
        datetime!(2024-03-01 08:00),
    );

    let missed = h.skill.store().missed(None);
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].datetime, datetime!(2024-03-01 07:30));

    let active = h.skill.store().active(None, None);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].site_id, site("kitchen-pi"));

    // Missed alarms never ring.
    h.tick_at(datetime!(2024-03-01 08:00:05)).await;
    assert!(h.ringing_started().is_empty());

    // The reclassification was written back.
    let reloaded = JsonLinesFile::new(&path).load().unwrap();
    assert_eq!(reloaded.iter().filter(|r| r.missed).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn restore_can_be_disabled() {
    let backend = Arc::new(MemoryBackend::default());
    {
        let h = harness_with(config(), Box::new(backend.clone()), START);
        h.add(datetime!(2024-03-01 07:30), "bedroom-pi");
    }

    let h = harness_with(
        Config {
            restore_alarms: false,
            ..config()
        },
        Box::new(backend),
        START,
    );
    assert!(h.skill.store().records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn event_loop_runs_until_stopped() {
    let h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.time.set(datetime!(2024-03-01 07:05));

    let publisher = h.publisher.clone();
    let inbound = h.skill.inbound();
    let handle = h.skill.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        publisher
            .published()
            .iter()
            .filter(|m| matches!(m, Outbound::RingingStarted(_)))
            .count(),
        1
    );

    inbound
        .send(Inbound::StopRinging {
            site_id: site("bedroom-pi"),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(
        publisher
            .published()
            .iter()
            .any(|m| matches!(m, Outbound::RingingStopped(s) if s.reason == StopReason::External))
    );

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sunrise_is_announced_once_per_alarm() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:40), "bedroom-pi");
    h.add(datetime!(2024-03-01 09:00), "kitchen-pi");

    h.tick_at(datetime!(2024-03-01 07:05)).await;
    assert!(h.sunrises().is_empty());

    h.tick_at(datetime!(2024-03-01 07:10)).await;
    h.tick_at(datetime!(2024-03-01 07:10:05)).await;
    h.tick_at(datetime!(2024-03-01 07:25)).await;
    assert_eq!(h.sunrises(), vec![(site("bedroom-pi"), 30)]);

    // The alarm itself rings without a second announcement.
    h.tick_at(datetime!(2024-03-01 07:40)).await;
    assert_eq!(h.ringing_started(), vec![site("bedroom-pi")]);
    assert_eq!(h.sunrises().len(), 1);

    h.skill
        .handle(Inbound::StopRinging {
            site_id: site("bedroom-pi"),
        })
        .await;
    h.tick_at(datetime!(2024-03-01 08:45)).await;
    assert_eq!(
        h.sunrises(),
        vec![(site("bedroom-pi"), 30), (site("kitchen-pi"), 15)]
    );
}

#[tokio::test(start_paused = true)]
async fn sunrise_can_be_disabled() {
    let mut h = harness_with(
        Config {
            sunrise_lead: Duration::ZERO,
            ..config()
        },
        Box::new(MemoryBackend::default()),
        START,
    );
    h.add(datetime!(2024-03-01 07:20), "bedroom-pi");

    h.tick_at(datetime!(2024-03-01 07:10)).await;
    h.tick_at(datetime!(2024-03-01 07:20)).await;

    assert!(h.sunrises().is_empty());
    assert_eq!(h.ringing_started().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn wake_session_stops_listening_before_it_ends() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;
    h.hotword("bedroom-pi").await;
    h.publisher.take();

    h.session_started("bedroom-pi", "wake").await;

    let published = h.publisher.take();
    assert_eq!(
        published[0],
        Outbound::StopListening(StopListening {
            site_id: site("bedroom-pi"),
            session_id: "wake".into(),
        })
    );
    assert_eq!(published[0].topic(), "hermes/asr/stopListening");
    assert_eq!(published[1], Outbound::end_session("wake", None));
    assert!(matches!(published[2], Outbound::StartSession(_)));
}

#[tokio::test(start_paused = true)]
async fn timed_out_alarm_stays_missed_while_the_store_cannot_save() {
    let backend = Arc::new(MemoryBackend::default());
    let mut h = harness_with(config(), Box::new(backend.clone()), START);
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    backend.set_failing(true);
    h.elapse(Duration::from_secs(31)).await;

    assert_eq!(h.ringing_stopped(), vec![StopReason::Timeout]);
    assert!(h.phase("bedroom-pi").is_idle());
    assert_eq!(h.skill.store().missed(None).len(), 1);
    assert!(h.skill.store().active(None, None).is_empty());
    assert!(!backend.records()[0].missed);

    h.tick_at(datetime!(2024-03-01 07:06)).await;
    h.tick_at(datetime!(2024-03-01 07:06:05)).await;
    assert_eq!(h.ringing_started().len(), 1);
    assert!(h.skill.store().is_dirty());

    backend.set_failing(false);
    h.tick_at(datetime!(2024-03-01 07:06:10)).await;
    assert!(!h.skill.store().is_dirty());
    let records = backend.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].missed);
}

#[tokio::test(start_paused = true)]
async fn stopped_alarm_does_not_ring_again_while_the_store_cannot_save() {
    let backend = Arc::new(MemoryBackend::default());
    let mut h = harness_with(config(), Box::new(backend.clone()), START);
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    backend.set_failing(true);
    h.skill
        .handle(Inbound::StopRinging {
            site_id: site("bedroom-pi"),
        })
        .await;
    assert_eq!(h.ringing_stopped(), vec![StopReason::External]);
    assert!(h.skill.store().records().is_empty());

    h.tick_at(datetime!(2024-03-01 07:05:30)).await;
    h.tick_at(datetime!(2024-03-01 07:06)).await;
    assert_eq!(h.ringing_started().len(), 1);
    assert_eq!(backend.records().len(), 1);

    backend.set_failing(false);
    h.tick_at(datetime!(2024-03-01 07:06:05)).await;
    assert!(backend.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn out_of_range_snooze_uses_the_default() {
    let mut h = harness();
    h.add(datetime!(2024-03-01 07:05), "bedroom-pi");
    h.tick_at(datetime!(2024-03-01 07:05)).await;

    h.time.set(datetime!(2024-03-01 07:05:20));
    h.hotword("bedroom-pi").await;
    h.session_started("bedroom-pi", "wake").await;
    h.skill
        .handle(intent(
            IntentKind::AnswerAlarm,
            "snooze-session",
            "bedroom-pi",
            json!([{"slotName": "duration", "value": {"kind": "Duration", "minutes": 30}}]),
        ))
        .await;

    assert_eq!(
        h.replies().last().map(String::as_str),
        Some("I will wake you in 9 minutes.")
    );
    let pending = h.skill.store().active(None, None);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].datetime, datetime!(2024-03-01 07:14));
}

#[tokio::test(start_paused = true)]
async fn single_site_replies_without_room() {
    let h = harness_with(
        Config {
            sites: vec![SiteConfig::new("bedroom", "bedroom-pi")],
            default_room: "bedroom".into(),
            ..Config::default()
        },
        Box::new(MemoryBackend::default()),
        START,
    );

    h.skill
        .handle(intent(
            IntentKind::NewAlarm,
            "s1",
            "bedroom-pi",
            json!([{"slotName": "time", "value": {
                "kind": "InstantTime", "value": "2024-03-01 07:30:00 +01:00", "grain": "Minute"
            }}]),
        ))
        .await;

    assert_eq!(h.replies(), vec!["The alarm will ring today at 07:30."]);
    assert_eq!(h.skill.store().active(Some(&site("bedroom-pi")), None).len(), 1);
}
