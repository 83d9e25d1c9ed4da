//! The skill's event loop.
//!
//! One task owns the clock and the receiving ends of every channel: inbound
//! bus messages, timer expiries and API commands. Components are shared
//! behind `Arc` and lock per site, so handlers never hold a lock across an
//! await.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::commands::SkillCommand;
use crate::api::server::SharedState;
use crate::bus::{Inbound, Publisher};
use crate::clock::{Clock, TimeSource};
use crate::config::Config;
use crate::dialogue::DialogueCoordinator;
use crate::error::Result;
use crate::intent::IntentHandler;
use crate::ringing::{RingController, TimerEvent, TimerKind, Timers};
use crate::ringtone;
use crate::site::SiteRegistry;
use crate::store::{AlarmBackend, AlarmStore, JsonLinesFile};
use crate::tracing::prelude::*;
use crate::types::minute;

const INBOUND_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 8;

pub struct AlarmClockSkill {
    clock: Clock,
    sunrise_lead: Duration,
    store: Arc<AlarmStore>,
    sites: Arc<SiteRegistry>,
    ringing: RingController,
    dialogue: DialogueCoordinator,
    intents: IntentHandler,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    command_tx: mpsc::Sender<SkillCommand>,
    command_rx: mpsc::Receiver<SkillCommand>,
}

impl AlarmClockSkill {
    /// Build the skill with the JSON-lines store and ringtone named in
    /// `config`.
    pub fn new(
        config: Config,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let ringtone = ringtone::load(config.ringtone_path.as_deref())?;
        let backend = Box::new(JsonLinesFile::new(&config.store_path));
        Self::with_backend(config, backend, publisher, time, ringtone)
    }

    pub fn with_backend(
        config: Config,
        backend: Box<dyn AlarmBackend>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
        ringtone: Bytes,
    ) -> Result<Self> {
        config.validate()?;

        let sites = Arc::new(SiteRegistry::from_config(&config.sites, &ringtone));
        let store = Arc::new(AlarmStore::new(
            backend,
            time.clone(),
            sites.ids(),
            config.min_lead_time,
        ));

        if config.restore_alarms {
            store.restore();
        } else {
            info!("Starting without saved alarms");
        }

        let (timers, timer_rx) = Timers::new();
        let dialogue = DialogueCoordinator::new(
            sites.clone(),
            store.clone(),
            publisher.clone(),
            time.clone(),
            timers.clone(),
            config.snooze.clone(),
            config.session_timeout,
            config.intent_namespace.clone(),
        );
        let ringing = RingController::new(
            sites.clone(),
            store.clone(),
            publisher.clone(),
            time.clone(),
            timers,
            dialogue.clone(),
        );
        let intents = IntentHandler::new(
            sites.clone(),
            store.clone(),
            publisher,
            time.clone(),
            dialogue.clone(),
            config.default_room.clone(),
            config.intent_namespace.clone(),
        );

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        Ok(Self {
            clock: Clock::new(time, config.poll_interval),
            sunrise_lead: config.sunrise_lead,
            store,
            sites,
            ringing,
            dialogue,
            intents,
            inbound_tx,
            inbound_rx,
            timer_rx,
            command_tx,
            command_rx,
        })
    }

    /// Where the transport delivers decoded messages.
    pub fn inbound(&self) -> mpsc::Sender<Inbound> {
        self.inbound_tx.clone()
    }

    /// State the HTTP API reads and the command channel it writes to.
    pub fn api_state(&self) -> SharedState {
        SharedState {
            store: self.store.clone(),
            sites: self.sites.clone(),
            skill_cmd_tx: self.command_tx.clone(),
        }
    }

    pub fn store(&self) -> &Arc<AlarmStore> {
        &self.store
    }

    pub fn sites(&self) -> &Arc<SiteRegistry> {
        &self.sites
    }

    /// Spawn the event loop.
    pub fn start(self) -> SkillHandle {
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(self.run(cancellation.clone()));
        SkillHandle { cancellation, task }
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = self.clock.interval();
        info!(sites = self.sites.sites().len(), "Alarm clock skill started");

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = interval.tick() => self.tick().await,
                Some(message) = self.inbound_rx.recv() => self.handle(message).await,
                Some(event) = self.timer_rx.recv() => self.on_timer(event).await,
                Some(command) = self.command_rx.recv() => self.on_command(command).await,
            }
        }

        if let Err(e) = self.store.persist() {
            error!(error = %e, "Failed to save alarms on shutdown");
        }
        info!("Alarm clock skill stopped");
    }

    /// Retry unsaved alarm changes, announce upcoming sunrises, then ring
    /// everything due up to now.
    ///
    /// The range scan also picks up alarms from skipped minutes. A site that
    /// is still busy leaves its alarm pending for a later tick.
    pub async fn tick(&mut self) {
        let tick = self.clock.tick();
        if let Err(e) = self.store.flush() {
            debug!(error = %e, "Alarms still unsaved");
        }
        self.ringing
            .announce_sunrise(tick.now, self.sunrise_lead)
            .await;
        for alarm in self.store.due(tick.now) {
            match self.ringing.start_ringing(&alarm).await {
                Ok(true) => {}
                Ok(false) => trace!(
                    site = %alarm.site_id,
                    at = %minute::format(alarm.datetime),
                    "Alarm deferred"
                ),
                Err(e) => warn!(site = %alarm.site_id, error = %e, "Failed to ring alarm"),
            }
        }
    }

    pub async fn handle(&self, message: Inbound) {
        match message {
            Inbound::Hotword { site_id } => self.ringing.on_hotword(&site_id).await,
            Inbound::PlayFinished { site_id, ring_id } => {
                self.ringing.on_play_finished(&site_id, &ring_id).await
            }
            Inbound::SessionStarted {
                site_id,
                session_id,
                custom_data,
            } => {
                self.dialogue
                    .on_session_started(&site_id, &session_id, custom_data.as_deref())
                    .await
            }
            Inbound::SessionEnded {
                site_id,
                custom_data,
                ..
            } => {
                self.dialogue
                    .on_session_ended(&site_id, custom_data.as_deref())
                    .await
            }
            Inbound::Intent { kind, message } => self.intents.handle(kind, &message).await,
            Inbound::StopRinging { site_id } => {
                if let Err(e) = self.ringing.stop_ringing(&site_id).await {
                    warn!(site = %site_id, error = %e, "Cannot stop ringing");
                }
            }
        }
    }

    /// Handle whatever is already queued without waiting for more.
    ///
    /// Returns the number of events handled. For driving the skill step by
    /// step instead of through [`run`](Self::run).
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(event) = self.timer_rx.try_recv() {
                self.on_timer(event).await;
            } else if let Ok(message) = self.inbound_rx.try_recv() {
                self.handle(message).await;
            } else if let Ok(command) = self.command_rx.try_recv() {
                self.on_command(command).await;
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    pub async fn on_timer(&self, event: TimerEvent) {
        match event.kind {
            TimerKind::RingTimeout => self.ringing.on_ring_timeout(&event).await,
            TimerKind::SessionWait | TimerKind::AnswerWait => self.dialogue.on_timeout(&event),
        }
    }

    async fn on_command(&self, command: SkillCommand) {
        match command {
            SkillCommand::StopRinging { site_id, reply } => {
                let result = self.ringing.stop_ringing(&site_id).await;
                let _ = reply.send(result);
            }
        }
    }
}

/// Running skill task.
pub struct SkillHandle {
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl SkillHandle {
    /// Cancel the event loop and wait for it to finish.
    pub async fn stop(self) {
        self.cancellation.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Skill task failed");
        }
    }
}
