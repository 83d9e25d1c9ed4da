//! Per-site ringing state machine.
//!
//! Every transition runs under the site's runtime lock and only computes
//! the messages to send; publishing happens after the lock is released.

use std::sync::Arc;
use std::time::Duration;

use time::PrimitiveDateTime;

use crate::bus::messages::{RingingStopped, StopReason, SunriseStart};
use crate::bus::{Outbound, Publisher, publish_all};
use crate::clock::TimeSource;
use crate::dialogue::DialogueCoordinator;
use crate::error::{Error, Result};
use crate::site::{Site, SiteRegistry, SiteRuntime};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;
use crate::types::{Alarm, RingId, SiteId, minute};

use super::state::RingPhase;
use super::timer::{TimerEvent, TimerKind, Timers};

#[derive(Debug, Clone)]
pub struct RingController {
    sites: Arc<SiteRegistry>,
    store: Arc<AlarmStore>,
    publisher: Arc<dyn Publisher>,
    time: Arc<dyn TimeSource>,
    timers: Timers,
    dialogue: DialogueCoordinator,
}

impl RingController {
    pub fn new(
        sites: Arc<SiteRegistry>,
        store: Arc<AlarmStore>,
        publisher: Arc<dyn Publisher>,
        time: Arc<dyn TimeSource>,
        timers: Timers,
        dialogue: DialogueCoordinator,
    ) -> Self {
        Self {
            sites,
            store,
            publisher,
            time,
            timers,
            dialogue,
        }
    }

    /// Start ringing `alarm` on its site.
    ///
    /// Returns `Ok(false)` without side effects if the site is busy or the
    /// alarm is no longer waiting; the caller retries on a later tick.
    pub async fn start_ringing(&self, alarm: &Alarm) -> Result<bool> {
        let site = self.site(&alarm.site_id)?;

        let messages = {
            let mut rt = site.runtime();
            if !rt.phase.is_idle() {
                debug!(
                    site = %site.id,
                    phase = %rt.phase,
                    at = %minute::format(alarm.datetime),
                    "Site busy, alarm waits"
                );
                return Ok(false);
            }
            if !self.store.mark_fired(alarm.id) {
                debug!(site = %site.id, id = alarm.id, "Alarm no longer pending");
                return Ok(false);
            }

            let mut ringing = alarm.clone();
            ringing.fired = true;

            rt.phase = RingPhase::Ringing;
            rt.timer = Some(
                self.timers
                    .schedule(&site.id, TimerKind::RingTimeout, site.ringing_timeout),
            );

            let mut messages = vec![Outbound::RingingStarted(ringing.to_record())];
            if site.ringtone_enabled {
                messages.push(play(&site, &mut rt));
            }
            rt.ringing_alarm = Some(ringing);
            messages
        };

        info!(
            site = %site.id,
            at = %minute::format(alarm.datetime),
            timeout_secs = site.ringing_timeout.as_secs(),
            "Alarm ringing"
        );
        publish_all(self.publisher.as_ref(), messages).await;
        Ok(true)
    }

    /// Announce `sunriseStart` for each site's next alarm once it is within
    /// `lead` of `now`. Each alarm is announced at most once.
    pub async fn announce_sunrise(&self, now: PrimitiveDateTime, lead: Duration) {
        if lead.is_zero() {
            return;
        }

        let mut messages = Vec::new();
        for site in self.sites.sites() {
            let Some(alarm) = self
                .store
                .active(Some(&site.id), None)
                .into_iter()
                .find(Alarm::is_active)
            else {
                continue;
            };
            let until = alarm.datetime - now;
            if !until.is_positive() || until > lead {
                continue;
            }

            let mut rt = site.runtime();
            if rt.sunrise_for == Some(alarm.id) {
                continue;
            }
            rt.sunrise_for = Some(alarm.id);

            let minutes = until.whole_minutes();
            debug!(site = %site.id, at = %minute::format(alarm.datetime), minutes, "Sunrise started");
            messages.push(Outbound::SunriseStart(SunriseStart {
                site_id: site.id.clone(),
                minutes,
            }));
        }

        publish_all(self.publisher.as_ref(), messages).await;
    }

    /// Replay the ringtone if `ring_id` is the play request in flight.
    pub async fn on_play_finished(&self, site_id: &SiteId, ring_id: &RingId) {
        let Some(site) = self.sites.get(site_id) else {
            trace!(site = %site_id, "playFinished for unknown site");
            return;
        };

        let message = {
            let mut rt = site.runtime();
            if !rt.phase.is_ringing() || rt.ring_id.as_ref() != Some(ring_id) {
                trace!(site = %site_id, ring_id = %ring_id, "Ignoring stale playFinished");
                return;
            }
            play(site, &mut rt)
        };

        publish_all(self.publisher.as_ref(), vec![message]).await;
    }

    /// Hotword on a ringing site acknowledges the alarm.
    pub async fn on_hotword(&self, site_id: &SiteId) {
        let Some(site) = self.sites.get(site_id) else {
            return;
        };

        let messages = {
            let mut rt = site.runtime();
            if !rt.phase.is_ringing() {
                return;
            }
            let Some(alarm) = self.stop(&mut rt) else {
                return;
            };

            if let Err(e) = self.store.complete(alarm.id) {
                error!(site = %site.id, error = %e, "Failed to save acknowledged alarm, will retry");
            }
            self.dialogue
                .on_hotword_acked(site, &mut rt, self.time.now());

            info!(site = %site.id, at = %minute::format(alarm.datetime), "Alarm acknowledged");
            vec![stopped(&alarm, StopReason::Acknowledged)]
        };

        publish_all(self.publisher.as_ref(), messages).await;
    }

    /// Ringing ran out without acknowledgement.
    pub async fn on_ring_timeout(&self, event: &TimerEvent) {
        let Some(site) = self.sites.get(&event.site_id) else {
            return;
        };

        let messages = {
            let mut rt = site.runtime();
            if !rt.timer.as_ref().is_some_and(|t| t.matches(event)) || !rt.phase.is_ringing() {
                trace!(site = %site.id, timer = event.timer_id, "Ignoring stale ring timeout");
                return;
            }
            let Some(mut alarm) = self.stop(&mut rt) else {
                return;
            };
            rt.release();

            alarm.missed = true;
            alarm.fired = false;
            if let Err(e) = self.store.mark_missed(alarm.id) {
                error!(site = %site.id, error = %e, "Failed to save missed alarm, will retry");
            }

            warn!(site = %site.id, at = %minute::format(alarm.datetime), "Alarm missed");
            vec![stopped(&alarm, StopReason::Timeout)]
        };

        publish_all(self.publisher.as_ref(), messages).await;
    }

    /// Stop a ringing site on external request. No dialogue follows.
    ///
    /// Returns whether the site was ringing.
    pub async fn stop_ringing(&self, site_id: &SiteId) -> Result<bool> {
        let site = self.site(site_id)?;

        let messages = {
            let mut rt = site.runtime();
            if !rt.phase.is_ringing() {
                return Ok(false);
            }
            let Some(alarm) = self.stop(&mut rt) else {
                return Ok(false);
            };
            rt.release();

            if let Err(e) = self.store.complete(alarm.id) {
                error!(site = %site.id, error = %e, "Failed to save stopped alarm, will retry");
            }

            info!(site = %site.id, at = %minute::format(alarm.datetime), "Alarm stopped externally");
            vec![stopped(&alarm, StopReason::External)]
        };

        publish_all(self.publisher.as_ref(), messages).await;
        Ok(true)
    }

    fn site(&self, site_id: &SiteId) -> Result<&Arc<Site>> {
        self.sites
            .get(site_id)
            .ok_or_else(|| Error::UnknownSite(site_id.clone()))
    }

    /// Clear the ringing fields and cancel the timeout.
    fn stop(&self, rt: &mut SiteRuntime) -> Option<Alarm> {
        rt.ring_id = None;
        if let Some(timer) = rt.timer.take() {
            timer.cancel();
        }
        rt.ringing_alarm.take()
    }
}

/// New play request with a fresh correlation id.
fn play(site: &Site, rt: &mut SiteRuntime) -> Outbound {
    let ring_id = RingId::generate();
    rt.ring_id = Some(ring_id.clone());
    Outbound::PlayBytes {
        site_id: site.id.clone(),
        ring_id,
        wav: site.ringtone.clone(),
    }
}

fn stopped(alarm: &Alarm, reason: StopReason) -> Outbound {
    Outbound::RingingStopped(RingingStopped {
        alarm: alarm.to_record(),
        reason,
    })
}
