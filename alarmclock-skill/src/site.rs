//! Configured sites and their runtime state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use time::PrimitiveDateTime;

use crate::config::SiteConfig;
use crate::error::{Error, Result};
use crate::ringing::{RingPhase, TimerHandle};
use crate::ringtone;
use crate::types::{Alarm, AlarmId, RingId, SiteId};

/// Deletion waiting for the user's yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub session_id: String,
    pub alarm_ids: Vec<AlarmId>,
}

/// Mutable state of one site. Only touched under [`Site::runtime`].
#[derive(Debug, Default)]
pub struct SiteRuntime {
    pub phase: RingPhase,
    pub ringing_alarm: Option<Alarm>,
    /// Correlation id of the play request in flight.
    pub ring_id: Option<RingId>,
    /// The single pending timer, whatever its kind.
    pub timer: Option<TimerHandle>,
    /// When the hotword stopped the alarm. Snoozes count from here.
    pub acked_at: Option<PrimitiveDateTime>,
    /// Last dialogue session this site reacted to.
    pub handled_session: Option<String>,
    pub pending_delete: Option<PendingDelete>,
    /// Alarm whose `sunriseStart` was already announced.
    pub sunrise_for: Option<AlarmId>,
}

impl SiteRuntime {
    /// Clear ringing and dialogue fields and return to idle.
    ///
    /// Drops the pending timer, which cancels it. A pending deletion is a
    /// separate conversation and survives.
    pub fn release(&mut self) {
        self.phase = RingPhase::Idle;
        self.ringing_alarm = None;
        self.ring_id = None;
        self.timer = None;
        self.acked_at = None;
    }

    pub fn session_pending(&self) -> bool {
        self.phase == RingPhase::AwaitingSession
    }
}

#[derive(Debug)]
pub struct Site {
    pub id: SiteId,
    pub room: String,
    pub ringing_timeout: Duration,
    pub ringtone_enabled: bool,
    /// Volume-adjusted WAV bytes.
    pub ringtone: Bytes,
    runtime: Mutex<SiteRuntime>,
}

impl Site {
    pub fn new(config: &SiteConfig, ringtone: Bytes) -> Self {
        Self {
            id: config.site_id.clone(),
            room: config.room.clone(),
            ringing_timeout: config.ringing_timeout,
            ringtone_enabled: config.ringtone_enabled,
            ringtone,
            runtime: Mutex::new(SiteRuntime::default()),
        }
    }

    /// Lock the runtime state. Never hold the guard across an `.await`.
    pub fn runtime(&self) -> MutexGuard<'_, SiteRuntime> {
        self.runtime.lock()
    }

    pub fn phase(&self) -> RingPhase {
        self.runtime.lock().phase
    }
}

/// Immutable set of sites, built once at startup.
#[derive(Debug)]
pub struct SiteRegistry {
    sites: Vec<Arc<Site>>,
    by_id: HashMap<SiteId, usize>,
    by_room: HashMap<String, usize>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<Site>) -> Self {
        let sites: Vec<Arc<Site>> = sites.into_iter().map(Arc::new).collect();
        let by_id = sites
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        let by_room = sites
            .iter()
            .enumerate()
            .map(|(i, s)| (s.room.clone(), i))
            .collect();
        Self {
            sites,
            by_id,
            by_room,
        }
    }

    /// Build every configured site, adjusting `ringtone` to each site's
    /// volume.
    pub fn from_config(configs: &[SiteConfig], ringtone: &Bytes) -> Self {
        let sites = configs
            .iter()
            .map(|c| Site::new(c, ringtone::apply_volume(ringtone, c.ringing_volume)))
            .collect();
        Self::new(sites)
    }

    /// Site id for a spoken room name.
    pub fn resolve(&self, room: &str) -> Result<SiteId> {
        self.by_room
            .get(room)
            .map(|&i| self.sites[i].id.clone())
            .ok_or_else(|| Error::UnknownRoom(room.to_string()))
    }

    /// Room name for a site id.
    pub fn resolve_room(&self, site_id: &SiteId) -> Result<&str> {
        self.get(site_id)
            .map(|s| s.room.as_str())
            .ok_or_else(|| Error::UnknownSite(site_id.clone()))
    }

    pub fn get(&self, site_id: &SiteId) -> Option<&Arc<Site>> {
        self.by_id.get(site_id).map(|&i| &self.sites[i])
    }

    pub fn sites(&self) -> &[Arc<Site>] {
        &self.sites
    }

    pub fn ids(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.sites.iter().map(|s| s.id.clone())
    }
}
